pub mod schema;

use serde::{Deserialize, Serialize};

pub use schema::{FeatureSchema, FeatureSource};

/// Milliseconds in one day; event timestamps are epoch milliseconds.
pub const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    View,
    #[serde(alias = "add_to_cart")]
    AddToCart,
    Transaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(alias = "visitorid")]
    pub visitor_id: u64,
    #[serde(alias = "itemid")]
    pub item_id: u64,
    #[serde(rename = "event", alias = "event_kind")]
    pub event_kind: EventKind,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFeatureRow {
    pub visitor_id: u64,
    pub item_id: u64,
    pub view_count: u32,
    pub add_count: u32,
    pub buy_count: u32,
    pub last_timestamp: i64,
    pub days_in_cart: f64,
    /// Distinct visitors who viewed this item, across all users.
    pub unique_views: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub visitor_id: u64,
    pub item_id: u64,
    pub view_count: u32,
    pub add_count: u32,
    pub days_in_cart: f64,
    pub unique_views: u32,
    pub label: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalancedDataset {
    pub rows: Vec<LabeledRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(alias = "itemid")]
    pub item_id: u64,
    pub view_count: u32,
    pub add_count: u32,
    pub days_in_cart: f64,
    pub unique_views: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub user_id: u64,
    pub cart: Vec<CartItem>,
    /// Falls back to `recommendation.default_top_k` when absent.
    #[serde(default)]
    pub top_k: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub user_id: u64,
    pub recommended_items: Vec<u64>,
    pub total_candidates: usize,
    pub recommended_count: usize,
    pub item_scores: Vec<(u64, f64)>,
}

impl RawEvent {
    pub fn new(visitor_id: u64, item_id: u64, event_kind: EventKind, timestamp: i64) -> Self {
        Self {
            visitor_id,
            item_id,
            event_kind,
            timestamp,
        }
    }
}

impl AggregatedFeatureRow {
    pub fn new(visitor_id: u64, item_id: u64) -> Self {
        Self {
            visitor_id,
            item_id,
            view_count: 0,
            add_count: 0,
            buy_count: 0,
            last_timestamp: i64::MIN,
            days_in_cart: 0.0,
            unique_views: 0,
        }
    }

    pub fn record(&mut self, event: &RawEvent) {
        match event.event_kind {
            EventKind::View => self.view_count += 1,
            EventKind::AddToCart => self.add_count += 1,
            EventKind::Transaction => self.buy_count += 1,
        }
        self.last_timestamp = self.last_timestamp.max(event.timestamp);
    }
}

impl LabeledRow {
    pub fn is_positive(&self) -> bool {
        self.label == 1
    }
}

impl BalancedDataset {
    pub fn new(rows: Vec<LabeledRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positive_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_positive()).count()
    }

    pub fn negative_count(&self) -> usize {
        self.len() - self.positive_count()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.rows.iter().map(|row| row.label).collect()
    }
}

impl CartItem {
    pub fn new(item_id: u64, view_count: u32, add_count: u32, days_in_cart: f64, unique_views: u32) -> Self {
        Self {
            item_id,
            view_count,
            add_count,
            days_in_cart,
            unique_views,
        }
    }
}

impl FeatureSource for LabeledRow {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "view_count" => Some(self.view_count as f64),
            "add_count" => Some(self.add_count as f64),
            "days_in_cart" => Some(self.days_in_cart),
            "unique_views" => Some(self.unique_views as f64),
            _ => None,
        }
    }
}

impl FeatureSource for CartItem {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "view_count" => Some(self.view_count as f64),
            "add_count" => Some(self.add_count as f64),
            "days_in_cart" => Some(self.days_in_cart),
            "unique_views" => Some(self.unique_views as f64),
            _ => None,
        }
    }
}
