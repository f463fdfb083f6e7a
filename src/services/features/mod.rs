use crate::error::Result;
use crate::models::*;
use crate::utils::validation::validate_raw_event;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Turns raw interaction events into one feature row per (visitor, item) pair.
#[derive(Debug, Clone, Default)]
pub struct FeatureAggregator;

impl FeatureAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, events: &[RawEvent]) -> Result<Vec<AggregatedFeatureRow>> {
        events.iter().try_for_each(validate_raw_event)?;

        let popularity = self.item_popularity(events);

        let mut pairs: BTreeMap<(u64, u64), AggregatedFeatureRow> = BTreeMap::new();
        for event in events {
            pairs
                .entry((event.visitor_id, event.item_id))
                .or_insert_with(|| AggregatedFeatureRow::new(event.visitor_id, event.item_id))
                .record(event);
        }

        let rows: Vec<AggregatedFeatureRow> = pairs
            .into_values()
            .map(|mut row| {
                row.days_in_cart = row.last_timestamp as f64 / MILLIS_PER_DAY;
                row.unique_views = popularity.get(&row.item_id).copied().unwrap_or(0);
                row
            })
            .collect();

        info!(
            "Aggregated {} events into {} visitor/item rows ({} items with views)",
            events.len(),
            rows.len(),
            popularity.len()
        );
        Ok(rows)
    }

    /// Distinct viewers per item, computed over every visitor.
    pub fn item_popularity(&self, events: &[RawEvent]) -> HashMap<u64, u32> {
        let mut viewers: HashMap<u64, HashSet<u64>> = HashMap::new();
        for event in events.iter().filter(|e| e.event_kind == EventKind::View) {
            viewers.entry(event.item_id).or_default().insert(event.visitor_id);
        }

        viewers
            .into_iter()
            .map(|(item_id, visitors)| (item_id, visitors.len() as u32))
            .collect()
    }
}

/// Derives the purchase label and drops `buy_count` so it cannot leak into features.
#[derive(Debug, Clone, Default)]
pub struct LabelAssigner;

impl LabelAssigner {
    pub fn new() -> Self {
        Self
    }

    pub fn assign_labels(&self, rows: Vec<AggregatedFeatureRow>) -> Vec<LabeledRow> {
        let labeled: Vec<LabeledRow> = rows
            .into_iter()
            .map(|row| LabeledRow {
                visitor_id: row.visitor_id,
                item_id: row.item_id,
                view_count: row.view_count,
                add_count: row.add_count,
                days_in_cart: row.days_in_cart,
                unique_views: row.unique_views,
                label: u8::from(row.buy_count > 0),
            })
            .collect();

        debug!(
            "Labeled {} rows, {} purchases",
            labeled.len(),
            labeled.iter().filter(|row| row.is_positive()).count()
        );
        labeled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CartRankError;

    fn event(visitor: u64, item: u64, kind: EventKind, ts: i64) -> RawEvent {
        RawEvent::new(visitor, item, kind, ts)
    }

    #[test]
    fn test_single_purchase_path() {
        let events = vec![
            event(1, 10, EventKind::View, 1_000),
            event(1, 10, EventKind::View, 2_000),
            event(1, 10, EventKind::AddToCart, 3_000),
            event(1, 10, EventKind::Transaction, 86_400_000),
        ];
        let rows = FeatureAggregator::new().aggregate(&events).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!((row.view_count, row.add_count, row.buy_count), (2, 1, 1));
        assert_eq!(row.unique_views, 1);
        assert_eq!(row.last_timestamp, 86_400_000);
        assert!((row.days_in_cart - 1.0).abs() < 1e-12);

        let labeled = LabelAssigner::new().assign_labels(rows);
        assert_eq!(labeled[0].label, 1);
    }

    #[test]
    fn test_empty_events_yield_no_rows() {
        assert!(FeatureAggregator::new().aggregate(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_popularity_is_global_and_broadcast() {
        let events = vec![
            event(1, 10, EventKind::View, 1),
            event(2, 10, EventKind::View, 2),
            event(2, 10, EventKind::View, 3),
            event(3, 10, EventKind::AddToCart, 4),
            event(3, 20, EventKind::Transaction, 5),
        ];
        let rows = FeatureAggregator::new().aggregate(&events).unwrap();
        assert_eq!(rows.len(), 4);

        for row in rows.iter().filter(|r| r.item_id == 10) {
            assert_eq!(row.unique_views, 2);
        }
        let bought = rows.iter().find(|r| r.item_id == 20).unwrap();
        assert_eq!(bought.unique_views, 0);
        assert_eq!(bought.view_count, 0);

        let labeled = LabelAssigner::new().assign_labels(rows);
        let bought = labeled.iter().find(|r| r.item_id == 20).unwrap();
        assert_eq!(bought.label, 1);
    }

    #[test]
    fn test_negative_timestamp_is_rejected() {
        let err = FeatureAggregator::new()
            .aggregate(&[event(1, 1, EventKind::View, -1)])
            .unwrap_err();
        assert!(matches!(err, CartRankError::Data(_)));
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let events = vec![
            event(5, 1, EventKind::View, 9),
            event(2, 7, EventKind::AddToCart, 3),
            event(5, 1, EventKind::Transaction, 11),
            event(2, 1, EventKind::View, 4),
        ];
        let aggregator = FeatureAggregator::new();
        let a = aggregator.aggregate(&events).unwrap();
        let mut reversed = events.clone();
        reversed.reverse();
        let b = aggregator.aggregate(&reversed).unwrap();
        assert_eq!(a, b);
    }
}
