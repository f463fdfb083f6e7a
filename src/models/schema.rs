use crate::error::{CartRankError, Result};
use serde::{Deserialize, Serialize};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const FEATURE_COLUMNS: [&str; 4] = ["view_count", "add_count", "days_in_cart", "unique_views"];

/// Anything that can hand out named numeric features.
pub trait FeatureSource {
    fn feature(&self, name: &str) -> Option<f64>;
}

/// Versioned feature contract shared by training and scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub columns: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::current()
    }
}

impl FeatureSchema {
    pub fn current() -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn vectorize<S: FeatureSource>(&self, source: &S) -> Result<Vec<f64>> {
        self.columns
            .iter()
            .map(|column| {
                source
                    .feature(column)
                    .ok_or_else(|| CartRankError::Data(format!("unknown feature column '{}'", column)))
            })
            .collect()
    }

    pub fn vectorize_all<S: FeatureSource>(&self, sources: &[S]) -> Result<Vec<Vec<f64>>> {
        sources.iter().map(|s| self.vectorize(s)).collect()
    }

    /// Fails when a model trained against `other` would be fed this schema.
    pub fn ensure_compatible(&self, other: &FeatureSchema) -> Result<()> {
        if self != other {
            return Err(CartRankError::Data(format!(
                "feature schema mismatch: expected v{} {:?}, model has v{} {:?}",
                self.version, self.columns, other.version, other.columns
            )));
        }
        Ok(())
    }
}
