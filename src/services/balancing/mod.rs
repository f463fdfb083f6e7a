use crate::error::{CartRankError, Result};
use crate::models::*;
use crate::utils::validation::validate_labeled_row;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use tracing::info;

/// Downsamples negatives to at most `negative_ratio` per positive.
#[derive(Debug, Clone)]
pub struct ClassBalancer {
    negative_ratio: usize,
    seed: u64,
}

impl ClassBalancer {
    pub fn new(negative_ratio: usize, seed: u64) -> Self {
        Self { negative_ratio, seed }
    }

    pub fn balance(&self, rows: Vec<LabeledRow>) -> Result<BalancedDataset> {
        rows.iter().try_for_each(validate_labeled_row)?;

        let (positives, negatives): (Vec<LabeledRow>, Vec<LabeledRow>) =
            rows.into_iter().partition(|row| row.is_positive());

        if positives.is_empty() {
            return Err(CartRankError::DegenerateDataset(format!(
                "no positive rows among {} labeled rows",
                negatives.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let cap = (self.negative_ratio * positives.len()).min(negatives.len());
        let sampled = index::sample(&mut rng, negatives.len(), cap);

        let mut balanced = positives;
        let positive_count = balanced.len();
        balanced.extend(sampled.into_iter().map(|i| negatives[i].clone()));
        balanced.shuffle(&mut rng);

        info!(
            "Balanced dataset: {} positives, {} of {} negatives kept",
            positive_count,
            cap,
            negatives.len()
        );
        Ok(BalancedDataset::new(balanced))
    }
}
