use serde::{Deserialize, Serialize};

/// Held-out quality of a binary classifier, measured on the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&truth, &predicted) in y_true.iter().zip(y_pred) {
            match (truth == 1, predicted == 1) {
                (true, true) => matrix.true_positives += 1,
                (false, true) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
                (true, false) => matrix.false_negatives += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator;

impl MetricsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Undefined ratios (no predicted positives) count as 0.
    pub fn calculate_precision(&self, matrix: &ConfusionMatrix) -> f64 {
        let predicted = matrix.true_positives + matrix.false_positives;
        if predicted == 0 {
            0.0
        } else {
            matrix.true_positives as f64 / predicted as f64
        }
    }

    pub fn calculate_recall(&self, matrix: &ConfusionMatrix) -> f64 {
        let actual = matrix.true_positives + matrix.false_negatives;
        if actual == 0 {
            0.0
        } else {
            matrix.true_positives as f64 / actual as f64
        }
    }

    pub fn calculate_f1_score(&self, precision: f64, recall: f64) -> f64 {
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }

    pub fn calculate_all_metrics(&self, y_true: &[u8], y_pred: &[u8]) -> ClassificationMetrics {
        let matrix = ConfusionMatrix::from_predictions(y_true, y_pred);
        let precision = self.calculate_precision(&matrix);
        let recall = self.calculate_recall(&matrix);
        let accuracy = if matrix.total() == 0 {
            0.0
        } else {
            (matrix.true_positives + matrix.true_negatives) as f64 / matrix.total() as f64
        };

        ClassificationMetrics {
            precision,
            recall,
            f1_score: self.calculate_f1_score(precision, recall),
            accuracy,
            support: matrix.true_positives + matrix.false_negatives,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_on_mixed_predictions() {
        let y_true = vec![1, 1, 0, 0, 1];
        let y_pred = vec![1, 0, 1, 0, 1];
        let metrics = MetricsCalculator::new().calculate_all_metrics(&y_true, &y_pred);

        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.f1_score - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.accuracy - 0.6).abs() < 1e-12);
        assert_eq!(metrics.support, 3);
    }

    #[test]
    fn test_no_predicted_positives_scores_zero() {
        let metrics = MetricsCalculator::new().calculate_all_metrics(&[1, 0], &[0, 0]);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.f1_score, 0.0);
    }
}
