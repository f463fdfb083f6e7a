use super::{check_training_input, ClassWeights, Classifier};
use crate::config::LogisticConfig;
use crate::error::{CartRankError, Result};
use crate::utils::sigmoid;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// L2-regularized logistic regression on standardized features, trained with
/// full-batch gradient steps on the class-weighted log loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LogisticConfig,
    mean: Vec<f64>,
    scale: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
    iterations: usize,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            mean: Vec::new(),
            scale: Vec::new(),
            coefficients: Vec::new(),
            intercept: 0.0,
            iterations: 0,
        }
    }

    /// Builds an already fitted model from raw parameters.
    pub fn from_parts(mean: Vec<f64>, scale: Vec<f64>, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            config: LogisticConfig::default(),
            mean,
            scale,
            coefficients,
            intercept,
            iterations: 0,
        }
    }

    /// Parameter shapes must match the schema width and every value must be
    /// finite, with a non-zero scale.
    pub fn validate(&self, width: usize) -> Result<()> {
        for (name, values) in [
            ("mean", &self.mean),
            ("scale", &self.scale),
            ("coefficients", &self.coefficients),
        ] {
            if values.len() != width {
                return Err(CartRankError::Data(format!(
                    "logistic {} has {} values, expected {}",
                    name,
                    values.len(),
                    width
                )));
            }
            if values.iter().any(|value| !value.is_finite()) {
                return Err(CartRankError::Data(format!("logistic {} contains NaN or infinity", name)));
            }
        }
        if self.scale.iter().any(|&scale| scale == 0.0) {
            return Err(CartRankError::Data("logistic scale contains zero".into()));
        }
        if !self.intercept.is_finite() {
            return Err(CartRankError::Data("logistic intercept is not finite".into()));
        }
        Ok(())
    }

    fn standardize(&mut self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let n = x.nrows() as f64;
        self.mean = x.column_iter().map(|column| column.sum() / n).collect();
        self.scale = x
            .column_iter()
            .zip(&self.mean)
            .map(|(column, mean)| {
                let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if variance > 0.0 {
                    variance.sqrt()
                } else {
                    1.0
                }
            })
            .collect();

        // Trailing column of ones carries the intercept.
        DMatrix::from_fn(x.nrows(), x.ncols() + 1, |i, j| {
            if j == x.ncols() {
                1.0
            } else {
                (x[(i, j)] - self.mean[j]) / self.scale[j]
            }
        })
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: &ClassWeights) -> Result<()> {
        check_training_input(self.name(), x, y)?;

        let design = self.standardize(x);
        let d = x.ncols();
        let targets = DVector::from_iterator(y.len(), y.iter().map(|&label| label as f64));
        let sample_weights = DVector::from_iterator(y.len(), y.iter().map(|&label| weights.for_label(label)));
        let total_weight = sample_weights.sum();

        let mut params = DVector::<f64>::zeros(d + 1);
        let mut optimizer = self.config.optimizer.build(self.config.learning_rate);
        self.iterations = self.config.max_iter;

        for iteration in 0..self.config.max_iter {
            let probabilities = (&design * &params).map(sigmoid);
            let residuals = (probabilities - &targets).component_mul(&sample_weights);
            let mut gradients = design.tr_mul(&residuals) / total_weight;
            for j in 0..d {
                gradients[j] += self.config.l2_penalty * params[j];
            }

            if gradients.norm() < self.config.tolerance {
                self.iterations = iteration;
                break;
            }
            optimizer.update(&mut params, &gradients);
        }

        if params.iter().any(|value| !value.is_finite()) {
            return Err(CartRankError::training(self.name(), "coefficients diverged"));
        }

        self.coefficients = params.rows(0, d).iter().copied().collect();
        self.intercept = params[d];
        debug!(
            "Logistic regression converged after {} iterations: coefficients={:?}, intercept={:.4}",
            self.iterations, self.coefficients, self.intercept
        );
        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        let z: f64 = features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .zip(&self.coefficients)
            .map(|((value, (mean, scale)), coefficient)| (value - mean) / scale * coefficient)
            .sum();
        sigmoid(z + self.intercept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (DMatrix<f64>, Vec<u8>) {
        let rows: Vec<f64> = vec![
            0.0, 1.0, //
            1.0, 0.0, //
            0.0, 0.0, //
            1.0, 1.0, //
            4.0, 2.0, //
            5.0, 3.0, //
        ];
        (DMatrix::from_row_slice(6, 2, &rows), vec![0, 0, 0, 0, 1, 1])
    }

    #[test]
    fn test_fit_separates_classes() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&x, &y, &ClassWeights::balanced(&y).unwrap()).unwrap();

        assert!(model.predict_proba(&[5.0, 3.0]) > 0.5);
        assert!(model.predict_proba(&[0.0, 0.0]) < 0.5);
        assert_eq!(model.predict(&[4.5, 2.5]), 1);
        assert!(model.validate(2).is_ok());
    }

    #[test]
    fn test_from_parts_probability() {
        let model = LogisticRegression::from_parts(vec![0.0], vec![1.0], vec![1.0], 0.0);
        assert!((model.predict_proba(&[0.0]) - 0.5).abs() < 1e-12);
        assert!(model.predict_proba(&[2.0]) > model.predict_proba(&[1.0]));
    }

    #[test]
    fn test_validate_rejects_mismatched_parameters() {
        let short = LogisticRegression::from_parts(vec![0.0; 4], vec![1.0; 4], vec![1.0; 3], 0.0);
        assert!(matches!(short.validate(4), Err(CartRankError::Data(_))));

        let zero_scale = LogisticRegression::from_parts(vec![0.0; 2], vec![1.0, 0.0], vec![1.0; 2], 0.0);
        assert!(zero_scale.validate(2).is_err());

        assert!(LogisticRegression::new(LogisticConfig::default()).validate(4).is_err());
    }

    #[test]
    fn test_constant_column_does_not_divide_by_zero() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 7.0, 2.0, 7.0, 8.0, 7.0, 9.0, 7.0]);
        let y = vec![0, 0, 1, 1];
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&x, &y, &ClassWeights::uniform()).unwrap();
        assert!(model.predict_proba(&[9.0, 7.0]).is_finite());
    }
}
