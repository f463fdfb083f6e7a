pub mod forest;
pub mod logistic;
pub mod optimizer;

use crate::config::TrainingConfig;
use crate::error::{CartRankError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

pub use forest::{DecisionTree, RandomForest};
pub use logistic::LogisticRegression;

/// A binary classifier over the feature matrix produced by a `FeatureSchema`.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: &ClassWeights) -> Result<()>;

    /// Probability of the positive (purchase) class for one feature row.
    fn predict_proba(&self, features: &[f64]) -> f64;

    fn predict(&self, features: &[f64]) -> u8 {
        u8::from(self.predict_proba(features) > 0.5)
    }
}

/// Per-class sample weights, inversely proportional to class frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub negative: f64,
    pub positive: f64,
}

impl ClassWeights {
    pub fn uniform() -> Self {
        Self {
            negative: 1.0,
            positive: 1.0,
        }
    }

    /// `n_samples / (n_classes * n_class_samples)`; both classes must be present.
    pub fn balanced(y: &[u8]) -> Result<Self> {
        let positives = y.iter().filter(|&&label| label == 1).count();
        let negatives = y.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(CartRankError::DegenerateDataset(format!(
                "training labels contain a single class ({} positive, {} negative)",
                positives, negatives
            )));
        }

        let n = y.len() as f64;
        Ok(Self {
            negative: n / (2.0 * negatives as f64),
            positive: n / (2.0 * positives as f64),
        })
    }

    pub fn for_label(&self, label: u8) -> f64 {
        if label == 1 {
            self.positive
        } else {
            self.negative
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    RandomForest,
    LogisticRegression,
}

impl CandidateKind {
    pub fn name(&self) -> &'static str {
        match self {
            CandidateKind::RandomForest => "random_forest",
            CandidateKind::LogisticRegression => "logistic_regression",
        }
    }

    pub fn build(&self, config: &TrainingConfig) -> CandidateModel {
        match self {
            CandidateKind::RandomForest => CandidateModel::RandomForest(RandomForest::new(
                config.forest.n_estimators,
                config.forest.max_depth,
                config.forest.min_samples_split,
                config.seed,
            )),
            CandidateKind::LogisticRegression => {
                CandidateModel::LogisticRegression(LogisticRegression::new(config.logistic.clone()))
            }
        }
    }
}

/// Every model kind the selector can train, in a serializable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateModel {
    RandomForest(RandomForest),
    LogisticRegression(LogisticRegression),
}

impl CandidateModel {
    /// Rejects a deserialized model whose parameters do not fit `width` features.
    pub fn validate(&self, width: usize) -> Result<()> {
        match self {
            CandidateModel::RandomForest(model) => model.validate(width),
            CandidateModel::LogisticRegression(model) => model.validate(width),
        }
    }
}

impl Classifier for CandidateModel {
    fn name(&self) -> &'static str {
        match self {
            CandidateModel::RandomForest(model) => model.name(),
            CandidateModel::LogisticRegression(model) => model.name(),
        }
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: &ClassWeights) -> Result<()> {
        match self {
            CandidateModel::RandomForest(model) => model.fit(x, y, weights),
            CandidateModel::LogisticRegression(model) => model.fit(x, y, weights),
        }
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        match self {
            CandidateModel::RandomForest(model) => model.predict_proba(features),
            CandidateModel::LogisticRegression(model) => model.predict_proba(features),
        }
    }
}

/// Shared input checks for `Classifier::fit` implementations.
pub(crate) fn check_training_input(name: &str, x: &DMatrix<f64>, y: &[u8]) -> Result<()> {
    if x.nrows() == 0 {
        return Err(CartRankError::training(name, "empty training matrix"));
    }
    if x.nrows() != y.len() {
        return Err(CartRankError::training(
            name,
            format!("{} feature rows but {} labels", x.nrows(), y.len()),
        ));
    }
    if x.iter().any(|value| !value.is_finite()) {
        return Err(CartRankError::training(name, "feature matrix contains NaN or infinity"));
    }
    let positives = y.iter().filter(|&&label| label == 1).count();
    if positives == 0 || positives == y.len() {
        return Err(CartRankError::training(name, "training labels contain a single class"));
    }
    Ok(())
}
