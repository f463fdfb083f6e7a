use std::fmt;
use thiserror::Error;

pub type Result<T, E = CartRankError> = std::result::Result<T, E>;

/// Error taxonomy shared by the pipeline stages and the scoring path.
#[derive(Debug, Error)]
pub enum CartRankError {
    /// Malformed or missing fields in an event, a cart item or a feature schema.
    #[error("data error: {0}")]
    Data(String),

    /// Nothing meaningful to train on: no positives, or a single-class split.
    #[error("degenerate dataset: {0}")]
    DegenerateDataset(String),

    /// Scoring was requested before any model was published.
    #[error("no model available")]
    ModelUnavailable,

    #[error("training of {model} failed: {reason}")]
    TrainingFailure { model: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl CartRankError {
    pub fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TrainingFailure {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Scoring-time errors are reported back to the caller instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Data(_) | Self::ModelUnavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Aggregate,
    Label,
    Balance,
    Select,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Aggregate => "aggregate",
            Stage::Label => "label",
            Stage::Balance => "balance",
            Stage::Select => "select",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A fatal pipeline error tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: CartRankError,
}

pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_message_names_stage() {
        let err: Result<()> = Err(CartRankError::DegenerateDataset("no positive rows".into()));
        let tagged = err.stage(Stage::Balance).unwrap_err();
        assert_eq!(
            tagged.to_string(),
            "balance stage failed: degenerate dataset: no positive rows"
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(CartRankError::ModelUnavailable.is_recoverable());
        assert!(CartRankError::Data("bad".into()).is_recoverable());
        assert!(!CartRankError::training("random_forest", "boom").is_recoverable());
    }
}
