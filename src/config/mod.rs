use crate::algorithms::optimizer::OptimizerKind;
use crate::algorithms::CandidateKind;
use crate::error::{CartRankError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub recommendation: RecommendationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub events_path: String,
    /// Snapshot of the balanced table; skipped when unset.
    pub features_path: Option<String>,
    pub model_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub negative_ratio: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub roster: Vec<CandidateKind>,
    pub forest: ForestConfig,
    pub logistic: LogisticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    pub optimizer: OptimizerKind,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub default_top_k: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                workers: num_cpus::get(),
            },
            data: DataConfig {
                events_path: "data/raw/events.csv".to_string(),
                features_path: Some("data/processed/features.csv".to_string()),
                model_path: "models/model.json".to_string(),
            },
            training: TrainingConfig::default(),
            recommendation: RecommendationConfig { default_top_k: 5 },
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            negative_ratio: 3,
            test_fraction: 0.2,
            seed: 42,
            roster: vec![CandidateKind::RandomForest, CandidateKind::LogisticRegression],
            forest: ForestConfig::default(),
            logistic: LogisticConfig::default(),
        }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::Adam,
            max_iter: 1000,
            learning_rate: 0.05,
            l2_penalty: 1e-4,
            tolerance: 1e-6,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.negative_ratio == 0 {
            return Err(CartRankError::Config("negative_ratio must be at least 1".into()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(CartRankError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.forest.n_estimators == 0 {
            return Err(CartRankError::Config("forest.n_estimators must be positive".into()));
        }
        if self.logistic.max_iter == 0 || self.logistic.learning_rate <= 0.0 {
            return Err(CartRankError::Config(
                "logistic.max_iter and logistic.learning_rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("CARTRANK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config_is_valid() {
        let config = Config::default();
        assert!(config.training.validate().is_ok());
        assert_eq!(config.training.negative_ratio, 3);
        assert_eq!(config.recommendation.default_top_k, 5);
        assert_eq!(config.training.roster.len(), 2);
    }

    #[test]
    fn test_rejects_out_of_range_test_fraction() {
        let mut training = TrainingConfig::default();
        training.test_fraction = 1.0;
        assert!(matches!(training.validate(), Err(CartRankError::Config(_))));
    }

    #[test]
    fn test_from_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartrank.toml");
        std::fs::write(&path, "[training]\nseed = 7\nnegative_ratio = 2\n").unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.negative_ratio, 2);
        assert_eq!(config.data.model_path, "models/model.json");
    }
}
