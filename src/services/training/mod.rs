use crate::algorithms::{CandidateModel, ClassWeights, Classifier};
use crate::config::{Config, TrainingConfig};
use crate::error::{CartRankError, Result, Stage, StageContext, StageError};
use crate::models::*;
use crate::services::balancing::ClassBalancer;
use crate::services::features::{FeatureAggregator, LabelAssigner};
use crate::services::store::{write_snapshot, EventStore, ModelStore};
use crate::utils::metrics::{ClassificationMetrics, MetricsCalculator};
use crate::utils::{to_matrix, train_test_split};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub name: String,
    pub metrics: ClassificationMetrics,
    pub training_ms: u64,
}

/// The winning candidate of one selection run, plus everything needed to
/// score against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedModel {
    pub run_id: Uuid,
    pub name: String,
    pub schema: FeatureSchema,
    pub trained_at: DateTime<Utc>,
    pub metrics: ClassificationMetrics,
    pub candidates: Vec<CandidateReport>,
    pub model: CandidateModel,
}

impl SelectedModel {
    pub fn new(model: CandidateModel, metrics: ClassificationMetrics) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            name: model.name().to_string(),
            schema: FeatureSchema::current(),
            trained_at: Utc::now(),
            metrics,
            candidates: Vec::new(),
            model,
        }
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        self.model.predict_proba(features)
    }

    pub fn predict(&self, features: &[f64]) -> u8 {
        self.model.predict(features)
    }

    /// Checks that the model parameters fit the recorded schema.
    pub fn validate(&self) -> Result<()> {
        self.model.validate(self.schema.width())
    }
}

/// Trains the configured roster on a seeded split and keeps the best F1.
pub struct ModelSelector {
    config: TrainingConfig,
    schema: FeatureSchema,
    metrics: MetricsCalculator,
}

impl ModelSelector {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            schema: FeatureSchema::current(),
            metrics: MetricsCalculator::new(),
        }
    }

    pub fn select_best(&self, dataset: &BalancedDataset, test_fraction: f64, seed: u64) -> Result<SelectedModel> {
        if self.config.roster.is_empty() {
            return Err(CartRankError::training("roster", "no candidate models configured"));
        }

        let features = self.schema.vectorize_all(&dataset.rows)?;
        let labels = dataset.labels();
        let (train_idx, test_idx) = train_test_split(dataset.len(), test_fraction, seed)?;

        let pick = |indices: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
            indices
                .iter()
                .map(|&i| (features[i].clone(), labels[i]))
                .unzip()
        };
        let (train_rows, y_train) = pick(&train_idx);
        let (test_rows, y_test) = pick(&test_idx);

        let class_weights = ClassWeights::balanced(&y_train)?;
        let x_train = to_matrix(&train_rows, self.schema.width())?;

        info!(
            "Training {} candidates on {} rows, evaluating on {} rows (class weights {:.3}/{:.3})",
            self.config.roster.len(),
            train_rows.len(),
            test_rows.len(),
            class_weights.negative,
            class_weights.positive
        );

        let mut trained = Vec::with_capacity(self.config.roster.len());
        let mut reports = Vec::with_capacity(self.config.roster.len());

        for kind in &self.config.roster {
            let mut candidate = kind.build(&self.config);
            let started = Instant::now();
            candidate.fit(&x_train, &y_train, &class_weights)?;
            let training_ms = started.elapsed().as_millis() as u64;

            let y_pred: Vec<u8> = test_rows.iter().map(|row| candidate.predict(row)).collect();
            let metrics = self.metrics.calculate_all_metrics(&y_test, &y_pred);
            info!(
                "{} | Precision: {:.3}, Recall: {:.3}, F1: {:.3} ({} ms)",
                kind.name(),
                metrics.precision,
                metrics.recall,
                metrics.f1_score,
                training_ms
            );

            trained.push(candidate);
            reports.push(CandidateReport {
                name: kind.name().to_string(),
                metrics,
                training_ms,
            });
        }

        let winner = best_candidate(&reports).ok_or_else(|| CartRankError::training("roster", "no candidate trained"))?;
        let metrics = reports[winner].metrics;
        let model = trained.swap_remove(winner);
        let mut selected = SelectedModel::new(model, metrics);
        selected.schema = self.schema.clone();
        selected.candidates = reports;

        info!("Selected {} with F1 {:.3}", selected.name, selected.metrics.f1_score);
        Ok(selected)
    }
}

/// Index of the highest F1; on ties the earliest roster entry wins.
pub fn best_candidate(reports: &[CandidateReport]) -> Option<usize> {
    reports
        .iter()
        .enumerate()
        .fold(None, |best: Option<usize>, (i, report)| match best {
            Some(b) if reports[b].metrics.f1_score >= report.metrics.f1_score => Some(b),
            _ => Some(i),
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    pub event_count: usize,
    pub row_count: usize,
    pub positive_count: usize,
    pub balanced_count: usize,
    pub selected: String,
    pub metrics: ClassificationMetrics,
    pub candidates: Vec<CandidateReport>,
}

/// Runs load → aggregate → label → balance → select → persist once.
pub struct TrainingPipeline {
    event_store: Arc<dyn EventStore>,
    model_store: ModelStore,
    config: Arc<Config>,
}

impl TrainingPipeline {
    pub fn new(event_store: Arc<dyn EventStore>, model_store: ModelStore, config: Arc<Config>) -> Self {
        Self {
            event_store,
            model_store,
            config,
        }
    }

    /// Builds the selected model without persisting it.
    pub async fn train(&self) -> std::result::Result<(SelectedModel, TrainingSummary), StageError> {
        let training = &self.config.training;
        training.validate().stage(Stage::Load)?;

        let events = self.event_store.load_events().await.stage(Stage::Load)?;
        let rows = FeatureAggregator::new().aggregate(&events).stage(Stage::Aggregate)?;
        let row_count = rows.len();

        let labeled = LabelAssigner::new().assign_labels(rows);
        let positive_count = labeled.iter().filter(|row| row.is_positive()).count();
        if labeled.is_empty() {
            return Err(StageError {
                stage: Stage::Label,
                source: CartRankError::DegenerateDataset("no events to label".into()),
            });
        }

        let balanced = ClassBalancer::new(training.negative_ratio, training.seed)
            .balance(labeled)
            .stage(Stage::Balance)?;

        if let Some(path) = &self.config.data.features_path {
            match write_snapshot(path, &balanced.rows).await {
                Ok(()) => info!("Feature snapshot written to {}", path),
                Err(e) => warn!("Could not write feature snapshot to {}: {}", path, e),
            }
        }

        let selected = ModelSelector::new(training.clone())
            .select_best(&balanced, training.test_fraction, training.seed)
            .stage(Stage::Select)?;

        let summary = TrainingSummary {
            run_id: selected.run_id,
            event_count: events.len(),
            row_count,
            positive_count,
            balanced_count: balanced.len(),
            selected: selected.name.clone(),
            metrics: selected.metrics,
            candidates: selected.candidates.clone(),
        };
        Ok((selected, summary))
    }

    pub async fn run(&self) -> std::result::Result<TrainingSummary, StageError> {
        let (selected, summary) = self.train().await?;
        self.model_store.save(&selected).await.stage(Stage::Persist)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::CandidateKind;

    fn row(i: u64, label: u8) -> LabeledRow {
        // Buyers add to cart; browsers mostly only view.
        LabeledRow {
            visitor_id: i,
            item_id: i % 17,
            view_count: (i % 4) as u32 + 1,
            add_count: if label == 1 { 1 + (i % 3) as u32 } else { (i % 5 == 0) as u32 },
            days_in_cart: 16_000.0 + (i % 30) as f64,
            unique_views: (i % 9) as u32,
            label,
        }
    }

    fn dataset() -> BalancedDataset {
        BalancedDataset::new(
            (0..200)
                .map(|i| row(i, u8::from(i % 4 == 0)))
                .collect(),
        )
    }

    fn fast_config() -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.forest.n_estimators = 15;
        config.logistic.max_iter = 300;
        config
    }

    #[test]
    fn test_selected_model_has_best_f1() {
        let selected = ModelSelector::new(fast_config()).select_best(&dataset(), 0.2, 42).unwrap();

        assert_eq!(selected.candidates.len(), 2);
        for report in &selected.candidates {
            assert!(selected.metrics.f1_score >= report.metrics.f1_score);
        }
        assert_eq!(selected.schema, FeatureSchema::current());
    }

    #[test]
    fn test_identical_candidates_tie_on_f1() {
        let mut config = fast_config();
        config.roster = vec![CandidateKind::LogisticRegression, CandidateKind::LogisticRegression];
        let selected = ModelSelector::new(config).select_best(&dataset(), 0.2, 42).unwrap();
        assert_eq!(selected.candidates[0].metrics, selected.candidates[1].metrics);
        assert_eq!(selected.name, "logistic_regression");
    }

    #[test]
    fn test_best_candidate_prefers_first_on_tie() {
        let report = |name: &str, f1_score: f64| CandidateReport {
            name: name.to_string(),
            metrics: ClassificationMetrics {
                f1_score,
                ..Default::default()
            },
            training_ms: 0,
        };
        let reports = vec![report("a", 0.5), report("b", 0.7), report("c", 0.7)];
        assert_eq!(best_candidate(&reports), Some(1));
        assert_eq!(best_candidate(&[]), None);
    }

    #[test]
    fn test_empty_roster_is_training_failure() {
        let mut config = fast_config();
        config.roster.clear();
        let err = ModelSelector::new(config).select_best(&dataset(), 0.2, 42).unwrap_err();
        assert!(matches!(err, CartRankError::TrainingFailure { .. }));
    }

    #[test]
    fn test_single_class_split_is_degenerate() {
        let rows = (0..20).map(|i| row(i, 1)).collect();
        let err = ModelSelector::new(fast_config())
            .select_best(&BalancedDataset::new(rows), 0.2, 42)
            .unwrap_err();
        assert!(matches!(err, CartRankError::DegenerateDataset(_)));
    }
}
