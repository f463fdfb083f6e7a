use crate::config::Config;
use crate::error::{CartRankError, Result};
use crate::models::*;
use crate::services::store::ModelStore;
use crate::services::training::SelectedModel;
use crate::utils::rank_indices;
use crate::utils::validation::validate_cart;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Single-writer, multi-reader publish point for the current model.
/// Readers clone the `Arc` and keep scoring against it even if a newer
/// model is published mid-request.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<SelectedModel>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, model: Arc<SelectedModel>) -> Option<Arc<SelectedModel>> {
        self.current.write().replace(model)
    }

    pub fn current(&self) -> Result<Arc<SelectedModel>> {
        self.current.read().clone().ok_or(CartRankError::ModelUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub recommended: Vec<(u64, f64)>,
    pub item_scores: Vec<(u64, f64)>,
}

/// Scores a cart against a model and orders the items by purchase probability.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    schema: FeatureSchema,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            schema: FeatureSchema::current(),
        }
    }

    pub fn rank(&self, model: &SelectedModel, cart: &[CartItem], top_k: i64) -> Result<Ranking> {
        self.schema.ensure_compatible(&model.schema)?;
        validate_cart(cart)?;

        let features = self.schema.vectorize_all(cart)?;
        let probabilities: Vec<f64> = features.iter().map(|row| model.predict_proba(row)).collect();

        let item_scores: Vec<(u64, f64)> = rank_indices(&probabilities)
            .into_iter()
            .map(|i| (cart[i].item_id, probabilities[i]))
            .collect();

        let take = usize::try_from(top_k).unwrap_or(0);
        let recommended = item_scores.iter().take(take).copied().collect();

        Ok(Ranking {
            recommended,
            item_scores,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub run_id: Uuid,
    pub name: String,
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    pub f1_score: f64,
}

impl From<&SelectedModel> for ModelSummary {
    fn from(model: &SelectedModel) -> Self {
        Self {
            run_id: model.run_id,
            name: model.name.clone(),
            schema_version: model.schema.version,
            trained_at: model.trained_at,
            f1_score: model.metrics.f1_score,
        }
    }
}

pub struct ServingService {
    registry: Arc<ModelRegistry>,
    engine: ScoringEngine,
    model_store: ModelStore,
    config: Arc<Config>,
    serving_stats: Arc<DashMap<String, u64>>,
}

impl ServingService {
    pub fn new(registry: Arc<ModelRegistry>, model_store: ModelStore, config: Arc<Config>) -> Self {
        Self {
            registry,
            engine: ScoringEngine::new(),
            model_store,
            config,
            serving_stats: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn default_top_k(&self) -> i64 {
        self.config.recommendation.default_top_k
    }

    pub fn recommend(&self, request: &RecommendRequest) -> Result<RecommendResponse> {
        self.increment_stat("total_requests");
        let start_time = Instant::now();

        let top_k = request.top_k.unwrap_or_else(|| self.default_top_k());
        let result = self
            .registry
            .current()
            .and_then(|model| self.engine.rank(&model, &request.cart, top_k));

        let ranking = match result {
            Ok(ranking) => ranking,
            Err(e) => {
                let key = match e {
                    CartRankError::ModelUnavailable => "unavailable_requests",
                    CartRankError::Data(_) => "invalid_requests",
                    _ => "failed_requests",
                };
                self.increment_stat(key);
                if e.is_recoverable() {
                    warn!("Recommendation for user {} rejected: {}", request.user_id, e);
                } else {
                    error!("Recommendation for user {} failed: {}", request.user_id, e);
                }
                return Err(e);
            }
        };

        let latency = start_time.elapsed().as_micros() as u64;
        self.record_latency(latency);
        self.increment_stat("successful_requests");

        let recommended_items: Vec<u64> = ranking.recommended.iter().map(|(item_id, _)| *item_id).collect();
        info!(
            "Ranked {} cart items for user {} in {}us",
            request.cart.len(),
            request.user_id,
            latency
        );

        Ok(RecommendResponse {
            user_id: request.user_id,
            recommended_count: recommended_items.len(),
            recommended_items,
            total_candidates: request.cart.len(),
            item_scores: ranking.item_scores,
        })
    }

    /// Loads the artifact from disk and publishes it; the previous model
    /// stays live if loading fails.
    pub async fn reload_model(&self) -> Result<ModelSummary> {
        match self.model_store.load().await {
            Ok(model) => {
                self.engine.schema.ensure_compatible(&model.schema)?;
                let summary = ModelSummary::from(&model);
                self.registry.publish(Arc::new(model));
                self.increment_stat("model_updates");
                info!(
                    "Published model {} ({}) from {}",
                    summary.name,
                    summary.run_id,
                    self.model_store.path().display()
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Failed to load model from {}: {}", self.model_store.path().display(), e);
                Err(e)
            }
        }
    }

    pub fn model_summary(&self) -> Option<ModelSummary> {
        self.registry.current().ok().map(|model| ModelSummary::from(model.as_ref()))
    }

    pub fn health_check(&self) -> HashMap<String, serde_json::Value> {
        let mut health = HashMap::new();
        health.insert("status".to_string(), serde_json::Value::String("ok".to_string()));
        health.insert("model_loaded".to_string(), serde_json::Value::Bool(self.registry.is_loaded()));
        health
    }

    /// Counters plus `avg_latency_us`, derived from the latency total.
    pub fn get_serving_stats(&self) -> HashMap<String, u64> {
        let mut stats: HashMap<String, u64> = self
            .serving_stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let successful = stats.get("successful_requests").copied().unwrap_or(0);
        if successful > 0 {
            let total = stats.get("total_latency_us").copied().unwrap_or(0);
            stats.insert("avg_latency_us".to_string(), total / successful);
        }
        stats
    }

    fn increment_stat(&self, key: &str) {
        *self.serving_stats.entry(key.to_string()).or_insert(0) += 1;
    }

    // Each key is updated under its own entry lock, so concurrent requests never lose samples.
    fn record_latency(&self, latency_us: u64) {
        *self.serving_stats.entry("total_latency_us".to_string()).or_insert(0) += latency_us;
        self.serving_stats
            .entry("max_latency_us".to_string())
            .and_modify(|max| *max = (*max).max(latency_us))
            .or_insert(latency_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{CandidateModel, LogisticRegression};
    use crate::utils::metrics::ClassificationMetrics;

    /// p = sigmoid(view_count) so the cart order is controlled by views.
    fn view_model() -> SelectedModel {
        let model = LogisticRegression::from_parts(vec![0.0; 4], vec![1.0; 4], vec![1.0, 0.0, 0.0, 0.0], 0.0);
        SelectedModel::new(CandidateModel::LogisticRegression(model), ClassificationMetrics::default())
    }

    fn cart() -> Vec<CartItem> {
        vec![
            CartItem::new(1, 3, 0, 0.0, 0),
            CartItem::new(2, 0, 0, 0.0, 0),
            CartItem::new(3, 1, 0, 0.0, 0),
        ]
    }

    #[test]
    fn test_rank_orders_by_probability() {
        let ranking = ScoringEngine::new().rank(&view_model(), &cart(), 2).unwrap();
        let items: Vec<u64> = ranking.recommended.iter().map(|(id, _)| *id).collect();
        assert_eq!(items, vec![1, 3]);
        assert_eq!(ranking.item_scores.len(), 3);
    }

    #[test]
    fn test_non_positive_top_k_recommends_nothing() {
        let engine = ScoringEngine::new();
        for top_k in [0, -3] {
            let ranking = engine.rank(&view_model(), &cart(), top_k).unwrap();
            assert!(ranking.recommended.is_empty());
            assert_eq!(ranking.item_scores.len(), 3);
        }
        let all = engine.rank(&view_model(), &cart(), 50).unwrap();
        assert_eq!(all.recommended.len(), 3);
    }

    #[test]
    fn test_ties_keep_cart_order() {
        let cart = vec![CartItem::new(9, 1, 0, 0.0, 0), CartItem::new(4, 1, 0, 0.0, 0)];
        let ranking = ScoringEngine::new().rank(&view_model(), &cart, 5).unwrap();
        assert_eq!(ranking.item_scores[0].0, 9);
        assert_eq!(ranking.item_scores[1].0, 4);
    }

    #[test]
    fn test_schema_mismatch_is_data_error() {
        let mut model = view_model();
        model.schema.version = 99;
        let err = ScoringEngine::new().rank(&model, &cart(), 2).unwrap_err();
        assert!(matches!(err, CartRankError::Data(_)));
    }

    #[test]
    fn test_recommend_without_model_is_unavailable() {
        let service = ServingService::new(
            Arc::new(ModelRegistry::new()),
            ModelStore::new("unused.json"),
            Arc::new(Config::default()),
        );
        let request = RecommendRequest {
            user_id: 1,
            cart: cart(),
            top_k: Some(2),
        };
        assert!(matches!(service.recommend(&request), Err(CartRankError::ModelUnavailable)));
        assert_eq!(service.get_serving_stats().get("unavailable_requests"), Some(&1));

        service.registry().publish(Arc::new(view_model()));
        let response = service.recommend(&request).unwrap();
        assert_eq!(response.recommended_items, vec![1, 3]);
        assert_eq!(response.total_candidates, 3);
        assert_eq!(response.recommended_count, 2);
    }

    #[tokio::test]
    async fn test_reload_rejects_malformed_forest_and_keeps_serving() {
        use crate::algorithms::{Classifier, ClassWeights, RandomForest};
        use nalgebra::DMatrix;

        let x = DMatrix::from_fn(20, 4, |i, j| (i * (j + 1)) as f64);
        let y: Vec<u8> = (0..20).map(|i| u8::from(i >= 10)).collect();
        let mut forest = RandomForest::new(3, Some(3), 2, 1);
        forest.fit(&x, &y, &ClassWeights::balanced(&y).unwrap()).unwrap();
        let model = SelectedModel::new(CandidateModel::RandomForest(forest), ClassificationMetrics::default());

        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        store.save(&model).await.unwrap();

        let mut artifact: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(store.path()).await.unwrap()).unwrap();
        artifact["model"]["trees"][0]["nodes"][0] =
            serde_json::json!({"Split": {"feature": 9, "threshold": 0.5, "left": 1, "right": 2}});
        tokio::fs::write(store.path(), serde_json::to_vec(&artifact).unwrap()).await.unwrap();

        let service = ServingService::new(Arc::new(ModelRegistry::new()), store, Arc::new(Config::default()));
        service.registry().publish(Arc::new(view_model()));

        let err = service.reload_model().await.unwrap_err();
        assert!(matches!(err, CartRankError::Data(_)));
        assert_eq!(service.get_serving_stats().get("model_updates"), None);

        let request = RecommendRequest {
            user_id: 1,
            cart: cart(),
            top_k: Some(2),
        };
        assert_eq!(service.recommend(&request).unwrap().recommended_items, vec![1, 3]);
    }

    #[test]
    fn test_concurrent_requests_keep_consistent_stats() {
        let service = ServingService::new(
            Arc::new(ModelRegistry::new()),
            ModelStore::new("unused.json"),
            Arc::new(Config::default()),
        );
        service.registry().publish(Arc::new(view_model()));
        let request = RecommendRequest {
            user_id: 1,
            cart: cart(),
            top_k: None,
        };

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        service.recommend(&request).unwrap();
                    }
                });
            }
        });

        let stats = service.get_serving_stats();
        assert_eq!(stats["total_requests"], 200);
        assert_eq!(stats["successful_requests"], 200);
        assert!(stats["avg_latency_us"] <= stats["max_latency_us"]);
        assert!(stats["total_latency_us"] >= stats["max_latency_us"]);
    }

    #[test]
    fn test_publish_swaps_for_new_readers_only() {
        let registry = ModelRegistry::new();
        assert!(registry.current().is_err());

        registry.publish(Arc::new(view_model()));
        let held = registry.current().unwrap();
        let replaced = registry.publish(Arc::new(view_model())).unwrap();

        assert_eq!(held.run_id, replaced.run_id);
        assert_ne!(registry.current().unwrap().run_id, held.run_id);
    }
}
