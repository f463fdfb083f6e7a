pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{CartRankError, Stage, StageError};
pub use models::*;

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<services::serving::ModelRegistry>,
    pub serving_service: Arc<services::serving::ServingService>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let registry = Arc::new(services::serving::ModelRegistry::new());
        let model_store = services::store::ModelStore::new(&config.data.model_path);

        let serving_service = Arc::new(services::serving::ServingService::new(
            registry.clone(),
            model_store,
            config.clone(),
        ));

        // A missing artifact is not fatal: the shell reports "no model" until one is published.
        if let Err(e) = serving_service.reload_model().await {
            warn!("Starting without a model ({}); run cartrank-trainer first", e);
        }

        Ok(Self {
            config,
            registry,
            serving_service,
        })
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
