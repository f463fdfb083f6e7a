use anyhow::Result;
use cartrank::services::store::{event_store_for, ModelStore};
use cartrank::services::training::TrainingPipeline;
use cartrank::{init_tracing, Config};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train and select the cart purchase model", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Overrides `data.events_path`.
    #[arg(long)]
    events: Option<String>,

    /// Overrides `training.seed`.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    info!("Starting cartrank training run");

    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    if let Some(events) = args.events {
        config.data.events_path = events;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }

    info!("Training configuration loaded: {:?}", config.training);

    let event_store = event_store_for(&config.data.events_path);
    let model_store = ModelStore::new(&config.data.model_path);
    let pipeline = TrainingPipeline::new(event_store, model_store, Arc::new(config));

    let summary = pipeline.run().await?;
    info!(
        "Run {} finished: {} events, {} rows ({} purchases), {} balanced rows; selected {} with F1 {:.3}",
        summary.run_id,
        summary.event_count,
        summary.row_count,
        summary.positive_count,
        summary.balanced_count,
        summary.selected,
        summary.metrics.f1_score
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
