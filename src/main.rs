use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use cartrank::services::serving::ModelSummary;
use cartrank::{init_tracing, AppState, CartRankError, Config, RecommendRequest};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cart recommendation serving shell", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(e: CartRankError) -> Response {
    let status = match e {
        CartRankError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        CartRankError::Data(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: e.to_string() })).into_response()
}

async fn health_check(State(state): State<AppState>) -> Json<HashMap<String, serde_json::Value>> {
    Json(state.serving_service.health_check())
}

async fn recommend(State(state): State<AppState>, Json(request): Json<RecommendRequest>) -> Response {
    match state.serving_service.recommend(&request) {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_model(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<ModelSummary>>) {
    match state.serving_service.model_summary() {
        Some(summary) => (StatusCode::OK, Json(ApiResponse::success(summary))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("No model loaded".to_string())),
        ),
    }
}

async fn reload_model(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<ModelSummary>>) {
    match state.serving_service.reload_model().await {
        Ok(summary) => (StatusCode::OK, Json(ApiResponse::success(summary))),
        Err(CartRankError::ModelUnavailable) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("No model artifact found".to_string())),
        ),
        Err(e) => {
            tracing::error!("Failed to reload model: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiResponse::error(e.to_string())))
        }
    }
}

async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, u64>>> {
    Json(ApiResponse::success(state.serving_service.get_serving_stats()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommend", post(recommend))
        .route("/model", get(get_model))
        .route("/model/reload", post(reload_model))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    info!("Starting cartrank server with config: {:?}", config.server);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?
        .block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;
    let state = AppState::new(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
