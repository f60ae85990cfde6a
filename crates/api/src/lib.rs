//! Malaria Detect API Server
//!
//! HTTP surface and request orchestration for malaria cell classification.

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use inference_engine::{
    ArtifactSource, InferenceEngine, MockClassifier, ModelMetadata, ModelStatus, RetrainTrigger,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use storage::{ModelVersionRecord, ResultStore};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use usage_stats::StatisticsAggregator;

pub mod config;
pub mod error;
pub mod pipeline;
mod routes;

use config::{AppConfig, LoggingConfig};
use image_pipeline::ImagePreprocessor;
use pipeline::ClassificationService;

pub use error::{ApiError, ApiResult};

/// Application state shared across handlers
pub struct AppState {
    pub service: ClassificationService,
    pub engine: Arc<InferenceEngine>,
    pub stats: Arc<StatisticsAggregator>,
    pub store: ResultStore,
    pub retrain: RetrainTrigger,
    pub config: AppConfig,
    /// Present only when the binary installed a Prometheus recorder
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, engine: Arc<InferenceEngine>, store: ResultStore) -> Self {
        let stats = Arc::new(StatisticsAggregator::default());
        let service = ClassificationService::new(
            ImagePreprocessor::new(config.preprocessing.clone()),
            engine.clone(),
            stats.clone(),
            store.clone(),
            config.server.max_batch_size,
        );

        Self {
            service,
            engine,
            stats,
            store,
            retrain: RetrainTrigger::new(config.retrain.clone()),
            config,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Write the active artifact to the model lineage table.
    /// A failed write is logged and otherwise ignored.
    pub async fn record_model_version(&self, status: &ModelStatus) {
        let Some(metadata) = &status.metadata else {
            return;
        };

        let model_path = if status.backend == "onnx" {
            self.config.model.model_path.display().to_string()
        } else {
            status.backend.to_string()
        };
        let record = ModelVersionRecord {
            version_id: metadata.version.clone(),
            model_path,
            accuracy: metadata.final_val_accuracy,
            created_at: status.loaded_at.unwrap_or_else(Utc::now),
            is_active: true,
        };

        if let Err(e) = self.store.save_model_version(&record).await {
            error!("Failed to record model version {}: {}", record.version_id, e);
        }
    }
}

/// Connect the store, load the model and assemble the state.
///
/// A model that fails to load is not fatal: the service starts unloaded and
/// answers 503 until a reload succeeds.
pub async fn build_state(
    config: AppConfig,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<AppState> {
    let store = ResultStore::connect(&config.database.url, config.database.max_connections).await?;

    let polarity = config.model.label_polarity;
    let engine = Arc::new(if config.model.mock {
        InferenceEngine::mock_with(MockClassifier::new(), polarity)
    } else {
        let source = ArtifactSource::new(
            config.model.model_path.clone(),
            config.model.metadata_path.clone(),
        );
        InferenceEngine::onnx(source, polarity)
    });

    if !engine.is_loaded() {
        let loader = engine.clone();
        match tokio::task::spawn_blocking(move || loader.reload()).await? {
            Ok(()) => info!("Model loaded"),
            Err(e) => error!("Model failed to load, starting without one: {}", e),
        }
    }

    let mut state = AppState::new(config, engine, store);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    state.record_model_version(&state.engine.status()).await;

    Ok(state)
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: &'static str,
    pub version: String,
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_info: Option<ModelMetadata>,
    pub uptime_seconds: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(health_handler))
        .route("/classify", post(routes::classify::classify_single))
        .route("/classify/batch", post(routes::classify::classify_batch))
        .route("/results/:result_id", get(routes::results::get_result))
        .route("/results/user/:user_id", get(routes::results::get_user_results))
        .route("/stats", get(routes::stats::get_stats))
        .route("/model/status", get(routes::model::get_status))
        .route("/model/reload", post(routes::model::reload))
        .route("/model/retrain", post(routes::model::retrain));

    if state.metrics.is_some() {
        router = router.route("/metrics", get(routes::stats::get_metrics));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.request_body_limit()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.engine.status();

    Json(HealthResponse {
        message: "Malaria Detect API",
        version: state.version.clone(),
        status: "healthy",
        model_loaded: status.loaded,
        model_info: status.metadata,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Initialize logging. `RUST_LOG` overrides the configured level.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

/// Run the server until ctrl-c
pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.server.bind_addr.clone();
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
