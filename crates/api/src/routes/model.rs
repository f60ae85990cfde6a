//! Model Routes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use inference_engine::{ModelStatus, RetrainOutcome};
use metrics::counter;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiResult;
use crate::AppState;

/// Response for the model status endpoint
#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    #[serde(flatten)]
    pub status: ModelStatus,
    pub retraining: bool,
}

/// Get the active artifact
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ModelStatusResponse> {
    Json(ModelStatusResponse {
        status: state.engine.status(),
        retraining: state.retrain.is_running(),
    })
}

/// Rebuild the artifact from disk and swap it in
pub async fn reload(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let engine = state.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.reload()).await?;

    if let Err(e) = outcome {
        counter!("model_reloads_total", "outcome" => "failure").increment(1);
        warn!("Reload rejected, keeping generation {}", state.engine.generation());
        return Err(e.into());
    }
    counter!("model_reloads_total", "outcome" => "success").increment(1);

    let status = state.engine.status();
    info!("Model reloaded, generation {}", status.generation);
    state.record_model_version(&status).await;

    Ok(Json(json!({
        "message": "Model reloaded successfully",
        "model": status,
    })))
}

/// Launch the configured retraining job
pub async fn retrain(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.retrain.trigger() {
        RetrainOutcome::Accepted => (
            StatusCode::ACCEPTED,
            Json(json!({
                "message": "Model retraining started",
                "status": "processing",
            })),
        ),
        RetrainOutcome::Rejected { reason } => {
            info!("Retraining request rejected: {}", reason);
            (
                StatusCode::CONFLICT,
                Json(json!({
                    "status": "rejected",
                    "reason": reason,
                })),
            )
        }
    }
}
