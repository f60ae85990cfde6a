//! Statistics Routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use domain_types::{StatsSource, StatsView};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::AppState;

/// Query parameters for the stats endpoint
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_source")]
    pub source: StatsSource,
}

fn default_source() -> StatsSource {
    StatsSource::Memory
}

/// Aggregate view from the in-process cache or the store
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> ApiResult<Json<StatsView>> {
    let view = match params.source {
        StatsSource::Memory => state.stats.view(),
        StatsSource::Store => state.store.compute_statistics(Utc::now()).await?,
    };
    Ok(Json(view))
}

/// Prometheus exposition
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
