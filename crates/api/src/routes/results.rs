//! Result Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use domain_types::{ClassificationResult, ImageMetadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::TIMESTAMP_FORMAT;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_PAGE: u32 = 500;

/// Query parameters for the per-user listing
#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// A stored result, always with the canonical label spelling
#[derive(Debug, Serialize)]
pub struct ResultRecord {
    pub result_id: Uuid,
    pub user_id: Option<String>,
    pub filename: String,
    pub prediction: &'static str,
    pub confidence: f64,
    pub processing_time: f64,
    pub timestamp: String,
    pub image_metadata: Option<ImageMetadata>,
}

impl From<&ClassificationResult> for ResultRecord {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            result_id: result.result_id(),
            user_id: result.user_id().map(str::to_string),
            filename: result.filename().to_string(),
            prediction: result.label().as_str(),
            confidence: result.confidence(),
            processing_time: result.processing_time(),
            timestamp: result.created_at().format(TIMESTAMP_FORMAT).to_string(),
            image_metadata: result.metadata().cloned(),
        }
    }
}

/// One page of a user's results
#[derive(Debug, Serialize)]
pub struct UserResultsResponse {
    pub user_id: String,
    pub results: Vec<ResultRecord>,
    /// Number of results on this page
    pub total: usize,
    pub limit: u32,
    pub offset: u32,
}

/// Get one result by id
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(result_id): Path<String>,
) -> ApiResult<Json<ResultRecord>> {
    let not_found = || ApiError::NotFound(format!("Result {} not found", result_id));

    // A malformed id cannot name a stored result
    let id = Uuid::parse_str(&result_id).map_err(|_| not_found())?;
    let result = state.store.get_by_id(id).await?.ok_or_else(not_found)?;

    Ok(Json(ResultRecord::from(&result)))
}

/// List a user's results, newest first
pub async fn get_user_results(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<ResultsQuery>,
) -> ApiResult<Json<UserResultsResponse>> {
    let limit = params.limit.min(MAX_PAGE);
    let results = state
        .store
        .list_by_user(&user_id, limit, params.offset)
        .await?;

    Ok(Json(UserResultsResponse {
        total: results.len(),
        results: results.iter().map(ResultRecord::from).collect(),
        user_id,
        limit,
        offset: params.offset,
    }))
}
