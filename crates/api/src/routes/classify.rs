//! Classification Routes

use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    Json,
};
use domain_types::LabelSpelling;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::TIMESTAMP_FORMAT;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{ClassifiedImage, ClassifyOptions, ImageUpload};
use crate::AppState;

/// Query parameters shared by both classify endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ClassifyQuery {
    pub user_id: Option<String>,
    /// Spell the infected class "Infected" instead of "Parasitized"
    #[serde(default)]
    pub use_infected_labels: bool,
}

impl ClassifyQuery {
    fn options(self) -> ClassifyOptions {
        ClassifyOptions {
            user_id: self.user_id,
            spelling: LabelSpelling::from_flag(self.use_infected_labels),
        }
    }
}

/// Response for a single classification
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub result_id: Uuid,
    pub filename: String,
    pub prediction: &'static str,
    pub confidence: f64,
    pub processing_time: f64,
    pub timestamp: String,
    pub model_used: String,
    pub label_type: &'static str,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
}

impl ClassifyResponse {
    fn new(item: ClassifiedImage, spelling: LabelSpelling) -> Self {
        let result = &item.result;
        Self {
            result_id: result.result_id(),
            filename: result.filename().to_string(),
            prediction: result.label().spelled(spelling),
            confidence: result.confidence(),
            processing_time: result.processing_time(),
            timestamp: result.created_at().format(TIMESTAMP_FORMAT).to_string(),
            model_used: item.model_version,
            label_type: spelling.label_type(),
            persisted: item.persisted,
            storage_error: item.storage_error,
        }
    }
}

/// One entry of a batch response
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub result_id: Uuid,
    pub filename: String,
    pub prediction: &'static str,
    pub confidence: f64,
    pub processing_time: f64,
    pub persisted: bool,
}

/// Response for a batch classification
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub total_images: usize,
    pub results: Vec<BatchItem>,
    pub total_processing_time: f64,
    pub timestamp: String,
    pub model_used: String,
    pub label_type: &'static str,
}

async fn read_upload(field: Field<'_>) -> ApiResult<ImageUpload> {
    let filename = field.file_name().unwrap_or("upload").to_string();
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await?;
    Ok(ImageUpload {
        filename,
        content_type,
        bytes,
    })
}

/// Classify one image from the `file` field
pub async fn classify_single(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClassifyQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<ClassifyResponse>> {
    if !state.engine.is_loaded() {
        return Err(ApiError::ModelUnavailable);
    }

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            upload = Some(read_upload(field).await?);
            break;
        }
    }
    let upload =
        upload.ok_or_else(|| ApiError::BadRequest("Missing multipart field 'file'".to_string()))?;

    let options = query.options();
    let item = state.service.classify_one(upload, &options).await?;
    Ok(Json(ClassifyResponse::new(item, options.spelling)))
}

/// Classify every image in the `files` fields, in upload order
pub async fn classify_batch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClassifyQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchResponse>> {
    if !state.engine.is_loaded() {
        return Err(ApiError::ModelUnavailable);
    }

    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        // Stop reading as soon as the cap is exceeded
        state.service.check_batch_size(uploads.len() + 1)?;
        uploads.push(read_upload(field).await?);
    }
    if uploads.is_empty() {
        return Err(ApiError::BadRequest("Missing multipart field 'files'".to_string()));
    }

    let options = query.options();
    let outcome = state.service.classify_batch(uploads, &options).await?;

    let results: Vec<BatchItem> = outcome
        .items
        .iter()
        .map(|item| BatchItem {
            result_id: item.result.result_id(),
            filename: item.result.filename().to_string(),
            prediction: item.result.label().spelled(options.spelling),
            confidence: item.result.confidence(),
            processing_time: item.result.processing_time(),
            persisted: item.persisted,
        })
        .collect();

    Ok(Json(BatchResponse {
        batch_id: outcome.batch_id,
        total_images: results.len(),
        results,
        total_processing_time: outcome.total_processing_time,
        timestamp: outcome.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        model_used: outcome.model_version.unwrap_or_else(|| "unknown".to_string()),
        label_type: options.spelling.label_type(),
    }))
}
