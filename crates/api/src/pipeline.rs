//! Request orchestration
//!
//! content type -> validate/preprocess -> classify -> record stats -> persist.
//! CPU-heavy steps run on the blocking pool.

use crate::error::{ApiError, ApiResult};
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use domain_types::{ClassificationResult, LabelSpelling};
use image_pipeline::ImagePreprocessor;
use inference_engine::InferenceEngine;
use metrics::{counter, histogram};
use std::sync::Arc;
use storage::ResultStore;
use tracing::{debug, error, info, warn};
use usage_stats::StatisticsAggregator;
use uuid::Uuid;

/// One uploaded file
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    /// Declared MIME type; absent is accepted
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl ImageUpload {
    /// Whether the declared content type allows classification
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.trim_start().to_ascii_lowercase().starts_with("image/"))
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    pub user_id: Option<String>,
    pub spelling: LabelSpelling,
}

/// A classified and (normally) persisted image
#[derive(Debug, Clone)]
pub struct ClassifiedImage {
    pub result: ClassificationResult,
    pub model_version: String,
    pub persisted: bool,
    pub storage_error: Option<String>,
}

/// Outcome of a batch request
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    /// Classified images in upload order
    pub items: Vec<ClassifiedImage>,
    /// Entries with a non-image content type
    pub skipped: usize,
    /// Entries that could not be classified
    pub failed: usize,
    /// Sum of per-item model latencies, in seconds
    pub total_processing_time: f64,
    pub timestamp: DateTime<Utc>,
    /// Artifact version active when the batch finished
    pub model_version: Option<String>,
}

/// Ties the pipeline components together
pub struct ClassificationService {
    preprocessor: Arc<ImagePreprocessor>,
    engine: Arc<InferenceEngine>,
    stats: Arc<StatisticsAggregator>,
    store: ResultStore,
    max_batch_size: usize,
}

impl ClassificationService {
    pub fn new(
        preprocessor: ImagePreprocessor,
        engine: Arc<InferenceEngine>,
        stats: Arc<StatisticsAggregator>,
        store: ResultStore,
        max_batch_size: usize,
    ) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
            engine,
            stats,
            store,
            max_batch_size,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Reject oversized batches before any work is done
    pub fn check_batch_size(&self, count: usize) -> ApiResult<()> {
        if count > self.max_batch_size {
            counter!("classification_failures_total", "reason" => "batch_too_large").increment(1);
            return Err(ApiError::BatchTooLarge {
                max: self.max_batch_size,
            });
        }
        Ok(())
    }

    /// Classify, record and persist a single upload
    pub async fn classify_one(
        &self,
        upload: ImageUpload,
        options: &ClassifyOptions,
    ) -> ApiResult<ClassifiedImage> {
        if !upload.is_image() {
            counter!("classification_failures_total", "reason" => "content_type").increment(1);
            return Err(ApiError::UnsupportedContentType(
                upload.content_type.unwrap_or_default(),
            ));
        }

        let preprocessor = self.preprocessor.clone();
        let engine = self.engine.clone();
        let bytes = upload.bytes;
        let outcome = tokio::task::spawn_blocking(move || -> ApiResult<_> {
            let preprocessed = preprocessor.preprocess(&bytes)?;
            let metadata = preprocessor.extract_metadata(&bytes).ok();
            let classification = engine.classify(&preprocessed.tensor)?;
            Ok((classification, metadata))
        })
        .await?;

        let (classification, metadata) = match outcome {
            Ok(done) => done,
            Err(e) => {
                let reason = match &e {
                    ApiError::InvalidImage(_) => "invalid_image",
                    ApiError::ModelUnavailable => "model_unavailable",
                    _ => "inference",
                };
                counter!("classification_failures_total", "reason" => reason).increment(1);
                return Err(e);
            }
        };

        self.stats.record(
            classification.label,
            classification.confidence,
            classification.latency_secs,
        );
        counter!("classifications_total", "label" => classification.label.as_str()).increment(1);
        histogram!("inference_latency_seconds").record(classification.latency_secs);

        let result = ClassificationResult::new(
            options.user_id.clone(),
            upload.filename,
            classification.label,
            classification.confidence,
            classification.latency_secs,
            metadata,
        )?;

        // The caller still gets the result when the write fails
        let storage_error = match self.store.save(&result).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to persist result {}: {}", result.result_id(), e);
                Some(e.to_string())
            }
        };

        debug!(
            "Classified {} as {} ({:.3})",
            result.filename(),
            result.label(),
            result.confidence()
        );

        Ok(ClassifiedImage {
            persisted: storage_error.is_none(),
            storage_error,
            model_version: classification.model_version,
            result,
        })
    }

    /// Classify uploads one after another, keeping their order.
    ///
    /// Non-image entries are skipped and unclassifiable images are left out
    /// of the results.
    pub async fn classify_batch(
        &self,
        uploads: Vec<ImageUpload>,
        options: &ClassifyOptions,
    ) -> ApiResult<BatchOutcome> {
        if !self.engine.is_loaded() {
            return Err(ApiError::ModelUnavailable);
        }
        self.check_batch_size(uploads.len())?;

        let batch_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(uploads.len());
        let mut skipped = 0;
        let mut failed = 0;

        for upload in uploads {
            if !upload.is_image() {
                debug!("Skipping {} with content type {:?}", upload.filename, upload.content_type);
                skipped += 1;
                continue;
            }

            let filename = upload.filename.clone();
            match self.classify_one(upload, options).await {
                Ok(item) => items.push(item),
                Err(ApiError::ModelUnavailable) => return Err(ApiError::ModelUnavailable),
                Err(e) => {
                    warn!("Batch {}: could not classify {}: {}", batch_id, filename, e);
                    failed += 1;
                }
            }
        }

        let total_processing_time = items.iter().map(|i| i.result.processing_time()).sum();
        info!(
            "Batch {} done: {} classified, {} skipped, {} failed",
            batch_id,
            items.len(),
            skipped,
            failed
        );

        Ok(BatchOutcome {
            batch_id,
            items,
            skipped,
            failed,
            total_processing_time,
            timestamp: Utc::now(),
            model_version: self.engine.status().metadata.map(|m| m.version),
        })
    }
}
