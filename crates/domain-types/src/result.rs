//! Classification result records

use crate::{DomainError, Label};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Camera tags embedded in the upload, when present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
}

impl CaptureInfo {
    /// True when no tag was found
    pub fn is_empty(&self) -> bool {
        self.make.is_none() && self.model.is_none() && self.datetime.is_none() && self.software.is_none()
    }
}

/// Descriptive metadata of an uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Container format (e.g. "png")
    pub format: String,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Decoder color type (e.g. "Rgba8")
    pub color_type: String,
    /// Size of the upload in bytes
    pub file_size_bytes: u64,
    /// EXIF capture tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureInfo>,
}

/// A single classification, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    result_id: Uuid,
    user_id: Option<String>,
    filename: String,
    label: Label,
    confidence: f64,
    processing_time: f64,
    created_at: DateTime<Utc>,
    metadata: Option<ImageMetadata>,
}

impl ClassificationResult {
    /// Create a new result with a fresh id and the current time
    pub fn new(
        user_id: Option<String>,
        filename: impl Into<String>,
        label: Label,
        confidence: f64,
        processing_time: f64,
        metadata: Option<ImageMetadata>,
    ) -> Result<Self, DomainError> {
        Self::restore(
            Uuid::new_v4(),
            user_id,
            filename.into(),
            label,
            confidence,
            processing_time,
            Utc::now(),
            metadata,
        )
    }

    /// Rebuild a result from stored fields, re-checking its invariants
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        result_id: Uuid,
        user_id: Option<String>,
        filename: String,
        label: Label,
        confidence: f64,
        processing_time: f64,
        created_at: DateTime<Utc>,
        metadata: Option<ImageMetadata>,
    ) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::ConfidenceOutOfRange(confidence));
        }
        if !processing_time.is_finite() || processing_time < 0.0 {
            return Err(DomainError::InvalidProcessingTime(processing_time));
        }

        Ok(Self {
            result_id,
            user_id,
            filename,
            label,
            confidence,
            processing_time,
            // Storage keeps millisecond precision
            created_at: created_at.trunc_subsecs(3),
            metadata,
        })
    }

    pub fn result_id(&self) -> Uuid {
        self.result_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Inference latency in seconds
    pub fn processing_time(&self) -> f64 {
        self.processing_time
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> Option<&ImageMetadata> {
        self.metadata.as_ref()
    }
}
