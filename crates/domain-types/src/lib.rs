//! Domain Types
//!
//! Records shared by every stage of the classification pipeline:
//! labels, persisted results, image metadata and statistics views.

mod label;
mod result;
mod stats;

pub use label::{Label, LabelSpelling};
pub use result::{CaptureInfo, ClassificationResult, ImageMetadata};
pub use stats::{StatsSource, StatsView, WindowSummary};

use thiserror::Error;

/// Errors raised when constructing domain records
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainError {
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("processing time {0} must be a finite, non-negative number of seconds")]
    InvalidProcessingTime(f64),
    #[error("unknown label: {0}")]
    UnknownLabel(String),
}
