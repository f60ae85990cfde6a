//! Aggregate statistics views

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of latencies averaged for `recent_average_processing_time_ms`
pub const RECENT_LATENCY_WINDOW: usize = 10;

/// Number of samples returned in the `recent_*` lists
pub const RECENT_SAMPLES: usize = 20;

/// Where a view was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    /// In-memory rolling aggregate (fast, resets on restart)
    Memory,
    /// Aggregation query over persisted results (authoritative)
    Store,
}

/// Summary of a window of samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl WindowSummary {
    /// Summarize a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let max = values.iter().cloned().fold(f64::MIN, f64::max);

        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        }
    }
}

/// Consistent read of classification statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub source: StatsSource,
    pub total_classifications: u64,
    pub parasitized_count: u64,
    pub uninfected_count: u64,
    /// Distinct users; only known to the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_users: Option<u64>,
    pub average_confidence: f64,
    /// Mean latency in seconds
    pub average_processing_time: f64,
    pub today_classifications: u64,
    /// Mean of the last few latencies, in milliseconds
    pub recent_average_processing_time_ms: f64,
    /// Most recent latencies (seconds), oldest first
    pub recent_processing_times: Vec<f64>,
    /// Most recent confidences, oldest first
    pub recent_confidence_scores: Vec<f64>,
    pub latency_window: WindowSummary,
    pub confidence_window: WindowSummary,
    /// Counts keyed by UTC day (`YYYY-MM-DD`)
    pub daily_classifications: BTreeMap<String, u64>,
    /// Counts keyed by UTC hour (`YYYY-MM-DD-HH`)
    pub hourly_classifications: BTreeMap<String, u64>,
}

impl StatsView {
    /// Empty view for the given source
    pub fn empty(source: StatsSource) -> Self {
        Self {
            source,
            total_classifications: 0,
            parasitized_count: 0,
            uninfected_count: 0,
            total_users: None,
            average_confidence: 0.0,
            average_processing_time: 0.0,
            today_classifications: 0,
            recent_average_processing_time_ms: 0.0,
            recent_processing_times: Vec::new(),
            recent_confidence_scores: Vec::new(),
            latency_window: WindowSummary::default(),
            confidence_window: WindowSummary::default(),
            daily_classifications: BTreeMap::new(),
            hourly_classifications: BTreeMap::new(),
        }
    }

    /// Fill the sample-derived fields from full windows (oldest first)
    pub fn with_windows(mut self, latencies: &[f64], confidences: &[f64]) -> Self {
        self.latency_window = WindowSummary::compute(latencies);
        self.confidence_window = WindowSummary::compute(confidences);
        self.recent_processing_times = tail(latencies, RECENT_SAMPLES).to_vec();
        self.recent_confidence_scores = tail(confidences, RECENT_SAMPLES).to_vec();

        let recent = tail(latencies, RECENT_LATENCY_WINDOW);
        self.recent_average_processing_time_ms = if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64 * 1000.0
        };
        self
    }

    /// Check the per-label counts add up to the total
    pub fn is_consistent(&self) -> bool {
        self.parasitized_count + self.uninfected_count == self.total_classifications
    }
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}
