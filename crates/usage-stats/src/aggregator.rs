//! Rolling statistics aggregator

use chrono::{DateTime, Utc};
use domain_types::{Label, StatsSource, StatsView};
use ring_buffer::{RollingWindow, DEFAULT_CAPACITY};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// UTC day bucket key
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";
/// UTC hour bucket key
pub const HOUR_KEY_FORMAT: &str = "%Y-%m-%d-%H";

#[derive(Debug, Clone)]
struct StatsState {
    total: u64,
    infected: u64,
    uninfected: u64,
    confidence_sum: f64,
    latency_sum: f64,
    latencies: RollingWindow<f64>,
    confidences: RollingWindow<f64>,
    // Unbounded: one entry per day/hour seen since start
    daily: BTreeMap<String, u64>,
    hourly: BTreeMap<String, u64>,
}

impl StatsState {
    fn new(window: usize) -> Self {
        Self {
            total: 0,
            infected: 0,
            uninfected: 0,
            confidence_sum: 0.0,
            latency_sum: 0.0,
            latencies: RollingWindow::new(window),
            confidences: RollingWindow::new(window),
            daily: BTreeMap::new(),
            hourly: BTreeMap::new(),
        }
    }
}

/// Copy of the aggregate taken at one instant
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    state: StatsState,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.state.total
    }

    pub fn infected(&self) -> u64 {
        self.state.infected
    }

    pub fn uninfected(&self) -> u64 {
        self.state.uninfected
    }

    /// Latency samples in arrival order
    pub fn latencies(&self) -> Vec<f64> {
        self.state.latencies.to_vec()
    }

    /// Confidence samples in arrival order
    pub fn confidences(&self) -> Vec<f64> {
        self.state.confidences.to_vec()
    }

    pub fn daily(&self) -> &BTreeMap<String, u64> {
        &self.state.daily
    }

    pub fn hourly(&self) -> &BTreeMap<String, u64> {
        &self.state.hourly
    }

    /// Derive the read model; `now` selects the "today" bucket
    pub fn view(&self, now: DateTime<Utc>) -> StatsView {
        let s = &self.state;
        let mut view = StatsView::empty(StatsSource::Memory);

        view.total_classifications = s.total;
        view.parasitized_count = s.infected;
        view.uninfected_count = s.uninfected;
        if s.total > 0 {
            view.average_confidence = s.confidence_sum / s.total as f64;
            view.average_processing_time = s.latency_sum / s.total as f64;
        }
        view.today_classifications = s
            .daily
            .get(&now.format(DAY_KEY_FORMAT).to_string())
            .copied()
            .unwrap_or(0);
        view.daily_classifications = s.daily.clone();
        view.hourly_classifications = s.hourly.clone();

        view.with_windows(&s.latencies.to_vec(), &s.confidences.to_vec())
    }
}

/// Thread-safe aggregate over every classification since start
#[derive(Debug)]
pub struct StatisticsAggregator {
    state: Mutex<StatsState>,
}

impl StatisticsAggregator {
    /// Aggregator keeping `window` recent samples
    pub fn new(window: usize) -> Self {
        Self {
            state: Mutex::new(StatsState::new(window)),
        }
    }

    /// Record one classification at the current time
    pub fn record(&self, label: Label, confidence: f64, latency_secs: f64) {
        self.record_at(label, confidence, latency_secs, Utc::now());
    }

    /// Record one classification at `now`
    pub fn record_at(&self, label: Label, confidence: f64, latency_secs: f64, now: DateTime<Utc>) {
        let day = now.format(DAY_KEY_FORMAT).to_string();
        let hour = now.format(HOUR_KEY_FORMAT).to_string();

        let mut state = self.lock();
        state.total += 1;
        match label {
            Label::Infected => state.infected += 1,
            Label::Uninfected => state.uninfected += 1,
        }
        state.confidence_sum += confidence;
        state.latency_sum += latency_secs;
        state.latencies.push(latency_secs);
        state.confidences.push(confidence);
        *state.daily.entry(day).or_insert(0) += 1;
        *state.hourly.entry(hour).or_insert(0) += 1;

        debug!("Recorded {} classification, total {}", label, state.total);
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.lock().clone(),
        }
    }

    /// Snapshot rendered as a view for the current time
    pub fn view(&self) -> StatsView {
        self.snapshot().view(Utc::now())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
