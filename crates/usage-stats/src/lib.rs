//! Usage Statistics
//!
//! Process-wide aggregate of classification outcomes. Every update and every
//! read goes through one lock, so a reader never sees a total without the
//! matching per-label count. Resets on restart; the result store is the
//! durable record.

mod aggregator;

pub use aggregator::{StatisticsAggregator, StatsSnapshot, DAY_KEY_FORMAT, HOUR_KEY_FORMAT};
