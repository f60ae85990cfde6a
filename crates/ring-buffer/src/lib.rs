//! Rolling Window
//!
//! Fixed-capacity FIFO used to keep the most recent latency and
//! confidence samples without unbounded memory growth.

mod buffer;

pub use buffer::{RollingWindow, DEFAULT_CAPACITY};
