//! HTTP route handlers

pub mod classify;
pub mod model;
pub mod results;
pub mod stats;
