//! Prometheus metrics for the auto-import controller
//!
//! This module exposes metrics for monitoring controller health and import outcomes.

mod prometheus;

pub use prometheus::*;
