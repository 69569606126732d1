//! # Utility Modules
//!
//! Supporting utilities for logging and observability.
//!
//! ## Components
//! - **Logging**: tracing subscriber installation from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
