//! # Observability
//!
//! Structured logging and the counters recorded during a rotation. No metrics exporter
//! is installed here; counters are recorded into whatever `metrics` recorder the
//! embedding process sets up.

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, log_settings_info};
pub use self::metrics::{describe_metrics, record_outcome};
