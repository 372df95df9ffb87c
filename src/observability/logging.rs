//! # Structured Logging
//!
//! Sets up the `tracing` subscriber and provides the span macro every rotation runs in.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the configured level. JSON
//! output is meant for Cloud Logging and other collectors that parse one object per line.

use crate::config::ObservabilitySettings;
use crate::errors::{Result, RotatorError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create the span a single rotation runs in.
///
/// Every event logged during the run carries the generated `run_id`, which makes one
/// invocation easy to pick out of interleaved logs.
///
/// ```rust,ignore
/// let span = rotation_span!("rotate");
/// let span = rotation_span!("plan", certificate_map = %map);
/// ```
#[macro_export]
macro_rules! rotation_span {
    ($operation:expr) => {
        tracing::info_span!(
            "rotation",
            operation = %$operation,
            run_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "rotation",
            operation = %$operation,
            run_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `verbose` forces `debug` when `RUST_LOG` is unset. Installing twice is not an error,
/// the first subscriber simply stays in place.
pub fn init_logging(settings: &ObservabilitySettings, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { settings.log_level.as_str() };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            RotatorError::validation_field(
                format!("Invalid log level '{}': {}", default_level, e),
                "observability.log_level",
            )
        })?,
    };

    let json_layer = settings.json_logging.then(|| fmt::layer().json().with_current_span(true));
    let text_layer = (!settings.json_logging).then(|| fmt::layer().with_target(true));

    // Subscriber may already be set elsewhere (e.g. integration tests)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init();
    Ok(())
}

/// Log the effective settings at startup. Secrets never reach this point unredacted.
pub fn log_settings_info(settings: &crate::config::Settings) {
    tracing::info!(
        project_id = %settings.gcp.project_id,
        location = %settings.gcp.location,
        certificate_map = %settings.rotation.certificate_map,
        domains = settings.rotation.domains.len(),
        certificates = settings.rotation.certificate_names.len(),
        chunk_size = settings.rotation.chunk_size,
        pause_on_success = settings.scheduler.pause_on_success,
        json_logging = settings.observability.json_logging,
        "certmap-rotator configuration"
    );
}
