//! # Configuration Settings
//!
//! Raw settings as loaded from an optional file and the environment, validated with
//! `validator` and converted into the [`RotationConfig`] the core consumes.
//!
//! Environment variables use the `ROTATOR_` prefix and `__` between section and key,
//! for example `ROTATOR_ROTATION__DOMAINS=a.example.com,b.example.com` or
//! `ROTATOR_CLOUDFLARE__API_TOKEN=...`. List values are comma separated.

use super::rotation::{RetainedSets, RotationConfig, TimingConfig};
use super::secret::SecretString;
use crate::errors::{Result, RotatorError};
use crate::rotation::wait::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

const ENV_PREFIX: &str = "ROTATOR";

const LIST_KEYS: &[&str] = &[
    "rotation.domains",
    "rotation.certificate_names",
    "rotation.fixed_certificates",
    "rotation.fixed_authorizations",
    "rotation.fixed_map_entries",
];

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub gcp: GcpSettings,

    #[validate(nested)]
    pub cloudflare: CloudflareSettings,

    #[validate(nested)]
    pub rotation: RotationSettings,

    #[serde(default)]
    #[validate(nested)]
    pub timing: TimingSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilitySettings,

    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
}

/// Google Cloud project and Certificate Manager endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GcpSettings {
    #[validate(length(min = 1, message = "GCP project id cannot be empty"))]
    pub project_id: String,

    #[serde(default = "default_location")]
    #[validate(length(min = 1, message = "Location cannot be empty"))]
    pub location: String,

    /// Region of the Cloud Scheduler job
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default = "default_certificate_manager_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub certificate_manager_url: String,

    #[serde(default = "default_scheduler_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub scheduler_url: String,

    /// Static OAuth access token; the metadata server is used when absent
    #[serde(default)]
    pub access_token: Option<SecretString>,

    #[serde(default = "default_metadata_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub metadata_url: String,

    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub request_timeout_seconds: u64,
}

/// Cloudflare DNS API access
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CloudflareSettings {
    #[serde(default = "default_cloudflare_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub api_url: String,

    #[validate(custom(function = "validate_secret"))]
    pub api_token: SecretString,

    /// TTL for validation records; 1 is Cloudflare's "automatic"
    #[serde(default = "default_record_ttl")]
    #[validate(range(min = 1, max = 86400, message = "Record TTL must be between 1 and 86400"))]
    pub record_ttl: u32,

    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub request_timeout_seconds: u64,
}

/// What to rotate
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RotationSettings {
    #[validate(length(min = 1, message = "Certificate map cannot be empty"))]
    pub certificate_map: String,

    #[validate(length(min = 1, message = "At least one domain is required"))]
    pub domains: Vec<String>,

    #[validate(length(min = 1, message = "At least one certificate name is required"))]
    pub certificate_names: Vec<String>,

    /// Maximum number of domains per certificate
    #[validate(range(min = 1, max = 100, message = "Chunk size must be between 1 and 100"))]
    pub chunk_size: usize,

    #[serde(default)]
    pub fixed_certificates: Vec<String>,

    #[serde(default)]
    pub fixed_authorizations: Vec<String>,

    #[serde(default)]
    pub fixed_map_entries: Vec<String>,
}

/// Bounded backoff, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackoffSettings {
    #[validate(range(min = 1, max = 100, message = "Attempts must be between 1 and 100"))]
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl BackoffSettings {
    fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            backoff_multiplier: 2.0,
        }
    }

    fn from_retry_config(retry: &RetryConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts,
            initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: retry.max_backoff.as_millis() as u64,
        }
    }
}

/// Settling and pacing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TimingSettings {
    #[validate(nested)]
    pub authorization_settle: BackoffSettings,
    #[validate(nested)]
    pub map_entry_settle: BackoffSettings,
    #[validate(nested)]
    pub certificate_delete: BackoffSettings,
    pub dns_rate_limit_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let timing = TimingConfig::default();
        Self {
            authorization_settle: BackoffSettings::from_retry_config(&timing.authorization_settle),
            map_entry_settle: BackoffSettings::from_retry_config(&timing.map_entry_settle),
            certificate_delete: BackoffSettings::from_retry_config(&timing.certificate_delete),
            dns_rate_limit_ms: timing.dns_rate_limit.as_millis() as u64,
        }
    }
}

impl TimingSettings {
    pub fn to_timing_config(&self) -> TimingConfig {
        TimingConfig {
            authorization_settle: self.authorization_settle.to_retry_config(),
            map_entry_settle: self.map_entry_settle.to_retry_config(),
            certificate_delete: self.certificate_delete.to_retry_config(),
            dns_rate_limit: Duration::from_millis(self.dns_rate_limit_ms),
        }
    }
}

/// Cloud Scheduler job that triggers the rotator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub job_id: Option<String>,

    /// Pause the job once a rotation completes
    #[serde(default)]
    pub pause_on_success: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}

/// HTTP trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Settings {
    /// Load settings from an optional file overlaid with `ROTATOR_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let settings: Settings = builder.add_source(environment).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Run `validator` checks plus cross-field rules
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(RotatorError::from)?;

        if self.scheduler.pause_on_success && self.scheduler.job_id.is_none() {
            return Err(RotatorError::validation_field(
                "pause_on_success requires a scheduler job id",
                "scheduler.job_id",
            ));
        }
        if self.scheduler.job_id.is_some() && self.gcp.region.is_none() {
            return Err(RotatorError::validation_field(
                "a scheduler job requires the GCP region",
                "gcp.region",
            ));
        }

        Ok(())
    }

    /// Build the immutable configuration for the rotation core.
    pub fn rotation_config(&self) -> Result<RotationConfig> {
        let rotation = &self.rotation;
        let retained = RetainedSets::from_lists(
            &rotation.fixed_certificates,
            &rotation.fixed_authorizations,
            &rotation.fixed_map_entries,
        );

        Ok(RotationConfig::new(
            &self.gcp.project_id,
            &self.gcp.location,
            &rotation.certificate_map,
            &rotation.domains,
            &rotation.certificate_names,
            rotation.chunk_size,
            retained,
            self.timing.to_timing_config(),
        )?
        .with_record_ttl(self.cloudflare.record_ttl))
    }
}

fn validate_base_url(value: &str) -> std::result::Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => Err(ValidationError::new("base_url")
            .with_message("must be an absolute http(s) URL".into())),
    }
}

fn validate_secret(value: &SecretString) -> std::result::Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new("secret").with_message("token cannot be empty".into()));
    }
    Ok(())
}

fn default_location() -> String {
    "global".to_string()
}

fn default_certificate_manager_url() -> String {
    "https://certificatemanager.googleapis.com/v1".to_string()
}

fn default_scheduler_url() -> String {
    "https://cloudscheduler.googleapis.com/v1".to_string()
}

fn default_metadata_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1".to_string()
}

fn default_cloudflare_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_record_ttl() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings {
            gcp: GcpSettings {
                project_id: "acme-prod".to_string(),
                location: default_location(),
                region: Some("europe-west1".to_string()),
                certificate_manager_url: default_certificate_manager_url(),
                scheduler_url: default_scheduler_url(),
                access_token: None,
                metadata_url: default_metadata_url(),
                request_timeout_seconds: 30,
            },
            cloudflare: CloudflareSettings {
                api_url: default_cloudflare_url(),
                api_token: SecretString::new("cf-token"),
                record_ttl: 1,
                request_timeout_seconds: 30,
            },
            rotation: RotationSettings {
                certificate_map: "edge-map".to_string(),
                domains: vec!["a.example.com".to_string(), "b.example.com".to_string()],
                certificate_names: vec!["cert-0".to_string()],
                chunk_size: 2,
                fixed_certificates: vec![],
                fixed_authorizations: vec![],
                fixed_map_entries: vec![],
            },
            timing: TimingSettings::default(),
            scheduler: SchedulerSettings::default(),
            observability: ObservabilitySettings::default(),
            server: ServerSettings::default(),
        }
    }

    #[test]
    fn test_sample_is_valid() {
        let settings = sample();
        assert!(settings.validate().is_ok());
        let config = settings.rotation_config().unwrap();
        assert_eq!(config.plan.certificate_names(), vec!["cert-0"]);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut settings = sample();
        settings.cloudflare.api_url = "not a url".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut settings = sample();
        settings.cloudflare.api_token = SecretString::new("");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_pause_requires_job() {
        let mut settings = sample();
        settings.scheduler.pause_on_success = true;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("scheduler job id"));

        settings.scheduler.job_id = Some("rotate-certs".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_chunk_mismatch_is_config_error() {
        let mut settings = sample();
        settings.rotation.chunk_size = 1;
        let err = settings.rotation_config().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_server_bind_address() {
        assert_eq!(ServerSettings::default().bind_address(), "0.0.0.0:8080");
    }
}
