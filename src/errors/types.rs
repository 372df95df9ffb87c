//! # Error Types
//!
//! Error taxonomy for the rotator using `thiserror`.
//!
//! Remote failures are classified when the HTTP response is mapped (see
//! [`RotatorError::from_status`]) so that the rotation engine can decide between
//! "treat as success", "skip and let the next run retry" and "abort".

/// Custom result type for rotator operations
pub type Result<T> = std::result::Result<T, RotatorError>;

/// Main error type for the rotator
#[derive(thiserror::Error, Debug)]
pub enum RotatorError {
    /// Malformed or inconsistent configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Field-level validation failures
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The remote resource already exists
    #[error("Resource conflict: {resource_type} '{name}' already exists")]
    Conflict { resource_type: String, name: String },

    /// The remote resource does not exist
    #[error("Resource not found: {resource_type} '{name}'")]
    NotFound { resource_type: String, name: String },

    /// Rate limits, timeouts and 5xx responses
    #[error("Transient remote failure: {message}")]
    Transient { message: String, retry_after: Option<u64> },

    /// The remote service refused the call because of the resource's current state
    #[error("Precondition failed for {resource_type} '{name}': {message}")]
    Precondition { resource_type: String, name: String, message: String },

    /// Any other unsuccessful HTTP response
    #[error("HTTP error: {message} (status: {status})")]
    Http { message: String, status: u16 },

    /// Credentials were rejected or could not be obtained
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RotatorError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a conflict error
    pub fn conflict<R: Into<String>, N: Into<String>>(resource_type: R, name: N) -> Self {
        Self::Conflict { resource_type: resource_type.into(), name: name.into() }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, N: Into<String>>(resource_type: R, name: N) -> Self {
        Self::NotFound { resource_type: resource_type.into(), name: name.into() }
    }

    /// Create a transient error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient { message: message.into(), retry_after: None }
    }

    /// Create a precondition error
    pub fn precondition<R: Into<String>, N: Into<String>, M: Into<String>>(
        resource_type: R,
        name: N,
        message: M,
    ) -> Self {
        Self::Precondition {
            resource_type: resource_type.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Http { message: message.into(), status }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Map an unsuccessful HTTP status onto the error taxonomy.
    ///
    /// `resource_type` and `name` identify the resource the request addressed; `body`
    /// is the raw response body, kept for the message.
    pub fn from_status(status: u16, resource_type: &str, name: &str, body: &str) -> Self {
        match status {
            404 => Self::not_found(resource_type, name),
            409 => Self::conflict(resource_type, name),
            401 | 403 => Self::auth(format!("{} '{}': {}", resource_type, name, body)),
            408 | 429 | 500..=599 => Self::Transient {
                message: format!("{} '{}' (status {}): {}", resource_type, name, status, body),
                retry_after: None,
            },
            400 if body.contains("FAILED_PRECONDITION") => {
                Self::precondition(resource_type, name, body)
            }
            _ => Self::http(format!("{} '{}': {}", resource_type, name, body), status),
        }
    }

    /// True when the remote resource already exists
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True when the remote resource is missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for configuration problems that must abort a run before any remote call
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Validation { .. })
    }

    /// Check if this error may succeed when retried after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Precondition { .. } | Self::Transport(_))
    }
}

impl From<serde_json::Error> for RotatorError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<reqwest::Error> for RotatorError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::transient(format!("request timed out: {}", error));
        }
        if error.is_decode() {
            return Self::internal(format!("failed to decode response: {}", error));
        }
        Self::Transport(error.to_string())
    }
}

impl From<config::ConfigError> for RotatorError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for RotatorError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::Validation { message: format!("Validation failed: {}", message), field: None }
    }
}
