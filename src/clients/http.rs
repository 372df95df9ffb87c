//! Shared plumbing for the REST clients.

use crate::errors::{Result, RotatorError};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

/// Build a reqwest client with the given request timeout.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RotatorError::config(format!("Failed to build HTTP client: {}", e)))
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Return the response if successful, otherwise classify the failure.
pub async fn ensure_success(response: Response, resource_type: &str, name: &str) -> Result<Response> {
    let status = response.status();
    debug!(status = %status, resource_type = %resource_type, name = %name, "Response received");

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_else(|_| "<unable to read error>".to_string());
    trace!(body = %body, "Error response");
    Err(RotatorError::from_status(status.as_u16(), resource_type, name, &body))
}

/// Check the status and decode a JSON body.
pub async fn read_json<T: DeserializeOwned>(
    response: Response,
    resource_type: &str,
    name: &str,
) -> Result<T> {
    let response = ensure_success(response, resource_type, name).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| RotatorError::Serialization {
        source: e,
        context: format!("Failed to decode {} '{}' response", resource_type, name),
    })
}
