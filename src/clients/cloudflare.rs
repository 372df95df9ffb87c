//! Cloudflare DNS API client.
//!
//! Every Cloudflare response is wrapped in `{success, errors, result}`; a request can
//! come back with HTTP 200 and `success: false`, so both are checked.

use super::dns::{DnsProvider, DnsRecord};
use super::http::join_url;
use crate::config::SecretString;
use crate::errors::{Result, RotatorError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

const ZONE: &str = "dns_zone";
const RECORD: &str = "dns_record";

/// Cloudflare error codes meaning "an identical record already exists"
const RECORD_EXISTS_CODES: &[i64] = &[81053, 81057, 81058];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare client authenticated with an API token.
pub struct CloudflareDnsProvider {
    client: Client,
    base_url: String,
    api_token: SecretString,
}

impl std::fmt::Debug for CloudflareDnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareDnsProvider")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token)
            .finish()
    }
}

impl CloudflareDnsProvider {
    pub fn new(client: Client, base_url: impl Into<String>, api_token: SecretString) -> Self {
        Self { client, base_url: base_url.into(), api_token }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = join_url(&self.base_url, path);
        debug!(method = %method, url = %url, "Cloudflare request");
        self.client.request(method, &url).bearer_auth(self.api_token.expose_secret())
    }

    /// Send a request and unwrap the envelope.
    ///
    /// The body is read once. An error status is classified from the envelope's error
    /// codes first (Cloudflare answers duplicate records with a 400), then by status.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource_type: &str,
        name: &str,
    ) -> Result<Option<T>> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = %status, resource_type = %resource_type, name = %name, "Response received");
        let body = response.text().await?;

        if !status.is_success() {
            trace!(body = %body, "Error response");
            return Err(classify_error_status(status.as_u16(), &body, resource_type, name));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            RotatorError::Serialization {
                source: e,
                context: format!("Failed to decode {} '{}' response", resource_type, name),
            }
        })?;
        if !envelope.success {
            return Err(classify_api_errors(&envelope.errors, resource_type, name));
        }
        Ok(envelope.result)
    }
}

/// Map a `success: false` envelope onto the taxonomy.
fn classify_api_errors(errors: &[ApiMessage], resource_type: &str, name: &str) -> RotatorError {
    if errors.iter().any(|error| RECORD_EXISTS_CODES.contains(&error.code)) {
        return RotatorError::conflict(resource_type, name);
    }
    let message = errors
        .iter()
        .map(|error| format!("{}: {}", error.code, error.message))
        .collect::<Vec<_>>()
        .join("; ");
    RotatorError::http(format!("{} '{}': {}", resource_type, name, message), 400)
}

/// Classify an error status, preferring a duplicate-record code in the envelope.
fn classify_error_status(status: u16, body: &str, resource_type: &str, name: &str) -> RotatorError {
    if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        if envelope.errors.iter().any(|error| RECORD_EXISTS_CODES.contains(&error.code)) {
            return RotatorError::conflict(resource_type, name);
        }
    }
    RotatorError::from_status(status, resource_type, name, body)
}

#[async_trait]
impl DnsProvider for CloudflareDnsProvider {
    #[instrument(skip(self))]
    async fn resolve_zone_id(&self, zone_name: &str) -> Result<String> {
        let request = self.request(reqwest::Method::GET, "zones").query(&[("name", zone_name)]);
        let zones: Vec<IdOnly> = self.send(request, ZONE, zone_name).await?.unwrap_or_default();

        zones
            .into_iter()
            .next()
            .map(|zone| zone.id)
            .ok_or_else(|| RotatorError::not_found(ZONE, zone_name))
    }

    #[instrument(skip(self, record), fields(name = %record.name, record_type = %record.record_type))]
    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let body = CreateRecordRequest {
            record_type: &record.record_type,
            name: &record.name,
            content: &record.content,
            ttl: record.ttl,
            proxied: false,
        };
        let request = self
            .request(reqwest::Method::POST, &format!("zones/{}/dns_records", zone_id))
            .json(&body);

        self.send::<serde_json::Value>(request, RECORD, &record.name).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn find_record_id(&self, zone_id: &str, name: &str) -> Result<String> {
        let request = self
            .request(reqwest::Method::GET, &format!("zones/{}/dns_records", zone_id))
            .query(&[("name", name)]);
        let records: Vec<IdOnly> = self.send(request, RECORD, name).await?.unwrap_or_default();

        records
            .into_iter()
            .next()
            .map(|record| record.id)
            .ok_or_else(|| RotatorError::not_found(RECORD, name))
    }

    #[instrument(skip(self))]
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let request = self.request(
            reqwest::Method::DELETE,
            &format!("zones/{}/dns_records/{}", zone_id, record_id),
        );
        self.send::<serde_json::Value>(request, RECORD, record_id).await.map(|_| ())
    }
}
