//! OAuth access tokens for Google APIs.

use super::http::{join_url, read_json};
use crate::config::SecretString;
use crate::errors::{Result, RotatorError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Supplies bearer tokens for Google API calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<SecretString>;
}

/// A token configured up front (e.g. `gcloud auth print-access-token`).
#[derive(Debug, Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<SecretString> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: SecretString,
    expires_in: i64,
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Default service account token from the GCE / Cloud Run metadata server, cached until
/// shortly before it expires.
pub struct MetadataServerToken {
    client: Client,
    metadata_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for MetadataServerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataServerToken").field("metadata_url", &self.metadata_url).finish()
    }
}

impl MetadataServerToken {
    pub fn new(client: Client, metadata_url: impl Into<String>) -> Self {
        Self { client, metadata_url: metadata_url.into(), cached: Mutex::new(None) }
    }
}

#[async_trait]
impl AccessTokenProvider for MetadataServerToken {
    async fn access_token(&self) -> Result<SecretString> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        let url = join_url(&self.metadata_url, "instance/service-accounts/default/token");
        debug!("Fetching access token from metadata server");
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| RotatorError::auth(format!("metadata server unreachable: {}", e)))?;
        let body: MetadataTokenResponse = read_json(response, "access_token", "default").await?;

        let lifetime = (body.expires_in - EXPIRY_MARGIN_SECONDS).max(0);
        let token = body.access_token.clone();
        *cached = Some(CachedToken {
            token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        });

        Ok(token)
    }
}
