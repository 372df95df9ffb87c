//! Certificate Manager REST client.
//!
//! Talks to `certificatemanager.googleapis.com/v1` (the base URL is configurable so the
//! client can be pointed at a mock server). Mutations return long-running operations;
//! the client does not wait for them, it only surfaces operations that come back
//! already failed. Eventual consistency is handled by the rotation engine's polls.

use super::certificate_manager::CertificateManager;
use super::http::{join_url, read_json};
use super::token::AccessTokenProvider;
use crate::domain::{short_name, CertificateState, DnsAuthorization, ResourcePaths, ValidationRecord};
use crate::errors::{Result, RotatorError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

const AUTHORIZATION: &str = "dns_authorization";
const CERTIFICATE: &str = "certificate";
const MAP_ENTRY: &str = "certificate_map_entry";

/// gRPC status codes carried in failed operations
const CODE_NOT_FOUND: i64 = 5;
const CODE_ALREADY_EXISTS: i64 = 6;
const CODE_FAILED_PRECONDITION: i64 = 9;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(flatten)]
    items: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsAuthorizationResource {
    name: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    dns_resource_record: Option<DnsResourceRecord>,
}

#[derive(Debug, Deserialize)]
struct DnsResourceRecord {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    record_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct CertificateResource {
    #[serde(default)]
    managed: Option<ManagedCertificate>,
}

#[derive(Debug, Deserialize)]
struct ManagedCertificate {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ManagedCertificateRequest<'a> {
    domains: &'a [String],
    dns_authorizations: &'a [String],
}

/// Certificate Manager client for one project and location.
pub struct GcpCertificateManager {
    client: Client,
    base_url: String,
    paths: ResourcePaths,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl std::fmt::Debug for GcpCertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpCertificateManager")
            .field("base_url", &self.base_url)
            .field("parent", &self.paths.parent())
            .field("tokens", &"[AccessTokenProvider]")
            .finish()
    }
}

impl GcpCertificateManager {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        paths: ResourcePaths,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self { client, base_url: base_url.into(), paths, tokens }
    }

    fn url(&self, resource: &str) -> String {
        join_url(&self.base_url, resource)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(request.bearer_auth(token.expose_secret()))
    }

    /// Follow `nextPageToken` until exhausted, collecting short ids from `field`.
    async fn list_names(&self, collection: &str, field: &str, resource_type: &str) -> Result<Vec<String>> {
        let url = self.url(collection);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = self.authorized(request).await?.send().await?;
            let mut page: ListPage = read_json(response, resource_type, collection).await?;

            if let Some(items) = page.items.remove(field) {
                let resources: Vec<NamedResource> = serde_json::from_value(items)?;
                names.extend(resources.iter().map(|r| short_name(&r.name).to_string()));
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(collection = %collection, count = names.len(), "Listed resources");
        Ok(names)
    }

    /// Check a mutation's response and surface an operation that already failed.
    async fn finish_operation(
        &self,
        request: RequestBuilder,
        resource_type: &str,
        name: &str,
    ) -> Result<()> {
        let response = self.authorized(request).await?.send().await?;
        let operation: Operation = read_json(response, resource_type, name).await?;

        match operation.error {
            Some(error) if operation.done => Err(match error.code {
                CODE_NOT_FOUND => RotatorError::not_found(resource_type, name),
                CODE_ALREADY_EXISTS => RotatorError::conflict(resource_type, name),
                CODE_FAILED_PRECONDITION => {
                    RotatorError::precondition(resource_type, name, error.message)
                }
                _ => RotatorError::http(
                    format!("operation {} failed: {}", operation.name, error.message),
                    500,
                ),
            }),
            _ => {
                debug!(operation = %operation.name, done = operation.done, "Operation accepted");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CertificateManager for GcpCertificateManager {
    #[instrument(skip(self))]
    async fn list_authorizations(&self) -> Result<Vec<String>> {
        let collection = format!("{}/dnsAuthorizations", self.paths.parent());
        self.list_names(&collection, "dnsAuthorizations", AUTHORIZATION).await
    }

    #[instrument(skip(self))]
    async fn create_authorization(&self, name: &str, domain: &str) -> Result<()> {
        let url = self.url(&format!("{}/dnsAuthorizations", self.paths.parent()));
        let request = self
            .client
            .post(&url)
            .query(&[("dnsAuthorizationId", name)])
            .json(&json!({ "domain": domain }));
        self.finish_operation(request, AUTHORIZATION, name).await
    }

    #[instrument(skip(self))]
    async fn get_authorization(&self, name: &str) -> Result<DnsAuthorization> {
        let request = self.client.get(self.url(&self.paths.authorization(name)));
        let response = self.authorized(request).await?.send().await?;
        let resource: DnsAuthorizationResource = read_json(response, AUTHORIZATION, name).await?;

        let record = resource
            .dns_resource_record
            .filter(|record| !record.name.is_empty() && !record.data.is_empty())
            .map(|record| ValidationRecord {
                record_type: record.record_type,
                name: record.name,
                value: record.data,
            });

        Ok(DnsAuthorization {
            name: short_name(&resource.name).to_string(),
            domain: resource.domain,
            record,
        })
    }

    #[instrument(skip(self))]
    async fn delete_authorization(&self, name: &str) -> Result<()> {
        let request = self.client.delete(self.url(&self.paths.authorization(name)));
        self.finish_operation(request, AUTHORIZATION, name).await
    }

    #[instrument(skip(self))]
    async fn list_certificates(&self) -> Result<Vec<String>> {
        let collection = format!("{}/certificates", self.paths.parent());
        self.list_names(&collection, "certificates", CERTIFICATE).await
    }

    #[instrument(skip(self, domains, authorization_self_links), fields(domains = domains.len()))]
    async fn create_certificate(
        &self,
        name: &str,
        domains: &[String],
        authorization_self_links: &[String],
    ) -> Result<()> {
        let url = self.url(&format!("{}/certificates", self.paths.parent()));
        let managed =
            ManagedCertificateRequest { domains, dns_authorizations: authorization_self_links };
        let body = json!({ "managed": managed });
        let request = self.client.post(&url).query(&[("certificateId", name)]).json(&body);
        self.finish_operation(request, CERTIFICATE, name).await
    }

    #[instrument(skip(self))]
    async fn get_certificate_state(&self, name: &str) -> Result<CertificateState> {
        let request = self.client.get(self.url(&self.paths.certificate(name)));
        let response = self.authorized(request).await?.send().await?;
        let resource: CertificateResource = read_json(response, CERTIFICATE, name).await?;

        Ok(resource
            .managed
            .and_then(|managed| managed.state)
            .map(|state| CertificateState::from_wire(&state))
            .unwrap_or(CertificateState::Unspecified))
    }

    #[instrument(skip(self))]
    async fn delete_certificate(&self, name: &str) -> Result<()> {
        let request = self.client.delete(self.url(&self.paths.certificate(name)));
        self.finish_operation(request, CERTIFICATE, name).await
    }

    #[instrument(skip(self))]
    async fn list_map_entries(&self, map: &str) -> Result<Vec<String>> {
        let collection = format!("{}/certificateMapEntries", self.paths.certificate_map(map));
        self.list_names(&collection, "certificateMapEntries", MAP_ENTRY).await
    }

    #[instrument(skip(self))]
    async fn create_map_entry(
        &self,
        map: &str,
        entry: &str,
        hostname: &str,
        certificate: &str,
    ) -> Result<()> {
        let url =
            self.url(&format!("{}/certificateMapEntries", self.paths.certificate_map(map)));
        let body = json!({
            "hostname": hostname,
            "certificates": [self.paths.certificate(certificate)],
        });
        let request =
            self.client.post(&url).query(&[("certificateMapEntryId", entry)]).json(&body);
        self.finish_operation(request, MAP_ENTRY, entry).await
    }

    #[instrument(skip(self))]
    async fn update_map_entry_certificate(
        &self,
        map: &str,
        entry: &str,
        certificate: &str,
    ) -> Result<()> {
        let url = self.url(&self.paths.map_entry(map, entry));
        let body = json!({ "certificates": [self.paths.certificate(certificate)] });
        let request =
            self.client.patch(&url).query(&[("updateMask", "certificates")]).json(&body);
        self.finish_operation(request, MAP_ENTRY, entry).await
    }

    #[instrument(skip(self))]
    async fn delete_map_entry(&self, map: &str, entry: &str) -> Result<()> {
        let request = self.client.delete(self.url(&self.paths.map_entry(map, entry)));
        self.finish_operation(request, MAP_ENTRY, entry).await
    }
}
