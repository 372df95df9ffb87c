//! Certificate management service abstraction.

use crate::domain::{CertificateState, DnsAuthorization};
use crate::errors::Result;
use async_trait::async_trait;

/// Operations the rotation engine needs from the certificate management service.
///
/// Names are short resource ids (`a-example-com`, `cert-0`), except the authorization
/// references passed to [`CertificateManager::create_certificate`], which are full
/// resource names. Creating something that already exists yields
/// [`RotatorError::Conflict`](crate::errors::RotatorError::Conflict); callers treat that
/// as success.
#[async_trait]
pub trait CertificateManager: Send + Sync {
    async fn list_authorizations(&self) -> Result<Vec<String>>;

    async fn create_authorization(&self, name: &str, domain: &str) -> Result<()>;

    /// The authorization with its validation record, once the service has populated it
    async fn get_authorization(&self, name: &str) -> Result<DnsAuthorization>;

    async fn delete_authorization(&self, name: &str) -> Result<()>;

    async fn list_certificates(&self) -> Result<Vec<String>>;

    async fn create_certificate(
        &self,
        name: &str,
        domains: &[String],
        authorization_self_links: &[String],
    ) -> Result<()>;

    async fn get_certificate_state(&self, name: &str) -> Result<CertificateState>;

    async fn delete_certificate(&self, name: &str) -> Result<()>;

    async fn list_map_entries(&self, map: &str) -> Result<Vec<String>>;

    async fn create_map_entry(
        &self,
        map: &str,
        entry: &str,
        hostname: &str,
        certificate: &str,
    ) -> Result<()>;

    /// Replace the entry's certificate references with exactly `certificate`
    async fn update_map_entry_certificate(
        &self,
        map: &str,
        entry: &str,
        certificate: &str,
    ) -> Result<()>;

    async fn delete_map_entry(&self, map: &str, entry: &str) -> Result<()>;
}
