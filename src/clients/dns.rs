//! DNS provider abstraction for validation records.

use crate::errors::Result;
use async_trait::async_trait;

/// A record to publish in a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub record_type: String,
    /// Fully-qualified name without the trailing dot
    pub name: String,
    pub content: String,
    pub ttl: u32,
}

/// Trait for the DNS provider hosting the validation records.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Zone id for a zone name, `NotFound` if the account has no such zone
    async fn resolve_zone_id(&self, zone_name: &str) -> Result<String>;

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()>;

    /// Id of the record with this exact name, `NotFound` if there is none
    async fn find_record_id(&self, zone_id: &str, name: &str) -> Result<String>;

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()>;
}
