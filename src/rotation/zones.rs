//! Zone lookup for validation records.

use crate::clients::DnsProvider;
use crate::domain::Domain;
use crate::errors::{Result, RotatorError};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Resolves the DNS provider zone hosting a domain, remembering answers for one run.
///
/// Candidates are tried from the two-label root outward, so `app.example.co.uk` asks for
/// `co.uk`, then `example.co.uk`, then `app.example.co.uk`. Unknown candidates are cached
/// too.
#[derive(Debug, Default)]
pub struct ZoneCache {
    known: Mutex<HashMap<String, Option<String>>>,
}

impl ZoneCache {
    pub async fn zone_for(&self, dns: &dyn DnsProvider, domain: &Domain) -> Result<String> {
        for candidate in domain.zone_candidates() {
            if let Some(cached) = self.known.lock().await.get(candidate) {
                match cached {
                    Some(zone_id) => return Ok(zone_id.clone()),
                    None => continue,
                }
            }

            match dns.resolve_zone_id(candidate).await {
                Ok(zone_id) => {
                    debug!(zone = %candidate, zone_id = %zone_id, "Resolved DNS zone");
                    self.known.lock().await.insert(candidate.to_string(), Some(zone_id.clone()));
                    return Ok(zone_id);
                }
                Err(e) if e.is_not_found() => {
                    self.known.lock().await.insert(candidate.to_string(), None);
                }
                Err(e) => return Err(e),
            }
        }

        Err(RotatorError::not_found("dns_zone", domain.as_str()))
    }
}
