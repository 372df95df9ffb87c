//! The immutable configuration handed to the rotation core.

use crate::domain::{BatchPlan, Domain, ResourcePaths};
use crate::errors::{Result, RotatorError};
use crate::rotation::wait::RetryConfig;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Resource names that survive teardown whatever generation they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetainedSets {
    pub certificates: BTreeSet<String>,
    pub authorizations: BTreeSet<String>,
    pub map_entries: BTreeSet<String>,
}

impl RetainedSets {
    /// Build from raw lists, ignoring blank entries.
    pub fn from_lists(
        certificates: &[String],
        authorizations: &[String],
        map_entries: &[String],
    ) -> Self {
        fn clean(values: &[String]) -> BTreeSet<String> {
            values
                .iter()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect()
        }

        Self {
            certificates: clean(certificates),
            authorizations: clean(authorizations),
            map_entries: clean(map_entries),
        }
    }
}

/// Settling and pacing behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    /// Poll for a new authorization's validation record
    pub authorization_settle: RetryConfig,
    /// Poll for deleted map entries to disappear before deleting certificates
    pub map_entry_settle: RetryConfig,
    /// Retry certificate deletion while the service still reports it in use
    pub certificate_delete: RetryConfig,
    /// Pause after each authorization teardown to respect the DNS provider's rate limit
    pub dns_rate_limit: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            authorization_settle: RetryConfig {
                max_attempts: 8,
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(10),
                backoff_multiplier: 2.0,
            },
            map_entry_settle: RetryConfig {
                max_attempts: 10,
                initial_backoff: Duration::from_secs(5),
                max_backoff: Duration::from_secs(30),
                backoff_multiplier: 2.0,
            },
            certificate_delete: RetryConfig {
                max_attempts: 6,
                initial_backoff: Duration::from_secs(10),
                max_backoff: Duration::from_secs(60),
                backoff_multiplier: 2.0,
            },
            dns_rate_limit: Duration::from_secs(2),
        }
    }
}

/// Everything one rotation needs to know, validated once.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub paths: ResourcePaths,
    pub certificate_map: String,
    pub plan: BatchPlan,
    pub retained: RetainedSets,
    /// TTL for published validation records; 1 means "automatic" at Cloudflare
    pub record_ttl: u32,
    pub timing: TimingConfig,
}

impl RotationConfig {
    /// Validate the raw inputs and build the batch plan.
    ///
    /// Fails before any remote call when a domain is malformed, two domains share a
    /// resource id, or the certificate names do not match the batch count.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: &str,
        location: &str,
        certificate_map: &str,
        domains: &[String],
        certificate_names: &[String],
        chunk_size: usize,
        retained: RetainedSets,
        timing: TimingConfig,
    ) -> Result<Self> {
        if project_id.trim().is_empty() {
            return Err(RotatorError::config("project id cannot be empty"));
        }
        if certificate_map.trim().is_empty() {
            return Err(RotatorError::config("certificate map cannot be empty"));
        }

        let domains = parse_domains(domains)?;
        let certificate_names: Vec<String> = certificate_names
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        let unique: BTreeSet<&String> = certificate_names.iter().collect();
        if unique.len() != certificate_names.len() {
            return Err(RotatorError::config("certificate names must be unique"));
        }

        let paths = ResourcePaths::new(project_id.trim(), location.trim());
        let plan = BatchPlan::new(&domains, &certificate_names, chunk_size, &paths)?;

        Ok(Self {
            paths,
            certificate_map: certificate_map.trim().to_string(),
            plan,
            retained,
            record_ttl: 1,
            timing,
        })
    }

    pub fn with_record_ttl(mut self, ttl: u32) -> Self {
        self.record_ttl = ttl;
        self
    }
}

/// Parse every domain and reject duplicates, including distinct domains that would
/// collapse onto the same resource id.
fn parse_domains(raw: &[String]) -> Result<Vec<Domain>> {
    let mut by_slug: HashMap<String, Domain> = HashMap::new();
    let mut domains = Vec::with_capacity(raw.len());

    for value in raw.iter().filter(|value| !value.trim().is_empty()) {
        let domain = Domain::parse(value)?;
        if let Some(previous) = by_slug.insert(domain.slug(), domain.clone()) {
            return Err(RotatorError::config(if previous == domain {
                format!("domain '{}' is listed more than once", domain)
            } else {
                format!(
                    "domains '{}' and '{}' both map to resource id '{}'",
                    previous,
                    domain,
                    domain.slug()
                )
            }));
        }
        domains.push(domain);
    }

    Ok(domains)
}
