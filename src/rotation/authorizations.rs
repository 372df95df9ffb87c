//! DNS authorizations for the new domains and their validation records.

use super::wait::{PollOutcome, Poller};
use super::RotationContext;
use crate::clients::DnsRecord;
use crate::domain::{Domain, DnsAuthorization, ValidationRecord};
use crate::errors::Result;
use metrics::counter;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// What [`ensure_authorizations`] did, by authorization name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    /// Authorizations whose validation record was published in this call
    pub published: Vec<String>,
    pub skipped: Vec<String>,
}

/// Make sure every new domain has a DNS authorization and a published validation record.
///
/// Only a failure to list the existing authorizations is returned as an error; anything
/// that goes wrong for a single domain is logged and that domain is skipped until the
/// next run. For authorizations that already existed the validation record is only
/// looked up, and recreated when it is missing, so a publish that failed in an earlier
/// run is picked up again.
#[instrument(skip(ctx), fields(domains = ctx.config.plan.domains().count()))]
pub async fn ensure_authorizations(ctx: &RotationContext<'_>) -> Result<AuthorizationReport> {
    let existing: HashSet<String> = ctx.certificates.list_authorizations().await?.into_iter().collect();
    let mut report = AuthorizationReport::default();
    let mut created = Vec::new();

    for domain in ctx.config.plan.domains() {
        let name = domain.slug();
        if existing.contains(&name) {
            debug!(authorization = %name, "DNS authorization already exists");
            report.existing.push(name);
            continue;
        }

        match ctx.certificates.create_authorization(&name, domain.as_str()).await {
            Ok(()) => {
                info!(authorization = %name, domain = %domain, "Created DNS authorization");
                counter!("rotator_authorizations_created_total").increment(1);
                report.created.push(name.clone());
                created.push((domain, name));
            }
            Err(e) if e.is_conflict() => {
                debug!(authorization = %name, "DNS authorization appeared concurrently");
                report.existing.push(name);
            }
            Err(e) => {
                warn!(authorization = %name, domain = %domain, error = %e, "Failed to create DNS authorization, skipping");
                report.skipped.push(name);
            }
        }
    }

    for (domain, name) in created {
        let Some(record) = settle(ctx, &name).await else {
            report.skipped.push(name);
            continue;
        };
        if publish(ctx, domain, &name, &record).await {
            report.published.push(name);
        } else {
            report.skipped.push(name);
        }
    }

    let pre_existing: Vec<&Domain> =
        ctx.config.plan.domains().filter(|d| report.existing.contains(&d.slug())).collect();
    for domain in pre_existing {
        let name = domain.slug();
        if repair(ctx, domain, &name).await {
            report.published.push(name);
        }
    }

    info!(
        created = report.created.len(),
        existing = report.existing.len(),
        published = report.published.len(),
        skipped = report.skipped.len(),
        "DNS authorizations ensured"
    );
    Ok(report)
}

/// Poll a freshly created authorization until the service has filled in its record.
async fn settle(ctx: &RotationContext<'_>, name: &str) -> Option<ValidationRecord> {
    let retry = &ctx.config.timing.authorization_settle;
    let outcome = Poller::new(retry, ctx.sleeper)
        .until_ready(name, || async {
            match ctx.certificates.get_authorization(name).await {
                Ok(DnsAuthorization { record, .. }) => Ok(record),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await;

    match outcome {
        Ok(PollOutcome::Ready(record)) => Some(record),
        Ok(PollOutcome::TimedOut { attempts }) => {
            warn!(authorization = %name, attempts, "Validation record never appeared, skipping");
            None
        }
        Err(e) => {
            warn!(authorization = %name, error = %e, "Failed to read DNS authorization, skipping");
            None
        }
    }
}

/// Create the validation record in the zone hosting `domain`. Returns whether the record
/// is now in place.
async fn publish(
    ctx: &RotationContext<'_>,
    domain: &Domain,
    name: &str,
    record: &ValidationRecord,
) -> bool {
    let zone_id = match ctx.zones.zone_for(ctx.dns, domain).await {
        Ok(zone_id) => zone_id,
        Err(e) => {
            warn!(authorization = %name, domain = %domain, error = %e, "No DNS zone for domain, skipping");
            return false;
        }
    };

    let dns_record = DnsRecord {
        record_type: record.record_type.clone(),
        name: record.fqdn().to_string(),
        content: record.value.clone(),
        ttl: ctx.config.record_ttl,
    };

    match ctx.dns.create_record(&zone_id, &dns_record).await {
        Ok(()) => {
            info!(record = %dns_record.name, zone_id = %zone_id, "Published validation record");
            counter!("rotator_dns_records_created_total").increment(1);
            true
        }
        Err(e) if e.is_conflict() => {
            debug!(record = %dns_record.name, "Validation record already published");
            true
        }
        Err(e) => {
            warn!(record = %dns_record.name, error = %e, "Failed to publish validation record, skipping");
            false
        }
    }
}

/// Republish the record of a pre-existing authorization if the zone no longer has it.
/// Returns whether a record was created.
async fn repair(ctx: &RotationContext<'_>, domain: &Domain, name: &str) -> bool {
    let record = match ctx.certificates.get_authorization(name).await {
        Ok(DnsAuthorization { record: Some(record), .. }) => record,
        Ok(_) => {
            debug!(authorization = %name, "No validation record to repair yet");
            return false;
        }
        Err(e) => {
            warn!(authorization = %name, error = %e, "Failed to read DNS authorization for repair");
            return false;
        }
    };

    let zone_id = match ctx.zones.zone_for(ctx.dns, domain).await {
        Ok(zone_id) => zone_id,
        Err(e) => {
            warn!(domain = %domain, error = %e, "No DNS zone for domain, cannot repair");
            return false;
        }
    };

    match ctx.dns.find_record_id(&zone_id, record.fqdn()).await {
        Ok(_) => false,
        Err(e) if e.is_not_found() => {
            info!(record = %record.fqdn(), "Validation record missing, republishing");
            publish(ctx, domain, name, &record).await
        }
        Err(e) => {
            warn!(record = %record.fqdn(), error = %e, "Failed to look up validation record");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetainedSets, RotationConfig, TimingConfig};
    use crate::memory::{
        Call, Fault, InMemoryCertificateManager, InMemoryDnsProvider, Journal, Operation,
        RecordingSleeper,
    };

    fn config(domains: &[&str]) -> RotationConfig {
        let domains: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
        RotationConfig::new(
            "acme-prod",
            "global",
            "edge-map",
            &domains,
            &["cert-0".to_string()],
            10,
            RetainedSets::default(),
            TimingConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_call_creates_nothing() {
        let config = config(&["a.example.com", "b.example.com"]);
        let journal = Journal::new();
        let manager = InMemoryCertificateManager::with_journal(journal.clone());
        let dns = InMemoryDnsProvider::with_journal(journal.clone());
        dns.add_zone("example.com", "zone-1");
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let first = ensure_authorizations(&ctx).await.unwrap();
        assert_eq!(first.created, vec!["a-example-com", "b-example-com"]);
        assert_eq!(first.published.len(), 2);
        assert_eq!(dns.records()[0].ttl, 1);

        journal.clear();
        let second = ensure_authorizations(&ctx).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing.len(), 2);
        assert!(journal.calls().is_empty());
    }

    #[tokio::test]
    async fn test_settles_before_publishing() {
        let config = config(&["a.example.com"]);
        let manager = InMemoryCertificateManager::new();
        manager.delay_validation_records(2);
        let dns = InMemoryDnsProvider::new();
        dns.add_zone("example.com", "zone-1");
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let report = ensure_authorizations(&ctx).await.unwrap();
        assert_eq!(report.published, vec!["a-example-com"]);
        assert_eq!(sleeper.recorded().len(), 2);
        assert!(dns.record_named("_acme-challenge.a.example.com").is_some());
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_domain() {
        let config = config(&["a.example.com", "b.example.com", "c.other.org"]);
        let manager = InMemoryCertificateManager::new();
        manager.fail(Operation::CreateAuthorization, "a-example-com", Fault::Http);
        let dns = InMemoryDnsProvider::new();
        dns.add_zone("example.com", "zone-1");
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let report = ensure_authorizations(&ctx).await.unwrap();
        assert_eq!(report.created, vec!["b-example-com", "c-other-org"]);
        assert_eq!(report.published, vec!["b-example-com"]);
        assert_eq!(report.skipped, vec!["a-example-com", "c-other-org"]);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let config = config(&["a.example.com"]);
        let manager = InMemoryCertificateManager::new();
        manager.fail(Operation::ListAuthorizations, "", Fault::Transient);
        let dns = InMemoryDnsProvider::new();
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        assert!(ensure_authorizations(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_record_of_existing_authorization_is_republished() {
        let config = config(&["a.example.com"]);
        let journal = Journal::new();
        let manager = InMemoryCertificateManager::with_journal(journal.clone());
        manager.insert_authorization("a-example-com", "a.example.com");
        let dns = InMemoryDnsProvider::with_journal(journal.clone());
        dns.add_zone("example.com", "zone-1");
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let report = ensure_authorizations(&ctx).await.unwrap();
        assert_eq!(report.published, vec!["a-example-com"]);
        assert_eq!(
            journal.calls(),
            vec![Call::CreateRecord("_acme-challenge.a.example.com".to_string())]
        );

        let again = ensure_authorizations(&ctx).await.unwrap();
        assert!(again.published.is_empty());
    }

    #[tokio::test]
    async fn test_unsettled_authorization_is_published_next_run() {
        let config = config(&["a.example.com"]);
        let manager = InMemoryCertificateManager::new();
        manager.delay_validation_records(TimingConfig::default().authorization_settle.max_attempts);
        let dns = InMemoryDnsProvider::new();
        dns.add_zone("example.com", "zone-1");
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let first = ensure_authorizations(&ctx).await.unwrap();
        assert_eq!(first.created, vec!["a-example-com"]);
        assert_eq!(first.skipped, vec!["a-example-com"]);
        assert!(first.published.is_empty());
        let max_attempts = config.timing.authorization_settle.max_attempts as usize;
        assert_eq!(sleeper.recorded().len(), max_attempts - 1);
        assert!(dns.records().is_empty());

        let second = ensure_authorizations(&ctx).await.unwrap();
        assert_eq!(second.existing, vec!["a-example-com"]);
        assert_eq!(second.published, vec!["a-example-com"]);
        assert!(dns.record_named("_acme-challenge.a.example.com").is_some());
    }
}
