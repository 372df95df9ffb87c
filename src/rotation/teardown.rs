//! Removal of everything the new generation superseded.
//!
//! Deletion order matters: a certificate cannot be deleted while a map entry still
//! references it, and an authorization cannot be deleted while a certificate does. The
//! validation record of an authorization is removed right before the authorization.

use super::wait::{PollOutcome, Poller};
use super::RotationContext;
use crate::domain::{DnsAuthorization, Domain};
use crate::errors::{Result, RotatorError};
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// Resources that exist remotely but belong to neither the new generation nor the
/// retained sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownPlan {
    pub map_entries: Vec<String>,
    pub certificates: Vec<String>,
    pub authorizations: Vec<String>,
}

impl TeardownPlan {
    pub fn is_empty(&self) -> bool {
        self.map_entries.is_empty() && self.certificates.is_empty() && self.authorizations.is_empty()
    }
}

/// What [`tear_down`] deleted. `failed` holds `kind/name` of resources left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub map_entries: Vec<String>,
    pub certificates: Vec<String>,
    pub authorizations: Vec<String>,
    /// Validation record names
    pub records: Vec<String>,
    pub failed: Vec<String>,
}

/// `existing − (new ∪ retained)`, keeping the listing order.
pub fn superseded(existing: &[String], new: &[String], retained: &BTreeSet<String>) -> Vec<String> {
    let new: BTreeSet<&str> = new.iter().map(String::as_str).collect();
    existing
        .iter()
        .filter(|name| !new.contains(name.as_str()) && !retained.contains(name.as_str()))
        .cloned()
        .collect()
}

/// List all three resource classes and work out what teardown would delete.
#[instrument(skip(ctx))]
pub async fn plan_teardown(ctx: &RotationContext<'_>) -> Result<TeardownPlan> {
    let config = ctx.config;
    let map_entries = ctx.certificates.list_map_entries(&config.certificate_map).await?;
    let certificates = ctx.certificates.list_certificates().await?;
    let authorizations = ctx.certificates.list_authorizations().await?;

    Ok(TeardownPlan {
        map_entries: superseded(
            &map_entries,
            &config.plan.map_entry_names(),
            &config.retained.map_entries,
        ),
        certificates: superseded(
            &certificates,
            &config.plan.certificate_names(),
            &config.retained.certificates,
        ),
        authorizations: superseded(
            &authorizations,
            &config.plan.authorization_names(),
            &config.retained.authorizations,
        ),
    })
}

/// Delete everything in `plan`: map entries, then certificates, then each
/// authorization's validation record followed by the authorization itself.
///
/// Failures are logged and the resource is left for the next run.
#[instrument(skip(ctx, plan))]
pub async fn tear_down(ctx: &RotationContext<'_>, plan: &TeardownPlan) -> TeardownReport {
    let mut report = TeardownReport::default();
    let map = ctx.config.certificate_map.as_str();

    for entry in &plan.map_entries {
        match ctx.certificates.delete_map_entry(map, entry).await {
            Ok(()) => {
                info!(entry = %entry, "Deleted map entry");
                counter!("rotator_map_entries_deleted_total").increment(1);
                report.map_entries.push(entry.clone());
            }
            Err(e) if e.is_not_found() => debug!(entry = %entry, "Map entry already gone"),
            Err(e) => {
                warn!(entry = %entry, error = %e, "Failed to delete map entry");
                report.failed.push(format!("map_entry/{}", entry));
            }
        }
    }

    if !report.map_entries.is_empty() {
        wait_for_entries_gone(ctx, &report.map_entries).await;
    }

    let poller = Poller::new(&ctx.config.timing.certificate_delete, ctx.sleeper);
    for certificate in &plan.certificates {
        let deleted = poller
            .retry(certificate, || ctx.certificates.delete_certificate(certificate))
            .await;
        match deleted {
            Ok(()) => {
                info!(certificate = %certificate, "Deleted certificate");
                counter!("rotator_certificates_deleted_total").increment(1);
                report.certificates.push(certificate.clone());
            }
            Err(e) if e.is_not_found() => debug!(certificate = %certificate, "Certificate already gone"),
            Err(e) => {
                warn!(certificate = %certificate, error = %e, "Failed to delete certificate");
                report.failed.push(format!("certificate/{}", certificate));
            }
        }
    }

    for name in &plan.authorizations {
        let authorization = match ctx.certificates.get_authorization(name).await {
            Ok(authorization) => authorization,
            Err(e) if e.is_not_found() => {
                debug!(authorization = %name, "Authorization already gone");
                continue;
            }
            Err(e) => {
                warn!(authorization = %name, error = %e, "Failed to read authorization, leaving it");
                report.failed.push(format!("authorization/{}", name));
                continue;
            }
        };

        if let Some(record) = remove_validation_record(ctx, &authorization).await {
            report.records.push(record);
        }

        match ctx.certificates.delete_authorization(name).await {
            Ok(()) => {
                info!(authorization = %name, "Deleted DNS authorization");
                counter!("rotator_authorizations_deleted_total").increment(1);
                report.authorizations.push(name.clone());
            }
            Err(e) => {
                warn!(authorization = %name, error = %e, "Failed to delete DNS authorization");
                report.failed.push(format!("authorization/{}", name));
            }
        }

        ctx.sleeper.sleep(ctx.config.timing.dns_rate_limit).await;
    }

    info!(
        map_entries = report.map_entries.len(),
        certificates = report.certificates.len(),
        authorizations = report.authorizations.len(),
        records = report.records.len(),
        failed = report.failed.len(),
        "Teardown finished"
    );
    report
}

/// Poll the map entry listing until none of `deleted` shows up any more. Giving up only
/// costs certificate delete retries, so a timeout is logged and teardown continues.
async fn wait_for_entries_gone(ctx: &RotationContext<'_>, deleted: &[String]) {
    let map = ctx.config.certificate_map.as_str();
    let outcome = Poller::new(&ctx.config.timing.map_entry_settle, ctx.sleeper)
        .until_ready("map entry deletion", || async {
            let listed = ctx.certificates.list_map_entries(map).await?;
            let lingering = deleted.iter().filter(|entry| listed.contains(entry)).count();
            debug!(lingering, "Waiting for deleted map entries to disappear");
            Ok::<_, RotatorError>((lingering == 0).then_some(()))
        })
        .await;

    match outcome {
        Ok(PollOutcome::Ready(())) => debug!("Deleted map entries settled"),
        Ok(PollOutcome::TimedOut { attempts }) => {
            warn!(attempts, "Deleted map entries still listed, continuing")
        }
        Err(e) => warn!(error = %e, "Failed to list map entries while settling, continuing"),
    }
}

/// Delete the authorization's validation record from its zone. Returns the record name
/// when it was deleted.
async fn remove_validation_record(
    ctx: &RotationContext<'_>,
    authorization: &DnsAuthorization,
) -> Option<String> {
    let name = authorization.name.as_str();
    let Some(record) = authorization.record.as_ref() else {
        debug!(authorization = %name, "Authorization has no validation record");
        return None;
    };

    let domain = match Domain::parse(&authorization.domain) {
        Ok(domain) => domain,
        Err(e) => {
            warn!(authorization = %name, domain = %authorization.domain, error = %e, "Unusable authorization domain");
            return None;
        }
    };

    let record_name = record.fqdn();
    let deleted: Result<()> = async {
        let zone_id = ctx.zones.zone_for(ctx.dns, &domain).await?;
        let record_id = ctx.dns.find_record_id(&zone_id, record_name).await?;
        ctx.dns.delete_record(&zone_id, &record_id).await
    }
    .await;

    match deleted {
        Ok(()) => {
            info!(record = %record_name, "Deleted validation record");
            counter!("rotator_dns_records_deleted_total").increment(1);
            Some(record_name.to_string())
        }
        Err(e) => {
            warn!(record = %record_name, error = %e, "Failed to delete validation record");
            None
        }
    }
}
