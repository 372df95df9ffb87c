//! Pointing the certificate map at the new certificates.

use super::RotationContext;
use crate::errors::Result;
use metrics::counter;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// What [`cut_over`] did, by map entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutoverReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub failed: Vec<String>,
}

impl CutoverReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Bind every new domain's map entry to its batch certificate.
///
/// Missing entries are created; existing ones have their certificate list replaced with
/// exactly the new certificate. A failure on one entry does not stop the others.
#[instrument(skip(ctx), fields(map = %ctx.config.certificate_map))]
pub async fn cut_over(ctx: &RotationContext<'_>) -> Result<CutoverReport> {
    let map = ctx.config.certificate_map.as_str();
    let existing: HashSet<String> = ctx.certificates.list_map_entries(map).await?.into_iter().collect();
    let mut report = CutoverReport::default();

    for batch in ctx.config.plan.batches() {
        let certificate = batch.certificate_name.as_str();
        for (domain, entry) in batch.entries() {
            if existing.contains(entry) {
                match ctx.certificates.update_map_entry_certificate(map, entry, certificate).await {
                    Ok(()) => {
                        info!(entry = %entry, certificate = %certificate, "Repointed map entry");
                        counter!("rotator_map_entries_updated_total").increment(1);
                        report.updated.push(entry.to_string());
                    }
                    Err(e) => {
                        warn!(entry = %entry, error = %e, "Failed to repoint map entry");
                        report.failed.push(entry.to_string());
                    }
                }
            } else {
                match ctx.certificates.create_map_entry(map, entry, domain.as_str(), certificate).await {
                    Ok(()) => {
                        info!(entry = %entry, hostname = %domain, certificate = %certificate, "Created map entry");
                        counter!("rotator_map_entries_created_total").increment(1);
                        report.created.push(entry.to_string());
                    }
                    Err(e) => {
                        warn!(entry = %entry, error = %e, "Failed to create map entry");
                        report.failed.push(entry.to_string());
                    }
                }
            }
        }
    }

    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        failed = report.failed.len(),
        "Cutover finished"
    );
    Ok(report)
}
