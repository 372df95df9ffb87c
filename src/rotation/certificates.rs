//! One managed certificate per batch.

use super::RotationContext;
use crate::errors::Result;
use metrics::counter;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// What [`ensure_certificates`] did, by certificate name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    pub skipped: Vec<String>,
}

/// Create the certificate of every batch that does not have one yet.
///
/// Existing certificates are left untouched; there is no update path. A batch whose
/// certificate cannot be created is skipped and the readiness gate will hold the
/// rotation back.
#[instrument(skip(ctx), fields(batches = ctx.config.plan.len()))]
pub async fn ensure_certificates(ctx: &RotationContext<'_>) -> Result<CertificateReport> {
    let existing: HashSet<String> = ctx.certificates.list_certificates().await?.into_iter().collect();
    let mut report = CertificateReport::default();

    for batch in ctx.config.plan.batches() {
        let name = &batch.certificate_name;
        if existing.contains(name) {
            debug!(certificate = %name, "Certificate already exists");
            report.existing.push(name.clone());
            continue;
        }

        let domains: Vec<String> = batch.domains.iter().map(|d| d.to_string()).collect();
        match ctx
            .certificates
            .create_certificate(name, &domains, &batch.authorization_self_links)
            .await
        {
            Ok(()) => {
                info!(certificate = %name, domains = ?domains, "Created managed certificate");
                counter!("rotator_certificates_created_total").increment(1);
                report.created.push(name.clone());
            }
            Err(e) if e.is_conflict() => {
                debug!(certificate = %name, "Certificate appeared concurrently");
                report.existing.push(name.clone());
            }
            Err(e) => {
                warn!(certificate = %name, error = %e, "Failed to create certificate, skipping batch");
                report.skipped.push(name.clone());
            }
        }
    }

    info!(
        created = report.created.len(),
        existing = report.existing.len(),
        skipped = report.skipped.len(),
        "Certificates ensured"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetainedSets, RotationConfig, TimingConfig};
    use crate::domain::CertificateState;
    use crate::memory::{InMemoryCertificateManager, InMemoryDnsProvider, RecordingSleeper};

    fn config() -> RotationConfig {
        RotationConfig::new(
            "acme-prod",
            "global",
            "edge-map",
            &["a.example.com".to_string(), "b.example.com".to_string(), "c.example.com".to_string()],
            &["cert-0".to_string(), "cert-1".to_string()],
            2,
            RetainedSets::default(),
            TimingConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_certificate_per_batch() {
        let config = config();
        let manager = InMemoryCertificateManager::new();
        let dns = InMemoryDnsProvider::new();
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let report = ensure_certificates(&ctx).await.unwrap();
        assert_eq!(report.created, vec!["cert-0", "cert-1"]);

        let first = manager.certificate("cert-0").unwrap();
        assert_eq!(first.domains, vec!["a.example.com", "b.example.com"]);
        assert_eq!(
            first.authorization_self_links,
            vec![
                "projects/acme-prod/locations/global/dnsAuthorizations/a-example-com",
                "projects/acme-prod/locations/global/dnsAuthorizations/b-example-com"
            ]
        );
        assert_eq!(manager.certificate("cert-1").unwrap().domains, vec!["c.example.com"]);
    }

    #[tokio::test]
    async fn test_existing_certificate_is_untouched() {
        let config = config();
        let manager = InMemoryCertificateManager::new();
        manager.insert_certificate("cert-0", &["old.example.com"], CertificateState::Provisioning);
        let dns = InMemoryDnsProvider::new();
        let sleeper = RecordingSleeper::default();
        let ctx = RotationContext::new(&config, &manager, &dns, &sleeper);

        let report = ensure_certificates(&ctx).await.unwrap();
        assert_eq!(report.existing, vec!["cert-0"]);
        assert_eq!(report.created, vec!["cert-1"]);
        assert_eq!(manager.certificate("cert-0").unwrap().domains, vec!["old.example.com"]);
    }
}
