//! Common test utilities for all integration tests.
//!
//! Builds rotators over the in-memory services with a shared journal and a recording
//! sleeper, so scenarios can seed remote state, run, and inspect what happened.

#![allow(dead_code)]

use certmap_rotator::config::{RetainedSets, RotationConfig, TimingConfig};
use certmap_rotator::memory::{
    Call, InMemoryCertificateManager, InMemoryDnsProvider, Journal, RecordingSleeper,
};
use certmap_rotator::Rotator;
use std::sync::Arc;

pub const MAP: &str = "edge-map";
pub const ZONE_ID: &str = "zone-example";

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn rotation_config(
    domains: &[&str],
    certificates: &[&str],
    chunk_size: usize,
    retained: RetainedSets,
) -> RotationConfig {
    RotationConfig::new(
        "acme-prod",
        "global",
        MAP,
        &strings(domains),
        &strings(certificates),
        chunk_size,
        retained,
        TimingConfig::default(),
    )
    .expect("valid rotation config")
}

/// In-memory services sharing one journal, with `example.com` hosted at the DNS provider.
pub struct Fixture {
    pub journal: Journal,
    pub manager: Arc<InMemoryCertificateManager>,
    pub dns: Arc<InMemoryDnsProvider>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Fixture {
    pub fn new() -> Self {
        let journal = Journal::new();
        let manager = Arc::new(InMemoryCertificateManager::with_journal(journal.clone()));
        let dns = Arc::new(InMemoryDnsProvider::with_journal(journal.clone()));
        dns.add_zone("example.com", ZONE_ID);
        Self { journal, manager, dns, sleeper: Arc::new(RecordingSleeper::default()) }
    }

    pub fn rotator(&self, config: RotationConfig) -> Rotator {
        Rotator::new(config, self.manager.clone(), self.dns.clone())
            .with_sleeper(self.sleeper.clone())
    }

    /// Journal entries that delete something
    pub fn deletions(&self) -> Vec<Call> {
        self.journal
            .calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    Call::DeleteMapEntry(_)
                        | Call::DeleteCertificate(_)
                        | Call::DeleteAuthorization(_)
                        | Call::DeleteRecord(_)
                )
            })
            .collect()
    }
}
