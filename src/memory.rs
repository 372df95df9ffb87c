//! In-memory collaborators for exercising the rotation engine without remote services.
//!
//! [`InMemoryCertificateManager`] and [`InMemoryDnsProvider`] keep their state in
//! process, behave like the real services on the edges the engine cares about (conflicts
//! on re-creation, certificates that cannot be deleted while referenced, map entries that
//! stay listed for a while after deletion) and append every successful mutation to a
//! shared [`Journal`] so tests can assert ordering across both services.

use crate::clients::{CertificateManager, DnsProvider, DnsRecord};
use crate::domain::{CertificateState, DnsAuthorization, ValidationRecord};
use crate::errors::{Result, RotatorError};
use crate::rotation::wait::Sleeper;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const AUTHORIZATION: &str = "dns_authorization";
const CERTIFICATE: &str = "certificate";
const MAP_ENTRY: &str = "certificate_map_entry";
const ZONE: &str = "dns_zone";
const RECORD: &str = "dns_record";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A successful mutation against one of the in-memory services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateAuthorization(String),
    DeleteAuthorization(String),
    CreateCertificate(String),
    DeleteCertificate(String),
    CreateMapEntry(String),
    UpdateMapEntry(String),
    DeleteMapEntry(String),
    /// Record name
    CreateRecord(String),
    /// Record name
    DeleteRecord(String),
}

/// Ordered log of mutations, shareable between fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: Call) {
        lock(&self.0).push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.0).clone()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

/// Operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListAuthorizations,
    CreateAuthorization,
    GetAuthorization,
    DeleteAuthorization,
    ListCertificates,
    CreateCertificate,
    GetCertificate,
    DeleteCertificate,
    ListMapEntries,
    CreateMapEntry,
    UpdateMapEntry,
    DeleteMapEntry,
    ResolveZone,
    CreateRecord,
    FindRecord,
    DeleteRecord,
}

/// Kind of injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    NotFound,
    Conflict,
    Precondition,
    Http,
}

impl Fault {
    fn to_error(self, resource_type: &str, name: &str) -> RotatorError {
        match self {
            Fault::Transient => RotatorError::transient(format!("{} '{}' unavailable", resource_type, name)),
            Fault::NotFound => RotatorError::not_found(resource_type, name),
            Fault::Conflict => RotatorError::conflict(resource_type, name),
            Fault::Precondition => RotatorError::precondition(resource_type, name, "injected"),
            Fault::Http => RotatorError::http(format!("{} '{}' rejected", resource_type, name), 400),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// `None` fails forever, `Some(n)` fails the next `n` calls
    armed: HashMap<(Operation, String), (Fault, Option<u32>)>,
}

impl Faults {
    fn arm(&mut self, operation: Operation, name: &str, fault: Fault, times: Option<u32>) {
        self.armed.insert((operation, name.to_string()), (fault, times));
    }

    fn check(&mut self, operation: Operation, name: &str, resource_type: &str) -> Result<()> {
        let key = (operation, name.to_string());
        let Some(&(fault, remaining)) = self.armed.get(&key) else {
            return Ok(());
        };
        match remaining {
            Some(0) => {
                self.armed.remove(&key);
                Ok(())
            }
            Some(n) => {
                self.armed.insert(key, (fault, Some(n - 1)));
                Err(fault.to_error(resource_type, name))
            }
            None => Err(fault.to_error(resource_type, name)),
        }
    }
}

/// A certificate held by [`InMemoryCertificateManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCertificate {
    pub domains: Vec<String>,
    pub authorization_self_links: Vec<String>,
    pub state: CertificateState,
}

/// A map entry held by [`InMemoryCertificateManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMapEntry {
    pub hostname: String,
    /// Short certificate names
    pub certificates: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredAuthorization {
    domain: String,
    /// `get_authorization` calls left before the validation record shows up
    reads_until_record: u32,
}

#[derive(Debug, Clone)]
struct LingeringEntry {
    map: String,
    entry: String,
    listings_left: u32,
    value: StoredMapEntry,
}

#[derive(Debug, Default)]
struct ManagerState {
    authorizations: BTreeMap<String, StoredAuthorization>,
    certificates: BTreeMap<String, StoredCertificate>,
    map_entries: BTreeMap<String, BTreeMap<String, StoredMapEntry>>,
    lingering: Vec<LingeringEntry>,
    faults: Faults,
    new_certificate_state: Option<CertificateState>,
    record_delay_reads: u32,
    entry_linger_listings: u32,
    get_certificate_calls: u32,
    list_calls: u32,
}

/// The validation record the in-memory service hands out for a domain.
pub fn validation_record_for(authorization: &str, domain: &str) -> ValidationRecord {
    ValidationRecord {
        record_type: "CNAME".to_string(),
        name: format!("_acme-challenge.{}.", domain),
        value: format!("{}.authorize.certificatemanager.goog.", authorization),
    }
}

/// In-memory certificate management service.
#[derive(Debug, Default)]
pub struct InMemoryCertificateManager {
    state: Mutex<ManagerState>,
    journal: Journal,
}

impl InMemoryCertificateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self { state: Mutex::default(), journal }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// State given to certificates created from now on (default `ACTIVE`)
    pub fn set_new_certificate_state(&self, state: CertificateState) {
        lock(&self.state).new_certificate_state = Some(state);
    }

    /// Hold back validation records of new authorizations for `reads` lookups
    pub fn delay_validation_records(&self, reads: u32) {
        lock(&self.state).record_delay_reads = reads;
    }

    /// Keep deleted map entries listed (and referencing their certificates) for `listings`
    /// list calls
    pub fn linger_deleted_entries(&self, listings: u32) {
        lock(&self.state).entry_linger_listings = listings;
    }

    pub fn fail(&self, operation: Operation, name: &str, fault: Fault) {
        lock(&self.state).faults.arm(operation, name, fault, None);
    }

    pub fn fail_times(&self, operation: Operation, name: &str, fault: Fault, times: u32) {
        lock(&self.state).faults.arm(operation, name, fault, Some(times));
    }

    pub fn insert_authorization(&self, name: &str, domain: &str) {
        lock(&self.state).authorizations.insert(
            name.to_string(),
            StoredAuthorization { domain: domain.to_string(), reads_until_record: 0 },
        );
    }

    pub fn insert_certificate(&self, name: &str, domains: &[&str], state: CertificateState) {
        lock(&self.state).certificates.insert(
            name.to_string(),
            StoredCertificate {
                domains: domains.iter().map(|d| d.to_string()).collect(),
                authorization_self_links: Vec::new(),
                state,
            },
        );
    }

    pub fn insert_map_entry(&self, map: &str, entry: &str, hostname: &str, certificate: &str) {
        lock(&self.state).map_entries.entry(map.to_string()).or_default().insert(
            entry.to_string(),
            StoredMapEntry {
                hostname: hostname.to_string(),
                certificates: vec![certificate.to_string()],
            },
        );
    }

    pub fn set_certificate_state(&self, name: &str, state: CertificateState) {
        if let Some(certificate) = lock(&self.state).certificates.get_mut(name) {
            certificate.state = state;
        }
    }

    pub fn authorization_names(&self) -> Vec<String> {
        lock(&self.state).authorizations.keys().cloned().collect()
    }

    pub fn certificate_names(&self) -> Vec<String> {
        lock(&self.state).certificates.keys().cloned().collect()
    }

    pub fn certificate(&self, name: &str) -> Option<StoredCertificate> {
        lock(&self.state).certificates.get(name).cloned()
    }

    pub fn map_entry_names(&self, map: &str) -> Vec<String> {
        lock(&self.state)
            .map_entries
            .get(map)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn map_entry(&self, map: &str, entry: &str) -> Option<StoredMapEntry> {
        lock(&self.state).map_entries.get(map).and_then(|entries| entries.get(entry)).cloned()
    }

    /// Number of certificate state lookups so far
    pub fn certificate_state_reads(&self) -> u32 {
        lock(&self.state).get_certificate_calls
    }

    /// Number of list calls of any kind so far
    pub fn list_calls(&self) -> u32 {
        lock(&self.state).list_calls
    }
}

#[async_trait]
impl CertificateManager for InMemoryCertificateManager {
    async fn list_authorizations(&self) -> Result<Vec<String>> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        state.faults.check(Operation::ListAuthorizations, "", AUTHORIZATION)?;
        Ok(state.authorizations.keys().cloned().collect())
    }

    async fn create_authorization(&self, name: &str, domain: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::CreateAuthorization, name, AUTHORIZATION)?;
        if state.authorizations.contains_key(name) {
            return Err(RotatorError::conflict(AUTHORIZATION, name));
        }
        let reads_until_record = state.record_delay_reads;
        state.authorizations.insert(
            name.to_string(),
            StoredAuthorization { domain: domain.to_string(), reads_until_record },
        );
        self.journal.push(Call::CreateAuthorization(name.to_string()));
        Ok(())
    }

    async fn get_authorization(&self, name: &str) -> Result<DnsAuthorization> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::GetAuthorization, name, AUTHORIZATION)?;
        let stored = state
            .authorizations
            .get_mut(name)
            .ok_or_else(|| RotatorError::not_found(AUTHORIZATION, name))?;

        let record = if stored.reads_until_record == 0 {
            Some(validation_record_for(name, &stored.domain))
        } else {
            stored.reads_until_record -= 1;
            None
        };

        Ok(DnsAuthorization { name: name.to_string(), domain: stored.domain.clone(), record })
    }

    async fn delete_authorization(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::DeleteAuthorization, name, AUTHORIZATION)?;
        if !state.authorizations.contains_key(name) {
            return Err(RotatorError::not_found(AUTHORIZATION, name));
        }
        let suffix = format!("/dnsAuthorizations/{}", name);
        if let Some((certificate, _)) = state
            .certificates
            .iter()
            .find(|(_, c)| c.authorization_self_links.iter().any(|link| link.ends_with(&suffix)))
        {
            return Err(RotatorError::precondition(
                AUTHORIZATION,
                name,
                format!("still used by certificate {}", certificate),
            ));
        }
        state.authorizations.remove(name);
        self.journal.push(Call::DeleteAuthorization(name.to_string()));
        Ok(())
    }

    async fn list_certificates(&self) -> Result<Vec<String>> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        state.faults.check(Operation::ListCertificates, "", CERTIFICATE)?;
        Ok(state.certificates.keys().cloned().collect())
    }

    async fn create_certificate(
        &self,
        name: &str,
        domains: &[String],
        authorization_self_links: &[String],
    ) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::CreateCertificate, name, CERTIFICATE)?;
        if state.certificates.contains_key(name) {
            return Err(RotatorError::conflict(CERTIFICATE, name));
        }
        let initial = state.new_certificate_state.unwrap_or(CertificateState::Active);
        state.certificates.insert(
            name.to_string(),
            StoredCertificate {
                domains: domains.to_vec(),
                authorization_self_links: authorization_self_links.to_vec(),
                state: initial,
            },
        );
        self.journal.push(Call::CreateCertificate(name.to_string()));
        Ok(())
    }

    async fn get_certificate_state(&self, name: &str) -> Result<CertificateState> {
        let mut state = lock(&self.state);
        state.get_certificate_calls += 1;
        state.faults.check(Operation::GetCertificate, name, CERTIFICATE)?;
        state
            .certificates
            .get(name)
            .map(|certificate| certificate.state)
            .ok_or_else(|| RotatorError::not_found(CERTIFICATE, name))
    }

    async fn delete_certificate(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::DeleteCertificate, name, CERTIFICATE)?;
        if !state.certificates.contains_key(name) {
            return Err(RotatorError::not_found(CERTIFICATE, name));
        }
        let live = state.map_entries.values().flat_map(|entries| entries.values());
        let lingering = state.lingering.iter().map(|l| &l.value);
        if live.chain(lingering).any(|entry| entry.certificates.iter().any(|c| c == name)) {
            return Err(RotatorError::precondition(
                CERTIFICATE,
                name,
                "certificate is referenced by a certificate map entry",
            ));
        }
        state.certificates.remove(name);
        self.journal.push(Call::DeleteCertificate(name.to_string()));
        Ok(())
    }

    async fn list_map_entries(&self, map: &str) -> Result<Vec<String>> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        state.faults.check(Operation::ListMapEntries, map, MAP_ENTRY)?;

        let mut names: Vec<String> =
            state.map_entries.get(map).map(|e| e.keys().cloned().collect()).unwrap_or_default();
        for lingering in state.lingering.iter_mut().filter(|l| l.map == map) {
            names.push(lingering.entry.clone());
            lingering.listings_left = lingering.listings_left.saturating_sub(1);
        }
        state.lingering.retain(|l| l.listings_left > 0);

        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn create_map_entry(
        &self,
        map: &str,
        entry: &str,
        hostname: &str,
        certificate: &str,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::CreateMapEntry, entry, MAP_ENTRY)?;
        let entries = state.map_entries.entry(map.to_string()).or_default();
        if entries.contains_key(entry) {
            return Err(RotatorError::conflict(MAP_ENTRY, entry));
        }
        entries.insert(
            entry.to_string(),
            StoredMapEntry {
                hostname: hostname.to_string(),
                certificates: vec![certificate.to_string()],
            },
        );
        self.journal.push(Call::CreateMapEntry(entry.to_string()));
        Ok(())
    }

    async fn update_map_entry_certificate(
        &self,
        map: &str,
        entry: &str,
        certificate: &str,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::UpdateMapEntry, entry, MAP_ENTRY)?;
        let stored = state
            .map_entries
            .get_mut(map)
            .and_then(|entries| entries.get_mut(entry))
            .ok_or_else(|| RotatorError::not_found(MAP_ENTRY, entry))?;
        stored.certificates = vec![certificate.to_string()];
        self.journal.push(Call::UpdateMapEntry(entry.to_string()));
        Ok(())
    }

    async fn delete_map_entry(&self, map: &str, entry: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::DeleteMapEntry, entry, MAP_ENTRY)?;
        let removed = state
            .map_entries
            .get_mut(map)
            .and_then(|entries| entries.remove(entry))
            .ok_or_else(|| RotatorError::not_found(MAP_ENTRY, entry))?;

        if state.entry_linger_listings > 0 {
            let listings_left = state.entry_linger_listings;
            state.lingering.push(LingeringEntry {
                map: map.to_string(),
                entry: entry.to_string(),
                listings_left,
                value: removed,
            });
        }
        self.journal.push(Call::DeleteMapEntry(entry.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DnsState {
    zones: BTreeMap<String, String>,
    records: BTreeMap<String, (String, DnsRecord)>,
    next_id: u64,
    zone_lookups: u32,
    faults: Faults,
}

/// In-memory DNS provider.
#[derive(Debug, Default)]
pub struct InMemoryDnsProvider {
    state: Mutex<DnsState>,
    journal: Journal,
}

impl InMemoryDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self { state: Mutex::default(), journal }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn add_zone(&self, zone_name: &str, zone_id: &str) {
        lock(&self.state).zones.insert(zone_name.to_string(), zone_id.to_string());
    }

    /// Seed a record directly, bypassing the journal
    pub fn insert_record(&self, zone_id: &str, record: DnsRecord) {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = format!("rec-{}", state.next_id);
        state.records.insert(id, (zone_id.to_string(), record));
    }

    pub fn fail(&self, operation: Operation, name: &str, fault: Fault) {
        lock(&self.state).faults.arm(operation, name, fault, None);
    }

    pub fn fail_times(&self, operation: Operation, name: &str, fault: Fault, times: u32) {
        lock(&self.state).faults.arm(operation, name, fault, Some(times));
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        lock(&self.state).records.values().map(|(_, record)| record.clone()).collect()
    }

    pub fn record_named(&self, name: &str) -> Option<DnsRecord> {
        lock(&self.state)
            .records
            .values()
            .find(|(_, record)| record.name == name)
            .map(|(_, record)| record.clone())
    }

    /// Number of zone lookups so far
    pub fn zone_lookups(&self) -> u32 {
        lock(&self.state).zone_lookups
    }
}

#[async_trait]
impl DnsProvider for InMemoryDnsProvider {
    async fn resolve_zone_id(&self, zone_name: &str) -> Result<String> {
        let mut state = lock(&self.state);
        state.zone_lookups += 1;
        state.faults.check(Operation::ResolveZone, zone_name, ZONE)?;
        state.zones.get(zone_name).cloned().ok_or_else(|| RotatorError::not_found(ZONE, zone_name))
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::CreateRecord, &record.name, RECORD)?;
        if !state.zones.values().any(|id| id == zone_id) {
            return Err(RotatorError::not_found(ZONE, zone_id));
        }
        if state
            .records
            .values()
            .any(|(zone, r)| zone == zone_id && r.name == record.name && r.content == record.content)
        {
            return Err(RotatorError::conflict(RECORD, &record.name));
        }
        state.next_id += 1;
        let id = format!("rec-{}", state.next_id);
        state.records.insert(id, (zone_id.to_string(), record.clone()));
        self.journal.push(Call::CreateRecord(record.name.clone()));
        Ok(())
    }

    async fn find_record_id(&self, zone_id: &str, name: &str) -> Result<String> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::FindRecord, name, RECORD)?;
        state
            .records
            .iter()
            .find(|(_, (zone, record))| zone == zone_id && record.name == name)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| RotatorError::not_found(RECORD, name))
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.faults.check(Operation::DeleteRecord, record_id, RECORD)?;
        match state.records.get(record_id) {
            Some((zone, _)) if zone == zone_id => {}
            _ => return Err(RotatorError::not_found(RECORD, record_id)),
        }
        if let Some((_, record)) = state.records.remove(record_id) {
            self.journal.push(Call::DeleteRecord(record.name));
        }
        Ok(())
    }
}

/// Sleeper that returns immediately and remembers what it was asked to wait.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    recorded: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.recorded).clone()
    }

    pub fn total(&self) -> Duration {
        lock(&self.recorded).iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.recorded).push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_certificate_in_use_cannot_be_deleted() {
        let manager = InMemoryCertificateManager::new();
        manager.insert_certificate("cert-old", &["a.example.com"], CertificateState::Active);
        manager.insert_map_entry("edge-map", "a-example-com", "a.example.com", "cert-old");

        let err = manager.delete_certificate("cert-old").await.unwrap_err();
        assert!(matches!(err, RotatorError::Precondition { .. }));

        manager.delete_map_entry("edge-map", "a-example-com").await.unwrap();
        manager.delete_certificate("cert-old").await.unwrap();
        assert_eq!(
            manager.journal().calls(),
            vec![
                Call::DeleteMapEntry("a-example-com".to_string()),
                Call::DeleteCertificate("cert-old".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_deleted_entries_linger_in_listings() {
        let manager = InMemoryCertificateManager::new();
        manager.linger_deleted_entries(2);
        manager.insert_map_entry("edge-map", "old-example-com", "old.example.com", "cert-old");
        manager.delete_map_entry("edge-map", "old-example-com").await.unwrap();

        assert_eq!(manager.list_map_entries("edge-map").await.unwrap(), vec!["old-example-com"]);
        assert_eq!(manager.list_map_entries("edge-map").await.unwrap(), vec!["old-example-com"]);
        assert!(manager.list_map_entries("edge-map").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_record_delay() {
        let manager = InMemoryCertificateManager::new();
        manager.delay_validation_records(1);
        manager.create_authorization("a-example-com", "a.example.com").await.unwrap();

        assert!(manager.get_authorization("a-example-com").await.unwrap().record.is_none());
        let record = manager.get_authorization("a-example-com").await.unwrap().record.unwrap();
        assert_eq!(record.fqdn(), "_acme-challenge.a.example.com");
    }

    #[tokio::test]
    async fn test_fault_with_count_recovers() {
        let manager = InMemoryCertificateManager::new();
        manager.fail_times(Operation::CreateCertificate, "cert-0", Fault::Transient, 1);

        assert!(manager.create_certificate("cert-0", &[], &[]).await.unwrap_err().is_retryable());
        manager.create_certificate("cert-0", &[], &[]).await.unwrap();
        assert!(manager.create_certificate("cert-0", &[], &[]).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_dns_duplicate_record_conflicts() {
        let dns = InMemoryDnsProvider::new();
        dns.add_zone("example.com", "zone-1");
        let record = DnsRecord {
            record_type: "CNAME".to_string(),
            name: "_acme-challenge.a.example.com".to_string(),
            content: "target".to_string(),
            ttl: 1,
        };

        dns.create_record("zone-1", &record).await.unwrap();
        assert!(dns.create_record("zone-1", &record).await.unwrap_err().is_conflict());

        let id = dns.find_record_id("zone-1", &record.name).await.unwrap();
        dns.delete_record("zone-1", &id).await.unwrap();
        assert!(dns.records().is_empty());
    }
}
