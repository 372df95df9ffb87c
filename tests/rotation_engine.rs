//! End-to-end rotation scenarios against the in-memory services.

mod common;

use certmap_rotator::clients::DnsRecord;
use certmap_rotator::config::RetainedSets;
use certmap_rotator::domain::CertificateState;
use certmap_rotator::memory::{validation_record_for, Call, Fault, Operation};
use common::{rotation_config, strings, Fixture, MAP, ZONE_ID};
use std::time::Duration;

fn seed_record(fixture: &Fixture, authorization: &str, domain: &str) {
    let record = validation_record_for(authorization, domain);
    fixture.dns.insert_record(
        ZONE_ID,
        DnsRecord {
            record_type: record.record_type.clone(),
            name: record.fqdn().to_string(),
            content: record.value.clone(),
            ttl: 1,
        },
    );
}

/// Previous generation: `cert-old` serving `a` and `legacy`, plus a pinned certificate.
fn seed_previous_generation(fixture: &Fixture) {
    let manager = &fixture.manager;
    manager.insert_authorization("a-example-com", "a.example.com");
    manager.insert_authorization("legacy-example-com", "legacy.example.com");
    manager.insert_authorization("pinned-example-com", "pinned.example.com");
    manager.insert_certificate("cert-old", &["a.example.com", "legacy.example.com"], CertificateState::Active);
    manager.insert_certificate("cert-pinned", &["pinned.example.com"], CertificateState::Active);
    manager.insert_map_entry(MAP, "a-example-com", "a.example.com", "cert-old");
    manager.insert_map_entry(MAP, "legacy-example-com", "legacy.example.com", "cert-old");
    manager.insert_map_entry(MAP, "pinned-example-com", "pinned.example.com", "cert-pinned");
    seed_record(fixture, "a-example-com", "a.example.com");
    seed_record(fixture, "legacy-example-com", "legacy.example.com");
}

fn pinned() -> RetainedSets {
    RetainedSets::from_lists(
        &strings(&["cert-pinned"]),
        &strings(&["pinned-example-com"]),
        &strings(&["pinned-example-com"]),
    )
}

#[tokio::test]
async fn test_full_rotation_replaces_previous_generation() {
    let fixture = Fixture::new();
    seed_previous_generation(&fixture);
    let config = rotation_config(
        &["a.example.com", "b.example.com", "c.example.com"],
        &["cert-0", "cert-1"],
        2,
        pinned(),
    );

    let outcome = fixture.rotator(config).rotate().await;
    assert!(outcome.rotated, "{}", outcome.message);
    assert_eq!(
        outcome.message,
        "rotated to cert-0, cert-1; deleted 1 map entries, 1 certificates, 1 authorizations"
    );

    assert_eq!(
        fixture.journal.calls(),
        vec![
            Call::CreateAuthorization("b-example-com".to_string()),
            Call::CreateAuthorization("c-example-com".to_string()),
            Call::CreateRecord("_acme-challenge.b.example.com".to_string()),
            Call::CreateRecord("_acme-challenge.c.example.com".to_string()),
            Call::CreateCertificate("cert-0".to_string()),
            Call::CreateCertificate("cert-1".to_string()),
            Call::UpdateMapEntry("a-example-com".to_string()),
            Call::CreateMapEntry("b-example-com".to_string()),
            Call::CreateMapEntry("c-example-com".to_string()),
            Call::DeleteMapEntry("legacy-example-com".to_string()),
            Call::DeleteCertificate("cert-old".to_string()),
            Call::DeleteRecord("_acme-challenge.legacy.example.com".to_string()),
            Call::DeleteAuthorization("legacy-example-com".to_string()),
        ]
    );

    let manager = &fixture.manager;
    assert_eq!(manager.map_entry(MAP, "a-example-com").unwrap().certificates, vec!["cert-0"]);
    assert_eq!(manager.map_entry(MAP, "b-example-com").unwrap().certificates, vec!["cert-0"]);
    assert_eq!(manager.map_entry(MAP, "c-example-com").unwrap().certificates, vec!["cert-1"]);
    assert_eq!(manager.map_entry(MAP, "pinned-example-com").unwrap().certificates, vec!["cert-pinned"]);
    assert_eq!(manager.certificate_names(), vec!["cert-0", "cert-1", "cert-pinned"]);
    assert_eq!(
        manager.authorization_names(),
        vec!["a-example-com", "b-example-com", "c-example-com", "pinned-example-com"]
    );

    // one rate-limit pause per deleted authorization
    assert_eq!(fixture.sleeper.recorded(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_second_rotation_is_a_no_op() {
    let fixture = Fixture::new();
    seed_previous_generation(&fixture);
    let config = rotation_config(&["a.example.com"], &["cert-0"], 1, pinned());
    let rotator = fixture.rotator(config);

    assert!(rotator.rotate().await.rotated);
    fixture.journal.clear();

    let outcome = rotator.rotate().await;
    assert!(outcome.rotated);
    assert_eq!(fixture.journal.calls(), vec![Call::UpdateMapEntry("a-example-com".to_string())]);
}

#[tokio::test]
async fn test_halt_leaves_everything_in_place_and_resumes() {
    let fixture = Fixture::new();
    seed_previous_generation(&fixture);
    fixture.manager.set_new_certificate_state(CertificateState::Provisioning);
    let rotator = fixture.rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, pinned()));

    let outcome = rotator.rotate().await;
    assert!(!outcome.rotated);
    assert!(!outcome.aborted);
    assert!(outcome.message.contains("not active"));
    assert!(fixture.deletions().is_empty());
    assert_eq!(fixture.manager.map_entry(MAP, "a-example-com").unwrap().certificates, vec!["cert-old"]);
    assert!(fixture.manager.certificate("cert-0").is_some());

    fixture.manager.set_certificate_state("cert-0", CertificateState::Active);
    fixture.journal.clear();

    let outcome = rotator.rotate().await;
    assert!(outcome.rotated, "{}", outcome.message);
    let calls = fixture.journal.calls();
    assert!(!calls.iter().any(|call| matches!(call, Call::CreateAuthorization(_) | Call::CreateCertificate(_))));
    assert!(calls.contains(&Call::DeleteCertificate("cert-old".to_string())));
}

#[tokio::test]
async fn test_failed_certificate_halts() {
    let fixture = Fixture::new();
    fixture.manager.set_new_certificate_state(CertificateState::Failed);
    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, RetainedSets::default()))
        .rotate()
        .await;

    assert!(!outcome.rotated);
    assert!(fixture.manager.map_entry_names(MAP).is_empty());
}

#[tokio::test]
async fn test_incomplete_cutover_skips_teardown() {
    let fixture = Fixture::new();
    seed_previous_generation(&fixture);
    fixture.manager.fail(Operation::UpdateMapEntry, "a-example-com", Fault::Http);
    let config = rotation_config(&["a.example.com", "b.example.com"], &["cert-0"], 2, pinned());

    let outcome = fixture.rotator(config).rotate().await;
    assert!(!outcome.rotated);
    assert!(outcome.message.contains("cutover incomplete"), "{}", outcome.message);
    assert!(outcome.message.contains("a-example-com"));
    assert!(fixture.deletions().is_empty());
    assert_eq!(fixture.manager.map_entry(MAP, "b-example-com").unwrap().certificates, vec!["cert-0"]);
}

#[tokio::test]
async fn test_listing_failure_aborts_without_mutation() {
    let fixture = Fixture::new();
    fixture.manager.fail(Operation::ListAuthorizations, "", Fault::Transient);

    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, RetainedSets::default()))
        .rotate()
        .await;

    assert!(outcome.aborted);
    assert!(!outcome.rotated);
    assert!(fixture.journal.calls().is_empty());
}

#[tokio::test]
async fn test_waits_for_deleted_entries_before_deleting_certificates() {
    let fixture = Fixture::new();
    fixture.manager.linger_deleted_entries(2);
    fixture.manager.insert_certificate("cert-old", &["legacy.example.com"], CertificateState::Active);
    fixture.manager.insert_map_entry(MAP, "legacy-example-com", "legacy.example.com", "cert-old");

    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, RetainedSets::default()))
        .rotate()
        .await;

    assert!(outcome.rotated, "{}", outcome.message);
    assert_eq!(
        fixture.sleeper.recorded(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
    assert_eq!(
        fixture.deletions(),
        vec![
            Call::DeleteMapEntry("legacy-example-com".to_string()),
            Call::DeleteCertificate("cert-old".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_certificate_delete_retries_while_in_use() {
    let fixture = Fixture::new();
    fixture.manager.insert_certificate("cert-old", &["legacy.example.com"], CertificateState::Active);
    fixture.manager.fail_times(Operation::DeleteCertificate, "cert-old", Fault::Precondition, 2);

    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, RetainedSets::default()))
        .rotate()
        .await;

    assert!(outcome.rotated);
    assert_eq!(
        fixture.sleeper.recorded(),
        vec![Duration::from_secs(10), Duration::from_secs(20)]
    );
    assert!(fixture.manager.certificate("cert-old").is_none());
}

#[tokio::test]
async fn test_certificate_still_in_use_is_left_behind() {
    let fixture = Fixture::new();
    fixture.manager.insert_certificate("cert-old", &["legacy.example.com"], CertificateState::Active);
    fixture.manager.fail(Operation::DeleteCertificate, "cert-old", Fault::Precondition);

    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, RetainedSets::default()))
        .rotate()
        .await;

    assert!(outcome.rotated);
    assert!(outcome.message.contains("left behind: certificate/cert-old"), "{}", outcome.message);
    assert_eq!(fixture.sleeper.recorded().len(), 5);
}

#[tokio::test]
async fn test_dns_failure_does_not_block_authorization_delete() {
    let fixture = Fixture::new();
    fixture.manager.insert_authorization("legacy-example-com", "legacy.example.com");
    seed_record(&fixture, "legacy-example-com", "legacy.example.com");
    fixture.dns.fail(Operation::FindRecord, "_acme-challenge.legacy.example.com", Fault::Transient);

    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, RetainedSets::default()))
        .rotate()
        .await;

    assert!(outcome.rotated);
    assert_eq!(fixture.deletions(), vec![Call::DeleteAuthorization("legacy-example-com".to_string())]);
    assert!(fixture.dns.record_named("_acme-challenge.legacy.example.com").is_some());
}

#[tokio::test]
async fn test_retained_resources_are_never_deleted() {
    let fixture = Fixture::new();
    fixture.manager.insert_authorization("keep-example-com", "keep.example.com");
    fixture.manager.insert_certificate("cert-keep", &["keep.example.com"], CertificateState::Active);
    fixture.manager.insert_map_entry(MAP, "keep-example-com", "keep.example.com", "cert-keep");
    let retained = RetainedSets::from_lists(
        &strings(&["cert-keep", ""]),
        &strings(&["keep-example-com"]),
        &strings(&["keep-example-com"]),
    );

    let outcome = fixture
        .rotator(rotation_config(&["a.example.com"], &["cert-0"], 1, retained))
        .rotate()
        .await;

    assert!(outcome.rotated);
    assert!(fixture.deletions().is_empty());
}
