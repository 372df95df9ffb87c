//! # Rotation Metrics
//!
//! Counter names recorded by the rotation steps, plus the per-run outcome.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Duration;

/// Register descriptions for every metric the rotator records.
pub fn describe_metrics() {
    describe_counter!("rotator_runs_total", "Rotation runs by outcome (rotated, halted, aborted)");
    describe_histogram!("rotator_run_duration_seconds", Unit::Seconds, "Wall time of a rotation run");
    describe_counter!("rotator_authorizations_created_total", "DNS authorizations created");
    describe_counter!("rotator_authorizations_deleted_total", "DNS authorizations deleted");
    describe_counter!("rotator_dns_records_created_total", "Validation records published");
    describe_counter!("rotator_dns_records_deleted_total", "Validation records removed");
    describe_counter!("rotator_certificates_created_total", "Managed certificates created");
    describe_counter!("rotator_certificates_deleted_total", "Managed certificates deleted");
    describe_counter!("rotator_map_entries_created_total", "Certificate map entries created");
    describe_counter!("rotator_map_entries_updated_total", "Certificate map entries repointed");
    describe_counter!("rotator_map_entries_deleted_total", "Certificate map entries deleted");
}

/// Record how a run ended and how long it took.
pub fn record_outcome(outcome: &'static str, elapsed: Duration) {
    counter!("rotator_runs_total", "outcome" => outcome).increment(1);
    histogram!("rotator_run_duration_seconds", "outcome" => outcome).record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_outcome("rotated", Duration::from_millis(1500));
    }
}
