//! # Rotation
//!
//! The rotation state machine and the provisioning steps it drives:
//!
//! ```text
//! ProvisioningAuth → ProvisioningCerts → AwaitingReady → Cutover → Teardown → Done
//!                                              ↓              ↓
//!                                            Halt           Halt
//! ```
//!
//! Every step is idempotent: it lists remote state first and only creates what is
//! missing, so an interrupted or halted run is resumed by simply running again.

pub mod authorizations;
pub mod certificates;
pub mod cutover;
pub mod engine;
pub mod plan;
pub mod readiness;
pub mod teardown;
pub mod wait;
pub mod zones;

pub use authorizations::{ensure_authorizations, AuthorizationReport};
pub use certificates::{ensure_certificates, CertificateReport};
pub use cutover::{cut_over, CutoverReport};
pub use engine::{RotationOutcome, RotationState, Rotator};
pub use plan::{build_plan, RotationPlan};
pub use readiness::all_new_certificates_active;
pub use teardown::{plan_teardown, superseded, tear_down, TeardownPlan, TeardownReport};
pub use wait::{PollOutcome, Poller, RetryConfig, Sleeper, TokioSleeper};
pub use zones::ZoneCache;

use crate::clients::{CertificateManager, DnsProvider};
use crate::config::RotationConfig;

/// Collaborators and per-run state shared by every rotation step.
pub struct RotationContext<'a> {
    pub config: &'a RotationConfig,
    pub certificates: &'a dyn CertificateManager,
    pub dns: &'a dyn DnsProvider,
    pub sleeper: &'a dyn Sleeper,
    /// Zone ids resolved so far in this run
    pub zones: ZoneCache,
}

impl<'a> RotationContext<'a> {
    pub fn new(
        config: &'a RotationConfig,
        certificates: &'a dyn CertificateManager,
        dns: &'a dyn DnsProvider,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self { config, certificates, dns, sleeper, zones: ZoneCache::default() }
    }
}
