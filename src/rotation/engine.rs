//! The rotation state machine.

use super::authorizations::ensure_authorizations;
use super::certificates::ensure_certificates;
use super::cutover::cut_over;
use super::plan::{build_plan, RotationPlan};
use super::readiness::all_new_certificates_active;
use super::teardown::{plan_teardown, tear_down};
use super::wait::{Sleeper, TokioSleeper};
use super::RotationContext;
use crate::clients::{CertificateManager, DnsProvider};
use crate::config::RotationConfig;
use crate::errors::Result;
use crate::observability::record_outcome;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Instrument};

/// Where a rotation run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationState {
    ProvisioningAuth,
    ProvisioningCerts,
    AwaitingReady,
    Cutover,
    Teardown,
    /// Stopped before anything was deleted; created resources stay for the next run
    Halt { reason: String },
    Done { summary: String },
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProvisioningAuth => "provisioning_auth",
            Self::ProvisioningCerts => "provisioning_certs",
            Self::AwaitingReady => "awaiting_ready",
            Self::Cutover => "cutover",
            Self::Teardown => "teardown",
            Self::Halt { .. } => "halt",
            Self::Done { .. } => "done",
        })
    }
}

/// Result of one invocation, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationOutcome {
    /// True once the map points at the new certificates and teardown ran
    pub rotated: bool,
    pub message: String,
    /// The run stopped on a configuration or listing error
    #[serde(skip)]
    pub aborted: bool,
}

impl RotationOutcome {
    pub fn rotated(message: impl Into<String>) -> Self {
        Self { rotated: true, message: message.into(), aborted: false }
    }

    pub fn halted(message: impl Into<String>) -> Self {
        Self { rotated: false, message: message.into(), aborted: false }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self { rotated: false, message: message.into(), aborted: true }
    }

    fn label(&self) -> &'static str {
        match (self.rotated, self.aborted) {
            (true, _) => "rotated",
            (false, true) => "aborted",
            (false, false) => "halted",
        }
    }
}

/// Drives rotations against a certificate manager and a DNS provider.
pub struct Rotator {
    config: RotationConfig,
    certificates: Arc<dyn CertificateManager>,
    dns: Arc<dyn DnsProvider>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotator")
            .field("certificate_map", &self.config.certificate_map)
            .field("batches", &self.config.plan.len())
            .finish()
    }
}

impl Rotator {
    pub fn new(
        config: RotationConfig,
        certificates: Arc<dyn CertificateManager>,
        dns: Arc<dyn DnsProvider>,
    ) -> Self {
        Self { config, certificates, dns, sleeper: Arc::new(TokioSleeper) }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    fn context(&self) -> RotationContext<'_> {
        RotationContext::new(
            &self.config,
            self.certificates.as_ref(),
            self.dns.as_ref(),
            self.sleeper.as_ref(),
        )
    }

    /// Run one rotation. Never fails: errors become an aborted outcome with a message.
    pub async fn rotate(&self) -> RotationOutcome {
        let span = crate::rotation_span!("rotate", certificate_map = %self.config.certificate_map);
        let started = Instant::now();

        let outcome = async {
            match self.try_rotate().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Rotation aborted");
                    RotationOutcome::aborted(format!("rotation aborted: {}", e))
                }
            }
        }
        .instrument(span)
        .await;

        record_outcome(outcome.label(), started.elapsed());
        outcome
    }

    /// Run one rotation, returning listing failures as errors.
    pub async fn try_rotate(&self) -> Result<RotationOutcome> {
        let ctx = self.context();
        let mut state = RotationState::ProvisioningAuth;

        loop {
            info!(state = %state, "Rotation state");
            state = match state {
                RotationState::ProvisioningAuth => {
                    ensure_authorizations(&ctx).await?;
                    RotationState::ProvisioningCerts
                }
                RotationState::ProvisioningCerts => {
                    ensure_certificates(&ctx).await?;
                    RotationState::AwaitingReady
                }
                RotationState::AwaitingReady => {
                    let names = self.config.plan.certificate_names();
                    if all_new_certificates_active(ctx.certificates, &names).await? {
                        RotationState::Cutover
                    } else {
                        RotationState::Halt {
                            reason: "new certificates are not active yet".to_string(),
                        }
                    }
                }
                RotationState::Cutover => {
                    let report = cut_over(&ctx).await?;
                    if report.is_complete() {
                        RotationState::Teardown
                    } else {
                        RotationState::Halt {
                            reason: format!(
                                "cutover incomplete, {} map entries failed: {}",
                                report.failed.len(),
                                report.failed.join(", ")
                            ),
                        }
                    }
                }
                RotationState::Teardown => {
                    let plan = plan_teardown(&ctx).await?;
                    let report = tear_down(&ctx, &plan).await;
                    let mut summary = format!(
                        "rotated to {}; deleted {} map entries, {} certificates, {} authorizations",
                        self.config.plan.certificate_names().join(", "),
                        report.map_entries.len(),
                        report.certificates.len(),
                        report.authorizations.len()
                    );
                    if !report.failed.is_empty() {
                        summary.push_str(&format!("; left behind: {}", report.failed.join(", ")));
                    }
                    RotationState::Done { summary }
                }
                RotationState::Halt { reason } => {
                    info!(reason = %reason, "Rotation halted");
                    return Ok(RotationOutcome::halted(reason));
                }
                RotationState::Done { summary } => {
                    info!(summary = %summary, "Rotation complete");
                    return Ok(RotationOutcome::rotated(summary));
                }
            };
        }
    }

    /// Describe what a rotation would do right now, without changing anything.
    pub async fn plan(&self) -> Result<RotationPlan> {
        let span = crate::rotation_span!("plan", certificate_map = %self.config.certificate_map);
        build_plan(&self.context()).instrument(span).await
    }
}
