//! Certificate Manager resources as seen by the rotation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS record a DNS authorization asks to be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Record type, `CNAME` for Certificate Manager
    pub record_type: String,
    /// Fully-qualified record name, as returned by the service (usually dot-terminated)
    pub name: String,
    /// Record content
    pub value: String,
}

impl ValidationRecord {
    /// Record name without the trailing root dot, the form DNS provider APIs expect
    pub fn fqdn(&self) -> &str {
        self.name.strip_suffix('.').unwrap_or(&self.name)
    }
}

/// A DNS authorization resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAuthorization {
    /// Short resource id (the domain's slug)
    pub name: String,
    /// Domain the authorization proves control of
    pub domain: String,
    /// Populated by the service some time after creation
    pub record: Option<ValidationRecord>,
}

/// Provisioning state of a managed certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateState {
    Provisioning,
    Active,
    Failed,
    #[serde(other)]
    Unspecified,
}

impl CertificateState {
    /// Parse the wire representation; anything unrecognized is `Unspecified`.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "PROVISIONING" => Self::Provisioning,
            "ACTIVE" => Self::Active,
            "FAILED" => Self::Failed,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Active => "ACTIVE",
            Self::Failed => "FAILED",
            Self::Unspecified => "STATE_UNSPECIFIED",
        }
    }

    /// Only an active certificate can serve traffic
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for CertificateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds full resource names for one project and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    project_id: String,
    location: String,
}

impl ResourcePaths {
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), location: location.into() }
    }

    /// `projects/{project}/locations/{location}`
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }

    pub fn authorization(&self, name: &str) -> String {
        format!("{}/dnsAuthorizations/{}", self.parent(), name)
    }

    pub fn certificate(&self, name: &str) -> String {
        format!("{}/certificates/{}", self.parent(), name)
    }

    pub fn certificate_map(&self, map: &str) -> String {
        format!("{}/certificateMaps/{}", self.parent(), map)
    }

    pub fn map_entry(&self, map: &str, entry: &str) -> String {
        format!("{}/certificateMapEntries/{}", self.certificate_map(map), entry)
    }
}

/// Last path segment of a full resource name.
pub fn short_name(full_name: &str) -> &str {
    full_name.rsplit('/').next().unwrap_or(full_name)
}
