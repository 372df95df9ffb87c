//! Read-only rehearsal of a rotation.

use super::teardown::{plan_teardown, TeardownPlan};
use super::RotationContext;
use crate::errors::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::instrument;

/// What a rotation would create, repoint and delete given the current remote state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationPlan {
    pub authorizations_to_create: Vec<String>,
    pub certificates_to_create: Vec<String>,
    pub map_entries_to_create: Vec<String>,
    pub map_entries_to_update: Vec<String>,
    /// Computed against the current listing, so it still includes resources that the
    /// new generation will replace only after cutover
    pub teardown: TeardownPlan,
}

/// List remote state and compare it with the configured generation. Issues no mutation.
#[instrument(skip(ctx))]
pub async fn build_plan(ctx: &RotationContext<'_>) -> Result<RotationPlan> {
    let config = ctx.config;
    let authorizations: HashSet<String> =
        ctx.certificates.list_authorizations().await?.into_iter().collect();
    let certificates: HashSet<String> =
        ctx.certificates.list_certificates().await?.into_iter().collect();
    let map_entries: HashSet<String> =
        ctx.certificates.list_map_entries(&config.certificate_map).await?.into_iter().collect();

    let (map_entries_to_update, map_entries_to_create): (Vec<String>, Vec<String>) =
        config.plan.map_entry_names().into_iter().partition(|name| map_entries.contains(name));

    Ok(RotationPlan {
        authorizations_to_create: config
            .plan
            .authorization_names()
            .into_iter()
            .filter(|name| !authorizations.contains(name))
            .collect(),
        certificates_to_create: config
            .plan
            .certificate_names()
            .into_iter()
            .filter(|name| !certificates.contains(name))
            .collect(),
        map_entries_to_create,
        map_entries_to_update,
        teardown: plan_teardown(ctx).await?,
    })
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, names: &[String]) -> fmt::Result {
    if names.is_empty() {
        return writeln!(f, "{}: none", title);
    }
    writeln!(f, "{}:", title)?;
    for name in names {
        writeln!(f, "  - {}", name)?;
    }
    Ok(())
}

impl fmt::Display for RotationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Authorizations to create", &self.authorizations_to_create)?;
        write_section(f, "Certificates to create", &self.certificates_to_create)?;
        write_section(f, "Map entries to create", &self.map_entries_to_create)?;
        write_section(f, "Map entries to repoint", &self.map_entries_to_update)?;
        write_section(f, "Map entries to delete", &self.teardown.map_entries)?;
        write_section(f, "Certificates to delete", &self.teardown.certificates)?;
        write_section(f, "Authorizations to delete", &self.teardown.authorizations)
    }
}
