//! Domain types: hostnames, derived resource names, batches and resource views.

pub mod batch;
pub mod names;
pub mod resources;

pub use batch::{Batch, BatchPlan};
pub use names::{slug, Domain};
pub use resources::{
    short_name, CertificateState, DnsAuthorization, ResourcePaths, ValidationRecord,
};
