//! # External Service Clients
//!
//! Traits for the remote systems the rotation engine drives, plus their REST
//! implementations. The engine only ever sees the traits.

pub mod certificate_manager;
pub mod cloudflare;
pub mod dns;
pub mod gcp;
pub mod http;
pub mod scheduler;
pub mod token;

pub use certificate_manager::CertificateManager;
pub use cloudflare::CloudflareDnsProvider;
pub use dns::{DnsProvider, DnsRecord};
pub use gcp::GcpCertificateManager;
pub use http::build_http_client;
pub use scheduler::{CloudSchedulerClient, SchedulerControl};
pub use token::{AccessTokenProvider, MetadataServerToken, StaticToken};
