//! # certmap-rotator
//!
//! Rotates Google-managed TLS certificates served through a Certificate Manager
//! certificate map, with domain ownership proven by DNS authorizations whose validation
//! records live in Cloudflare.
//!
//! ## Architecture
//!
//! ```text
//! CLI / HTTP trigger → Rotator (state machine) → CertificateManager ─→ Certificate Manager API
//!                                  ↓             → DnsProvider ───────→ Cloudflare API
//!                             RotationConfig     → Sleeper
//! ```
//!
//! A rotation provisions one DNS authorization per domain, one managed certificate per
//! batch of domains, waits until every new certificate is active, repoints the map
//! entries at the new certificates and finally deletes the previous generation, sparing
//! anything listed in the retained sets. Every step lists before it creates, so a run
//! that halts or fails part-way is resumed by running again.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use certmap_rotator::{config::Settings, Rotator};
//! use certmap_rotator::memory::{InMemoryCertificateManager, InMemoryDnsProvider};
//! use std::sync::Arc;
//!
//! # async fn run() -> certmap_rotator::Result<()> {
//! let settings = Settings::load(None)?;
//! let rotator = Rotator::new(
//!     settings.rotation_config()?,
//!     Arc::new(InMemoryCertificateManager::new()),
//!     Arc::new(InMemoryDnsProvider::new()),
//! );
//! let outcome = rotator.rotate().await;
//! println!("{}", outcome.message);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod observability;
pub mod rotation;
pub mod server;

// Re-export commonly used types and traits
pub use config::{RotationConfig, Settings};
pub use errors::{Result, RotatorError};
pub use rotation::{RotationOutcome, Rotator};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
