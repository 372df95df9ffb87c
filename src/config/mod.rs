//! # Configuration Management
//!
//! [`Settings`] is what operators write (file and environment); [`RotationConfig`] is
//! the validated, immutable view passed by reference into every rotation component.

pub mod rotation;
pub mod secret;
pub mod settings;

pub use rotation::{RetainedSets, RotationConfig, TimingConfig};
pub use secret::SecretString;
pub use settings::{
    BackoffSettings, CloudflareSettings, GcpSettings, ObservabilitySettings, RotationSettings,
    SchedulerSettings, ServerSettings, Settings, TimingSettings,
};
