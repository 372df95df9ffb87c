//! # Error Handling
//!
//! Error types shared by the clients, the rotation engine and the CLI.

pub mod types;

pub use types::{Result, RotatorError};
