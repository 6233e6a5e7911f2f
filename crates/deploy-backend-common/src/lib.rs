//! Common types, errors, and configuration for deploy-backend.
//!
//! This crate provides shared functionality used across the deploy-backend workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures and TOML config file loading
//! - The cancellation-carrying [`Context`] passed to every remote call

pub mod config;
pub mod config_file;
pub mod context;
pub mod error;

pub use config::{BackendConfig, BuildConfig, NodeConfig, ProviderConfig, StateConfig};
pub use config_file::{ConfigFile, ProviderOptions};
pub use context::Context;
pub use error::{ConfigFileError, ProviderError, RuntimeError};
