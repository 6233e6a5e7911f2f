//! Runtime layer for deploy-backend.
//!
//! This crate covers the compute half of the backend:
//! - [`Runtime`]: One implementation per language toolchain
//! - [`RuntimeRegistry`]: Tag-based runtime resolution, the build pipeline
//!   and the worker lifecycle
//! - [`Worker`] and [`LogStream`]: Running functions and their output
//! - [`NodeRuntime`]: Node.js functions bundled with esbuild
//!
//! # Build and run
//!
//! ```text
//!  FunctionSpec + Project + Links
//!            │  RuntimeRegistry::build
//!            ▼
//!  <working dir>/artifacts/<function id>   (wiped, then rebuilt)
//!            │  RuntimeRegistry::run
//!            ▼
//!  Box<dyn Worker> ── logs() ──▶ LogStream
//!            └────── stop()
//! ```

pub mod build;
pub mod lifecycle;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod worker;

#[cfg(test)]
pub(crate) mod fake;

pub use node::NodeRuntime;
pub use registry::RuntimeRegistry;
pub use runtime::{BuildInput, BuildOutput, FunctionSpec, Links, Project, RunInput, Runtime};
pub use worker::{LogStream, ProcessWorker, Worker};
