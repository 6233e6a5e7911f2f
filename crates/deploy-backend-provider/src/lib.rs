//! Cloudflare provider for deploy-backend.
//!
//! This crate covers the state half of the backend:
//! - [`CloudflareProvider`]: Credential resolution and account selection
//! - [`CloudflareClient`]: Authenticated REST client implementing [`CloudApi`]
//! - [`CloudflareHome`]: Bucket bootstrap and key-addressed blob storage
//! - [`BlobKey`]: `(kind, app, stage)` object addressing
//!
//! # Flow
//!
//! ```text
//! ProviderOptions + ProviderEnv
//!            │  CloudflareProvider::init
//!            ▼
//!   CloudflareProvider { api, account_id }
//!            │  CloudflareHome::new + bootstrap
//!            ▼
//!   CloudflareHome ── put / get / remove ──▶ <bucket>/<kind>/<app>/<stage>
//! ```

pub mod api;
pub mod client;
pub mod credentials;
pub mod home;
pub mod key;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{Account, Bucket, CloudApi};
pub use client::CloudflareClient;
pub use credentials::{CloudflareProvider, Credentials, ProviderEnv};
pub use home::CloudflareHome;
pub use key::{BlobKey, BlobKind};
