//! Configuration structures for deploy-backend.
//!
//! This module defines configuration options for various components:
//! - [`BackendConfig`]: Top-level configuration containing all settings
//! - [`ProviderConfig`]: Cloudflare REST client settings
//! - [`StateConfig`]: Remote state bucket settings
//! - [`BuildConfig`]: Build pipeline settings
//! - [`NodeConfig`]: Node.js runtime toolchain settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variables consulted by the credential resolver.
pub mod env {
    /// Scoped API token.
    pub const API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
    /// Global API key (used together with [`EMAIL`]).
    pub const API_KEY: &str = "CLOUDFLARE_API_KEY";
    /// Account email (used together with [`API_KEY`]).
    pub const EMAIL: &str = "CLOUDFLARE_EMAIL";
    /// Explicit account override. Also exported for downstream steps.
    pub const DEFAULT_ACCOUNT_ID: &str = "CLOUDFLARE_DEFAULT_ACCOUNT_ID";
}

/// Top-level backend configuration.
///
/// It can be loaded from files (TOML, JSON) or environment variables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Cloudflare REST client configuration.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Remote state bucket configuration.
    #[serde(default)]
    pub state: StateConfig,

    /// Build pipeline configuration.
    #[serde(default)]
    pub build: BuildConfig,

    /// Node.js runtime configuration.
    #[serde(default)]
    pub node: NodeConfig,
}

/// Cloudflare REST client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Base URL of the Cloudflare v4 API.
    ///
    /// Overridable so the client can be pointed at a test double.
    #[serde(default = "defaults::api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::api_base_url(),
            request_timeout_secs: defaults::request_timeout_secs(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Get the request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Remote state bucket configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    /// Well-known name of the bucket holding state and passphrases.
    ///
    /// At most one bucket with this name exists per account.
    #[serde(default = "defaults::bucket")]
    pub bucket: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            bucket: defaults::bucket(),
        }
    }
}

/// Build pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Directory under the project working dir that holds build outputs.
    #[serde(default = "defaults::artifacts_dir")]
    pub artifacts_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: defaults::artifacts_dir(),
        }
    }
}

/// Node.js runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Bundler executable (esbuild CLI compatible).
    #[serde(default = "defaults::bundler")]
    pub bundler: String,

    /// Node.js executable used to run workers.
    #[serde(default = "defaults::node")]
    pub node: String,

    /// Extra arguments appended to every bundler invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bundler: defaults::bundler(),
            node: defaults::node(),
            extra_args: Vec::new(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn api_base_url() -> String {
        "https://api.cloudflare.com/client/v4".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn connect_timeout_secs() -> u64 {
        10
    }

    pub fn bucket() -> String {
        "deploy-backend-state".to_string()
    }

    pub fn artifacts_dir() -> String {
        "artifacts".to_string()
    }

    pub fn bundler() -> String {
        "esbuild".to_string()
    }

    pub fn node() -> String {
        "node".to_string()
    }
}
