//! Configuration file structures for deploy-backend.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ProviderOptions`]: Credentials supplied through the `[provider]` section
//!
//! Files are loaded through the `config` crate so that
//! `DEPLOY_BACKEND__*` environment variables can override any file value
//! (e.g. `DEPLOY_BACKEND__BACKEND__STATE__BUCKET=my-state`).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BackendConfig;
use crate::error::ConfigFileError;

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "DEPLOY_BACKEND";

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [backend.provider]
/// request_timeout_secs = 30
///
/// [backend.state]
/// bucket = "deploy-backend-state"
///
/// [backend.node]
/// bundler = "esbuild"
///
/// [provider]
/// api_token = "..."
/// account_id = "..."
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Backend configuration (client, state bucket, build, runtimes).
    #[serde(default)]
    pub backend: BackendConfig,

    /// Provider credentials. Values here take precedence over the
    /// `CLOUDFLARE_*` environment variables.
    #[serde(default)]
    pub provider: ProviderOptions,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }

    /// Load configuration from an optional file, layered with
    /// `DEPLOY_BACKEND__*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or any layer fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        Self::load_with_env(path, None)
    }

    /// Same as [`ConfigFile::load`], reading overrides from `env` instead of
    /// the process environment when provided.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or any layer fails to parse.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigFileError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigFileError::Io {
                    path: path.display().to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env.map(|vars| vars.into_iter().collect()));

        let loaded: Self = builder
            .add_source(environment)
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigFileError::Parse {
                message: e.to_string(),
            })?;

        debug!(
            path = ?path,
            bucket = %loaded.backend.state.bucket,
            "Configuration loaded"
        );
        Ok(loaded)
    }
}

/// Credentials and account selection supplied by the user.
///
/// Every field is optional; unset fields fall back to the matching
/// `CLOUDFLARE_*` environment variable.
///
/// The camelCase spellings are accepted too. The layered loader lowercases
/// keys, so each alias also has an all-lowercase form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderOptions {
    /// Scoped API token.
    #[serde(default, alias = "apiToken", alias = "apitoken")]
    pub api_token: Option<String>,

    /// Global API key (requires `email`).
    #[serde(default, alias = "apiKey", alias = "apikey")]
    pub api_key: Option<String>,

    /// Account email (requires `api_key`).
    #[serde(default)]
    pub email: Option<String>,

    /// Explicit account to operate on.
    #[serde(default, alias = "accountId", alias = "accountid")]
    pub account_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.backend.state.bucket, "deploy-backend-state");
        assert_eq!(config.provider, ProviderOptions::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [backend.provider]
            api_base_url = "http://127.0.0.1:9999"
            request_timeout_secs = 5

            [backend.state]
            bucket = "team-state"

            [backend.build]
            artifacts_dir = "out"

            [backend.node]
            bundler = "/usr/local/bin/esbuild"
            extra_args = ["--minify"]

            [provider]
            api_key = "key"
            email = "ops@example.com"
            account_id = "acct-9"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.backend.provider.api_base_url, "http://127.0.0.1:9999");
        assert_eq!(config.backend.provider.request_timeout_secs, 5);
        // Defaults applied
        assert_eq!(config.backend.provider.connect_timeout_secs, 10);
        assert_eq!(config.backend.state.bucket, "team-state");
        assert_eq!(config.backend.build.artifacts_dir, "out");
        assert_eq!(config.backend.node.bundler, "/usr/local/bin/esbuild");
        assert_eq!(config.backend.node.extra_args, vec!["--minify"]);
        assert_eq!(config.provider.api_key.as_deref(), Some("key"));
        assert_eq!(config.provider.email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.provider.account_id.as_deref(), Some("acct-9"));
        assert!(config.provider.api_token.is_none());
    }

    const CAMEL_CASE_PROVIDER: &str = r#"
        [provider]
        apiToken = "token"
        apiKey = "key"
        accountId = "acct-1"
    "#;

    #[test]
    fn test_camel_case_provider_aliases() {
        let config = ConfigFile::from_toml(CAMEL_CASE_PROVIDER).unwrap();

        assert_eq!(config.provider.api_token.as_deref(), Some("token"));
        assert_eq!(config.provider.api_key.as_deref(), Some("key"));
        assert_eq!(config.provider.account_id.as_deref(), Some("acct-1"));
    }

    #[test]
    fn test_load_keeps_camel_case_provider_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.toml");
        std::fs::write(&path, CAMEL_CASE_PROVIDER).unwrap();

        let config = ConfigFile::load_with_env(Some(&path), Some(HashMap::new())).unwrap();

        assert_eq!(config.provider.api_token.as_deref(), Some("token"));
        assert_eq!(config.provider.api_key.as_deref(), Some("key"));
        assert_eq!(config.provider.account_id.as_deref(), Some("acct-1"));
    }

    #[test]
    fn test_load_env_overrides_provider_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.toml");
        std::fs::write(&path, CAMEL_CASE_PROVIDER).unwrap();

        let env = HashMap::from([(
            "DEPLOY_BACKEND__PROVIDER__ACCOUNT_ID".to_string(),
            "acct-env".to_string(),
        )]);

        let config = ConfigFile::load_with_env(Some(&path), Some(env)).unwrap();

        assert_eq!(config.provider.account_id.as_deref(), Some("acct-env"));
        assert_eq!(config.provider.api_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let result = ConfigFile::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }

    #[test]
    fn test_load_layers_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.toml");
        std::fs::write(
            &path,
            r#"
                [backend.state]
                bucket = "from-file"

                [backend.build]
                artifacts_dir = "out"
            "#,
        )
        .unwrap();

        let env = HashMap::from([(
            "DEPLOY_BACKEND__BACKEND__STATE__BUCKET".to_string(),
            "from-env".to_string(),
        )]);

        let config = ConfigFile::load_with_env(Some(&path), Some(env)).unwrap();

        assert_eq!(config.backend.state.bucket, "from-env");
        assert_eq!(config.backend.build.artifacts_dir, "out");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = ConfigFile::load_with_env(None, Some(HashMap::new())).unwrap();

        assert_eq!(config.backend.state.bucket, "deploy-backend-state");
        assert!(config.provider.api_token.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigFile::load_with_env(
            Some(Path::new("/definitely/not/here.toml")),
            Some(HashMap::new()),
        );
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}
