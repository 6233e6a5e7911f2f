//! Error types for deploy-backend.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`ProviderError`]: Credential resolution and state backend errors
//! - [`RuntimeError`]: Runtime registry, build, and worker errors
//!
//! Both enums separate configuration errors (never retried, carry a
//! remediation message) from remote or I/O failures (message preserved
//! verbatim for diagnosis).

use std::io;

use thiserror::Error;

/// Cloudflare error code reported when an object key does not exist.
pub const CLOUDFLARE_NO_SUCH_KEY: u32 = 10007;

/// Errors from the cloud provider half: credentials, bucket bootstrap and
/// blob storage.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Neither an API token nor an API key + email pair was supplied.
    #[error(
        "Cloudflare API not initialized. Please provide CLOUDFLARE_API_TOKEN or \
         CLOUDFLARE_API_KEY and CLOUDFLARE_EMAIL environment variables, or set \
         `api_token` or `api_key` and `email` in the [provider] section of the \
         configuration file."
    )]
    MissingCredentials,

    /// No account ID is configured and the credentials can see no accounts.
    #[error(
        "missing account: the credentials have access to no Cloudflare accounts; \
         set CLOUDFLARE_DEFAULT_ACCOUNT_ID or `account_id` in the [provider] section"
    )]
    MissingAccount,

    /// The remote API answered with a failure.
    #[error("{message} (status: {status}{})", code_suffix(.code))]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider-specific error code, if the response carried one.
        code: Option<u32>,
        /// Remote error message, preserved as sent.
        message: String,
    },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The requested object does not exist in the bucket.
    #[error("Object not found: {key}")]
    ObjectNotFound {
        /// The object key that was requested.
        key: String,
    },

    /// A blob operation was attempted before `bootstrap`.
    #[error("State bucket has not been bootstrapped")]
    NotBootstrapped,

    /// A blob key segment was rejected.
    #[error("Invalid blob key: {reason}")]
    InvalidKey {
        /// Description of why the key was rejected.
        reason: String,
    },

    /// The caller's context was cancelled before the call completed.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors from the runtime half: registry lookup, builds and workers.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No registered runtime claims the requested tag.
    #[error("Runtime not found: {runtime}")]
    RuntimeNotFound {
        /// The runtime tag that was requested.
        runtime: String,
    },

    /// The build toolchain could not be invoked.
    #[error("Build failed: {reason}")]
    BuildFailed {
        /// Description of the build failure.
        reason: String,
    },

    /// The worker process could not be started.
    #[error("Failed to start worker: {reason}")]
    SpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },

    /// A build or run request was malformed.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the problem.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The caller's context was cancelled before the call completed.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

fn code_suffix(code: &Option<u32>) -> String {
    code.map(|c| format!(", code: {c}")).unwrap_or_default()
}

impl ProviderError {
    /// Create a new `Api` error.
    pub fn api(status: u16, code: Option<u32>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code,
            message: message.into(),
        }
    }

    /// Create a new `Transport` error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new `ObjectNotFound` error.
    pub fn object_not_found(key: impl Into<String>) -> Self {
        Self::ObjectNotFound { key: key.into() }
    }

    /// Create a new `InvalidKey` error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }

    /// Returns `true` if this error needs a configuration change rather than
    /// a retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials | Self::MissingAccount | Self::InvalidKey { .. }
        )
    }

    /// Returns `true` if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl RuntimeError {
    /// Create a new `RuntimeNotFound` error.
    pub fn runtime_not_found(runtime: impl Into<String>) -> Self {
        Self::RuntimeNotFound {
            runtime: runtime.into(),
        }
    }

    /// Create a new `BuildFailed` error.
    pub fn build_failed(reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `SpawnFailed` error.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidInput` error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Returns `true` if no runtime matched the requested tag.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RuntimeNotFound { .. })
    }

    /// Returns `true` if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
