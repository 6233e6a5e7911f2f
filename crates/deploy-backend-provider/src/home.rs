//! Remote state storage on top of R2.
//!
//! [`CloudflareHome`] owns the well-known state bucket and stores opaque
//! blobs in it under `<kind>/<app>/<stage>`:
//!
//! - [`CloudflareHome::bootstrap`] adopts the bucket if it exists, creating
//!   it otherwise. Concurrent bootstraps from separate processes may still
//!   race between list and create; the remote store rejects the duplicate
//!   create and the caller can retry.
//! - `put` overwrites (last write wins), `get` reports a missing object as
//!   `None`, `remove` of a missing object succeeds.

use bytes::Bytes;
use tracing::{debug, info};

use deploy_backend_common::{Context, ProviderError, StateConfig};

use crate::credentials::CloudflareProvider;
use crate::key::BlobKey;

/// State backend bound to one account and one well-known bucket.
#[derive(Debug, Clone)]
pub struct CloudflareHome {
    provider: CloudflareProvider,

    /// Well-known bucket name to adopt or create.
    bucket_name: String,

    /// Set once `bootstrap` has succeeded.
    bucket: Option<String>,
}

impl CloudflareHome {
    /// Create a state backend. Call [`CloudflareHome::bootstrap`] before any
    /// blob operation.
    pub fn new(provider: CloudflareProvider, config: &StateConfig) -> Self {
        Self {
            provider,
            bucket_name: config.bucket.clone(),
            bucket: None,
        }
    }

    /// Get the provider this backend uses.
    pub fn provider(&self) -> &CloudflareProvider {
        &self.provider
    }

    /// Get the bootstrapped bucket name, if bootstrap has run.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Adopt the well-known bucket, creating it only if no bucket with that
    /// exact name exists. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if listing or creating the bucket fails,
    /// or [`ProviderError::Cancelled`].
    pub async fn bootstrap(&mut self, ctx: &Context) -> Result<(), ProviderError> {
        let api = self.provider.api();
        let account_id = self.provider.account_id();
        let name = self.bucket_name.as_str();

        let buckets = ctx
            .run(ProviderError::Cancelled, api.list_buckets(account_id, name))
            .await?;

        if buckets.iter().any(|bucket| bucket.name == name) {
            info!(bucket = name, "found existing bucket");
        } else {
            info!(bucket = name, "creating new bucket");
            ctx.run(ProviderError::Cancelled, api.create_bucket(account_id, name))
                .await?;
        }

        self.bucket = Some(name.to_string());
        Ok(())
    }

    fn require_bucket(&self) -> Result<&str, ProviderError> {
        self.bucket.as_deref().ok_or(ProviderError::NotBootstrapped)
    }

    /// Write `data` at `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotBootstrapped`] before bootstrap, otherwise
    /// the underlying remote error.
    pub async fn put(
        &self,
        ctx: &Context,
        key: &BlobKey,
        data: impl Into<Bytes>,
    ) -> Result<(), ProviderError> {
        let bucket = self.require_bucket()?;
        let path = key.path();
        let data = data.into();

        debug!(bucket, key = %path, size = data.len(), "Writing blob");
        ctx.run(
            ProviderError::Cancelled,
            self.provider
                .api()
                .put_object(self.provider.account_id(), bucket, &path, data),
        )
        .await
    }

    /// Read the object at `key`.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotBootstrapped`] before bootstrap, otherwise
    /// any remote error other than not-found.
    pub async fn get(&self, ctx: &Context, key: &BlobKey) -> Result<Option<Bytes>, ProviderError> {
        let bucket = self.require_bucket()?;
        let path = key.path();

        let result = ctx
            .run(
                ProviderError::Cancelled,
                self.provider
                    .api()
                    .get_object(self.provider.account_id(), bucket, &path),
            )
            .await;

        match result {
            Ok(data) => {
                debug!(bucket, key = %path, size = data.len(), "Read blob");
                Ok(Some(data))
            }
            Err(err) if err.is_not_found() => {
                debug!(bucket, key = %path, "Blob does not exist");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete the object at `key`. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotBootstrapped`] before bootstrap, otherwise
    /// any remote error other than not-found.
    pub async fn remove(&self, ctx: &Context, key: &BlobKey) -> Result<(), ProviderError> {
        let bucket = self.require_bucket()?;
        let path = key.path();

        debug!(bucket, key = %path, "Removing blob");
        let result = ctx
            .run(
                ProviderError::Cancelled,
                self.provider
                    .api()
                    .delete_object(self.provider.account_id(), bucket, &path),
            )
            .await;

        match result {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Store the deployment state blob for `(app, stage)`.
    ///
    /// # Errors
    ///
    /// See [`CloudflareHome::put`].
    pub async fn put_state(
        &self,
        ctx: &Context,
        app: &str,
        stage: &str,
        data: impl Into<Bytes>,
    ) -> Result<(), ProviderError> {
        self.put(ctx, &BlobKey::state(app, stage)?, data).await
    }

    /// Fetch the deployment state blob for `(app, stage)`.
    ///
    /// # Errors
    ///
    /// See [`CloudflareHome::get`].
    pub async fn get_state(
        &self,
        ctx: &Context,
        app: &str,
        stage: &str,
    ) -> Result<Option<Bytes>, ProviderError> {
        self.get(ctx, &BlobKey::state(app, stage)?).await
    }

    /// Delete the deployment state blob for `(app, stage)`.
    ///
    /// # Errors
    ///
    /// See [`CloudflareHome::remove`].
    pub async fn remove_state(
        &self,
        ctx: &Context,
        app: &str,
        stage: &str,
    ) -> Result<(), ProviderError> {
        self.remove(ctx, &BlobKey::state(app, stage)?).await
    }

    // TODO: move passphrases to Secrets Store once it leaves beta.

    /// Store the passphrase for `(app, stage)`.
    ///
    /// # Errors
    ///
    /// See [`CloudflareHome::put`].
    pub async fn set_passphrase(
        &self,
        ctx: &Context,
        app: &str,
        stage: &str,
        passphrase: &str,
    ) -> Result<(), ProviderError> {
        let key = BlobKey::passphrase(app, stage)?;
        self.put(ctx, &key, Bytes::copy_from_slice(passphrase.as_bytes()))
            .await
    }

    /// Fetch the passphrase for `(app, stage)`; an empty string if none is
    /// stored.
    ///
    /// # Errors
    ///
    /// See [`CloudflareHome::get`].
    pub async fn get_passphrase(
        &self,
        ctx: &Context,
        app: &str,
        stage: &str,
    ) -> Result<String, ProviderError> {
        let key = BlobKey::passphrase(app, stage)?;
        Ok(self
            .get(ctx, &key)
            .await?
            .map(|data| String::from_utf8_lossy(&data).into_owned())
            .unwrap_or_default())
    }
}
