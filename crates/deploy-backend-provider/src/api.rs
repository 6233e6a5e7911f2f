//! The cloud API surface the provider depends on.
//!
//! [`CloudApi`] is the seam between credential resolution / state storage
//! and the transport. [`crate::CloudflareClient`] implements it over the
//! public Cloudflare REST API; tests substitute an in-memory double.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use deploy_backend_common::ProviderError;

/// An account visible to the authenticated credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    /// Account identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// An R2 bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Bucket {
    /// Bucket name.
    pub name: String,
    /// Creation timestamp as reported by the API.
    #[serde(default)]
    pub creation_date: Option<String>,
}

/// Authenticated operations against the cloud account.
///
/// Object operations report a missing key as
/// [`ProviderError::ObjectNotFound`], never through message text.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// List the accounts the credentials can access.
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError>;

    /// List buckets whose name contains `name`.
    async fn list_buckets(&self, account_id: &str, name: &str)
    -> Result<Vec<Bucket>, ProviderError>;

    /// Create a bucket.
    async fn create_bucket(&self, account_id: &str, name: &str) -> Result<Bucket, ProviderError>;

    /// Create or replace the object at `key`.
    async fn put_object(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), ProviderError>;

    /// Fetch the object at `key`.
    async fn get_object(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, ProviderError>;

    /// Delete the object at `key`.
    async fn delete_object(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(), ProviderError>;
}
