//! In-memory [`CloudApi`] double for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use deploy_backend_common::ProviderError;

use crate::api::{Account, Bucket, CloudApi};

#[derive(Default)]
pub(crate) struct MemoryApi {
    accounts: Mutex<Vec<Account>>,
    buckets: Mutex<Vec<Bucket>>,
    objects: Mutex<HashMap<(String, String), Bytes>>,
    fail_next: Mutex<Option<ProviderError>>,
    list_accounts_calls: AtomicUsize,
    create_bucket_calls: AtomicUsize,
}

impl MemoryApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_accounts<I, S>(ids: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let api = Self::new();
        api.set_accounts(
            ids.into_iter()
                .map(|id| Account {
                    id: id.into(),
                    name: String::new(),
                })
                .collect(),
        );
        api
    }

    pub(crate) fn set_accounts(&self, accounts: Vec<Account>) {
        *self.accounts.lock() = accounts;
    }

    pub(crate) fn add_bucket(&self, name: &str) {
        self.buckets.lock().push(Bucket {
            name: name.to_string(),
            creation_date: None,
        });
    }

    /// Make the next call of any operation fail with `err`.
    pub(crate) fn fail_next_with(&self, err: ProviderError) {
        *self.fail_next.lock() = Some(err);
    }

    pub(crate) fn list_accounts_calls(&self) -> usize {
        self.list_accounts_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn create_bucket_calls(&self) -> usize {
        self.create_bucket_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn bucket_count(&self, name: &str) -> usize {
        self.buckets.lock().iter().filter(|b| b.name == name).count()
    }

    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn injected_failure(&self) -> Result<(), ProviderError> {
        match self.fail_next.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudApi for MemoryApi {
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        self.list_accounts_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        Ok(self.accounts.lock().clone())
    }

    async fn list_buckets(
        &self,
        _account_id: &str,
        name: &str,
    ) -> Result<Vec<Bucket>, ProviderError> {
        self.injected_failure()?;
        Ok(self
            .buckets
            .lock()
            .iter()
            .filter(|b| b.name.contains(name))
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, _account_id: &str, name: &str) -> Result<Bucket, ProviderError> {
        self.create_bucket_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        self.add_bucket(name);
        Ok(Bucket {
            name: name.to_string(),
            creation_date: None,
        })
    }

    async fn put_object(
        &self,
        _account_id: &str,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), ProviderError> {
        self.injected_failure()?;
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(
        &self,
        _account_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, ProviderError> {
        self.injected_failure()?;
        self.object(bucket, key)
            .ok_or_else(|| ProviderError::object_not_found(key))
    }

    async fn delete_object(
        &self,
        _account_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(), ProviderError> {
        self.injected_failure()?;
        self.objects
            .lock()
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| ProviderError::object_not_found(key))
    }
}
