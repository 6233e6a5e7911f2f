//! Cloudflare REST client.
//!
//! [`CloudflareClient`] implements [`CloudApi`] against the documented v4
//! endpoints using plain authenticated requests:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list accounts | `GET /accounts` |
//! | list buckets | `GET /accounts/{id}/r2/buckets?name_contains=...` |
//! | create bucket | `POST /accounts/{id}/r2/buckets` |
//! | put object | `PUT /accounts/{id}/r2/buckets/{bucket}/objects/{key}` |
//! | get object | `GET /accounts/{id}/r2/buckets/{bucket}/objects/{key}` |
//! | delete object | `DELETE /accounts/{id}/r2/buckets/{bucket}/objects/{key}` |
//!
//! JSON responses use the `{ success, errors, result }` envelope. Object
//! bodies are returned raw.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use deploy_backend_common::ProviderConfig;
use deploy_backend_common::ProviderError;
use deploy_backend_common::error::CLOUDFLARE_NO_SUCH_KEY;

use crate::api::{Account, Bucket, CloudApi};
use crate::credentials::Credentials;

/// Response envelope shared by JSON endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

/// A single entry of the envelope's `errors` list.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: u32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

/// Authenticated Cloudflare API client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct CloudflareClient {
    /// HTTP client (shared, connection pooled).
    client: Client,

    /// API root, e.g. `https://api.cloudflare.com/client/v4`.
    base_url: Url,

    /// Credentials applied to every request.
    credentials: Credentials,
}

impl CloudflareClient {
    /// Create a client for the given credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be constructed.
    pub fn new(credentials: Credentials, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .user_agent(concat!("deploy-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::transport(format!("failed to create HTTP client: {e}")))?;

        Self::with_client(client, credentials, &config.api_base_url)
    }

    /// Create with a custom HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn with_client(
        client: Client,
        credentials: Credentials,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::transport(format!("invalid API base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::transport(format!(
                "invalid API base URL {base_url}"
            )));
        }

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Get the API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments. Each segment is
    /// percent-encoded on its own.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn object_url(&self, account_id: &str, bucket: &str, key: &str) -> Url {
        let prefix = ["accounts", account_id, "r2", "buckets", bucket, "objects"];
        self.endpoint(prefix.into_iter().chain(key.split('/')))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.credentials.apply(self.client.request(method, url))
    }

    async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::transport(format!("request timed out: {e}"))
            } else {
                ProviderError::transport(e.to_string())
            }
        })
    }

    /// Turn a failed response into an error, keeping the remote message.
    async fn error_from(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();

        match serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
            Ok(envelope) if !envelope.errors.is_empty() => {
                let first = &envelope.errors[0];
                ProviderError::api(status.as_u16(), Some(first.code), first.message.clone())
            }
            _ => {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                let message = if text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    text
                };
                ProviderError::api(status.as_u16(), None, message)
            }
        }
    }

    /// Decode a JSON envelope, failing on HTTP or envelope-level errors.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("invalid response body: {e}")))?;

        if !envelope.success {
            return Err(match envelope.errors.into_iter().next() {
                Some(first) => ProviderError::api(status.as_u16(), Some(first.code), first.message),
                None => ProviderError::api(status.as_u16(), None, "request was not successful"),
            });
        }

        Ok(envelope.result)
    }

    /// Map object-level failures, classifying missing keys structurally.
    ///
    /// A remote error code decides on its own; a bare 404 without one counts
    /// as a missing key. Other 404 codes (e.g. a missing bucket) stay errors.
    fn classify_object_error(err: ProviderError, key: &str) -> ProviderError {
        let missing = match &err {
            ProviderError::Api {
                code: Some(code), ..
            } => *code == CLOUDFLARE_NO_SUCH_KEY,
            ProviderError::Api { status, code: None, .. } => {
                *status == StatusCode::NOT_FOUND.as_u16()
            }
            _ => false,
        };

        if missing {
            ProviderError::object_not_found(key)
        } else {
            err
        }
    }
}

#[async_trait]
impl CloudApi for CloudflareClient {
    #[instrument(skip(self))]
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        let mut url = self.endpoint(["accounts"]);
        url.query_pairs_mut().append_pair("per_page", "50");

        let response = Self::send(self.request(Method::GET, url)).await?;
        let accounts: Option<Vec<Account>> = Self::decode(response).await?;
        let accounts = accounts.unwrap_or_default();

        debug!(count = accounts.len(), "Accounts listed");
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn list_buckets(
        &self,
        account_id: &str,
        name: &str,
    ) -> Result<Vec<Bucket>, ProviderError> {
        let mut url = self.endpoint(["accounts", account_id, "r2", "buckets"]);
        url.query_pairs_mut().append_pair("name_contains", name);

        let response = Self::send(self.request(Method::GET, url)).await?;
        let list: Option<BucketList> = Self::decode(response).await?;

        Ok(list.map(|l| l.buckets).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn create_bucket(&self, account_id: &str, name: &str) -> Result<Bucket, ProviderError> {
        let url = self.endpoint(["accounts", account_id, "r2", "buckets"]);
        let request = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "name": name }));

        let response = Self::send(request).await?;
        let bucket: Option<Bucket> = Self::decode(response).await?;

        Ok(bucket.unwrap_or_else(|| Bucket {
            name: name.to_string(),
            creation_date: None,
        }))
    }

    #[instrument(skip(self, body), fields(body_size = body.len()))]
    async fn put_object(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), ProviderError> {
        let url = self.object_url(account_id, bucket, key);
        let request = self
            .request(Method::PUT, url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);

        let response = Self::send(request).await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Bytes, ProviderError> {
        let url = self.object_url(account_id, bucket, key);
        let response = Self::send(self.request(Method::GET, url)).await?;

        if !response.status().is_success() {
            let err = Self::error_from(response).await;
            return Err(Self::classify_object_error(err, key));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(format!("failed to read object body: {e}")))?;

        debug!(body_size = body.len(), "Object fetched");
        Ok(body)
    }

    #[instrument(skip(self))]
    async fn delete_object(
        &self,
        account_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(), ProviderError> {
        let url = self.object_url(account_id, bucket, key);
        let response = Self::send(self.request(Method::DELETE, url)).await?;

        Self::decode::<serde_json::Value>(response)
            .await
            .map(|_| ())
            .map_err(|err| Self::classify_object_error(err, key))
    }
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
