//! Credential resolution and provider initialization.
//!
//! [`CloudflareProvider::init`] turns the user's [`ProviderOptions`] and the
//! `CLOUDFLARE_*` environment variables into an authenticated [`CloudApi`]
//! handle plus a resolved account identifier. The result is immutable and
//! can be shared across concurrent callers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use deploy_backend_common::config::env;
use deploy_backend_common::{Context, ProviderConfig, ProviderError, ProviderOptions};

use crate::api::CloudApi;
use crate::client::CloudflareClient;

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Scoped API token, sent as `Authorization: Bearer <token>`.
    ApiToken(String),
    /// Global API key + account email, sent as `X-Auth-Key` / `X-Auth-Email`.
    ApiKey { key: String, email: String },
}

impl Credentials {
    /// Pick credentials from the merged inputs.
    ///
    /// A non-empty token is usable on its own; a key is usable only with a
    /// non-empty email. When both forms are usable the key/email pair wins.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingCredentials`] when neither form is
    /// usable.
    pub fn resolve(
        api_token: Option<&str>,
        api_key: Option<&str>,
        email: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let non_empty = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);

        let mut credentials = non_empty(api_token).map(Credentials::ApiToken);
        if let (Some(key), Some(email)) = (non_empty(api_key), non_empty(email)) {
            credentials = Some(Credentials::ApiKey { key, email });
        }

        credentials.ok_or(ProviderError::MissingCredentials)
    }

    /// Attach authentication headers to a request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credentials::ApiToken(token) => request.bearer_auth(token),
            Credentials::ApiKey { key, email } => request
                .header("X-Auth-Key", key)
                .header("X-Auth-Email", email),
        }
    }

    /// Short name of the auth scheme, safe to log.
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::ApiToken(_) => "api_token",
            Credentials::ApiKey { .. } => "api_key",
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ApiToken(_) => f.debug_tuple("ApiToken").field(&"<redacted>").finish(),
            Credentials::ApiKey { email, .. } => f
                .debug_struct("ApiKey")
                .field("key", &"<redacted>")
                .field("email", email)
                .finish(),
        }
    }
}

/// Snapshot of the credential environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderEnv {
    /// `CLOUDFLARE_API_TOKEN`
    pub api_token: Option<String>,
    /// `CLOUDFLARE_API_KEY`
    pub api_key: Option<String>,
    /// `CLOUDFLARE_EMAIL`
    pub email: Option<String>,
    /// `CLOUDFLARE_DEFAULT_ACCOUNT_ID`
    pub account_id: Option<String>,
}

impl ProviderEnv {
    /// Read the variables from the process environment.
    pub fn from_process() -> Self {
        let read = |name: &str| std::env::var(name).ok();
        Self {
            api_token: read(env::API_TOKEN),
            api_key: read(env::API_KEY),
            email: read(env::EMAIL),
            account_id: read(env::DEFAULT_ACCOUNT_ID),
        }
    }
}

/// Authenticated provider handle.
///
/// Created once per session by [`CloudflareProvider::init`]; immutable
/// afterwards. Cloning shares the underlying client.
#[derive(Clone)]
pub struct CloudflareProvider {
    api: Arc<dyn CloudApi>,
    account_id: String,
}

impl CloudflareProvider {
    /// Initialize the provider with the Cloudflare REST client.
    ///
    /// `options` override `env` field by field.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::MissingCredentials`] when no usable auth form exists
    /// - [`ProviderError::MissingAccount`] when no account is configured and
    ///   the credentials can see none
    /// - the underlying error when listing accounts fails
    pub async fn init(
        ctx: &Context,
        app: &str,
        stage: &str,
        options: &ProviderOptions,
        env: &ProviderEnv,
        config: &ProviderConfig,
    ) -> Result<Self, ProviderError> {
        Self::init_with(ctx, app, stage, options, env, |credentials| {
            let client = CloudflareClient::new(credentials, config)?;
            Ok(Arc::new(client) as Arc<dyn CloudApi>)
        })
        .await
    }

    /// Initialize the provider with a caller-supplied client factory.
    ///
    /// # Errors
    ///
    /// See [`CloudflareProvider::init`]; errors from `connect` are returned
    /// unchanged.
    pub async fn init_with<F>(
        ctx: &Context,
        app: &str,
        stage: &str,
        options: &ProviderOptions,
        env: &ProviderEnv,
        connect: F,
    ) -> Result<Self, ProviderError>
    where
        F: FnOnce(Credentials) -> Result<Arc<dyn CloudApi>, ProviderError>,
    {
        ctx.check(ProviderError::Cancelled)?;

        let pick = |option: &Option<String>, fallback: &Option<String>| {
            option.clone().or_else(|| fallback.clone())
        };
        let api_token = pick(&options.api_token, &env.api_token);
        let api_key = pick(&options.api_key, &env.api_key);
        let email = pick(&options.email, &env.email);

        let credentials =
            Credentials::resolve(api_token.as_deref(), api_key.as_deref(), email.as_deref())?;
        let scheme = credentials.scheme();
        let api = connect(credentials)?;

        let configured = pick(&options.account_id, &env.account_id).filter(|id| !id.is_empty());
        let account_id = match configured {
            Some(id) => id,
            None => {
                let accounts = ctx.run(ProviderError::Cancelled, api.list_accounts()).await?;
                let first = accounts.first().ok_or(ProviderError::MissingAccount)?;
                if accounts.len() > 1 {
                    warn!(
                        account = %first.id,
                        visible_accounts = accounts.len(),
                        "credentials can access multiple accounts; using the first one. \
                         Set {} to choose explicitly",
                        env::DEFAULT_ACCOUNT_ID
                    );
                }
                first.id.clone()
            }
        };

        info!(account = %account_id, app, stage, auth = scheme, "cloudflare account selected");

        Ok(Self { api, account_id })
    }

    /// Get the resolved account identifier.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Get the authenticated API handle.
    pub fn api(&self) -> &Arc<dyn CloudApi> {
        &self.api
    }

    /// Environment exported to downstream build and run steps.
    pub fn env(&self) -> HashMap<String, String> {
        HashMap::from([(env::DEFAULT_ACCOUNT_ID.to_string(), self.account_id.clone())])
    }
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::api::Account;
    use crate::fake::MemoryApi;

    fn key_email_env() -> ProviderEnv {
        ProviderEnv {
            api_key: Some("key-123".into()),
            email: Some("ops@example.com".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_token_only() {
        let credentials = Credentials::resolve(Some("tok"), None, None).unwrap();
        assert_eq!(credentials, Credentials::ApiToken("tok".into()));
    }

    #[test]
    fn test_resolve_key_email_wins_over_token() {
        let credentials = Credentials::resolve(Some("tok"), Some("key"), Some("a@b.c")).unwrap();
        assert_eq!(
            credentials,
            Credentials::ApiKey {
                key: "key".into(),
                email: "a@b.c".into()
            }
        );
    }

    #[test]
    fn test_resolve_key_without_email_falls_back_to_token() {
        let credentials = Credentials::resolve(Some("tok"), Some("key"), None).unwrap();
        assert_eq!(credentials, Credentials::ApiToken("tok".into()));

        let result = Credentials::resolve(None, Some("key"), Some(""));
        assert!(matches!(result, Err(ProviderError::MissingCredentials)));
    }

    #[test]
    fn test_resolve_empty_values_are_missing() {
        let result = Credentials::resolve(Some(""), None, None);
        assert!(matches!(result, Err(ProviderError::MissingCredentials)));
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let debug_str = format!("{:?}", Credentials::ApiToken("secret".into()));
        assert!(!debug_str.contains("secret"));

        let debug_str = format!(
            "{:?}",
            Credentials::ApiKey {
                key: "secret".into(),
                email: "a@b.c".into()
            }
        );
        assert!(!debug_str.contains("secret"));
        assert!(debug_str.contains("a@b.c"));
    }

    #[tokio::test]
    async fn test_init_key_email_single_account() {
        let api = MemoryApi::with_accounts(["acct-123"]);
        let ctx = Context::new();

        let provider = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &ProviderOptions::default(),
            &key_email_env(),
            |credentials| {
                assert_eq!(credentials.scheme(), "api_key");
                Ok(api.clone() as Arc<dyn CloudApi>)
            },
        )
        .await
        .unwrap();

        assert_eq!(provider.account_id(), "acct-123");
        assert_eq!(
            provider.env().get("CLOUDFLARE_DEFAULT_ACCOUNT_ID"),
            Some(&"acct-123".to_string())
        );
    }

    #[tokio::test]
    async fn test_init_without_credentials() {
        let ctx = Context::new();

        let err = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &ProviderOptions::default(),
            &ProviderEnv::default(),
            |_| panic!("client must not be created without credentials"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::MissingCredentials));
        let message = err.to_string();
        assert!(message.contains("CLOUDFLARE_API_TOKEN"));
        assert!(message.contains("CLOUDFLARE_API_KEY"));
        assert!(message.contains("CLOUDFLARE_EMAIL"));
    }

    #[tokio::test]
    async fn test_init_zero_accounts() {
        let api = MemoryApi::with_accounts(Vec::<&str>::new());
        let ctx = Context::new();

        let err = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &ProviderOptions::default(),
            &key_email_env(),
            |_| Ok(api.clone() as Arc<dyn CloudApi>),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::MissingAccount));
    }

    #[tokio::test]
    async fn test_init_list_accounts_failure_propagates() {
        let api = MemoryApi::with_accounts(["acct-1"]);
        api.fail_next_with(ProviderError::api(403, Some(10000), "Authentication error"));
        let ctx = Context::new();

        let err = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &ProviderOptions::default(),
            &key_email_env(),
            |_| Ok(api.clone() as Arc<dyn CloudApi>),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::Api { status: 403, .. }));
        assert!(err.to_string().contains("Authentication error"));
    }

    #[tokio::test]
    async fn test_init_explicit_account_skips_listing() {
        let api = MemoryApi::with_accounts(Vec::<&str>::new());
        let env = ProviderEnv {
            api_token: Some("tok".into()),
            account_id: Some("acct-env".into()),
            ..Default::default()
        };
        let options = ProviderOptions::default();
        let ctx = Context::new();

        let provider = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &options,
            &env,
            |_| Ok(api.clone() as Arc<dyn CloudApi>),
        );
        let provider = assert_ok!(provider.await);

        assert_eq!(provider.account_id(), "acct-env");
        assert_eq!(api.list_accounts_calls(), 0);
    }

    #[tokio::test]
    async fn test_options_override_env() {
        let api = MemoryApi::with_accounts(["acct-1"]);
        let env = ProviderEnv {
            api_token: Some("env-token".into()),
            account_id: Some("acct-env".into()),
            ..Default::default()
        };
        let options = ProviderOptions {
            api_token: Some("option-token".into()),
            account_id: Some("acct-option".into()),
            ..Default::default()
        };
        let ctx = Context::new();

        let provider = CloudflareProvider::init_with(&ctx, "app", "dev", &options, &env, |c| {
            assert_eq!(c, Credentials::ApiToken("option-token".into()));
            Ok(api.clone() as Arc<dyn CloudApi>)
        })
        .await
        .unwrap();

        assert_eq!(provider.account_id(), "acct-option");
    }

    #[tokio::test]
    async fn test_init_multiple_accounts_picks_first() {
        let api = MemoryApi::new();
        api.set_accounts(vec![
            Account {
                id: "acct-a".into(),
                name: "A".into(),
            },
            Account {
                id: "acct-b".into(),
                name: "B".into(),
            },
        ]);
        let ctx = Context::new();

        let provider = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &ProviderOptions::default(),
            &key_email_env(),
            |_| Ok(api.clone() as Arc<dyn CloudApi>),
        )
        .await
        .unwrap();

        assert_eq!(provider.account_id(), "acct-a");
    }

    #[tokio::test]
    async fn test_init_cancelled() {
        let api = MemoryApi::with_accounts(["acct-1"]);
        let ctx = Context::new();
        ctx.cancel();

        let result = CloudflareProvider::init_with(
            &ctx,
            "app",
            "dev",
            &ProviderOptions::default(),
            &key_email_env(),
            |_| Ok(api.clone() as Arc<dyn CloudApi>),
        )
        .await;

        let err = assert_err!(result);
        assert!(err.is_cancelled());
    }
}
