//! Authenticated sessions
//!
//! Resolves a token (cache first, interactive flow on a miss) and wraps it
//! into a [`Session`] that stamps the `Authorization` header on outgoing
//! requests. Freshness is never checked up front: a rejected token shows up
//! as [`Error::Unauthorized`] from the storage service.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use crate::Result;
use crate::config::Config;
use crate::error::Error;
use crate::opener::Opener;
use super::flow::AuthorizationFlow;
use super::provider::TokenExchanger;
use super::secret::ApplicationSecret;
use super::token_store::{CachedToken, TokenStore};

/// Token-bearing HTTP handle used by the storage service
#[derive(Debug, Clone)]
pub struct Session {
    http: Client,
    token: CachedToken,
}

impl Session {
    pub fn new(token: CachedToken) -> Self {
        Self::with_client(Client::new(), token)
    }

    pub fn with_client(http: Client, token: CachedToken) -> Self {
        Self { http, token }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn token(&self) -> &CachedToken {
        &self.token
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        let token_type = if self.token.token_type.is_empty() || self.token.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token.token_type.as_str()
        };
        format!("{} {}", token_type, self.token.access_token)
    }

    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.authorization())
    }
}

/// Where a resolved session's token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    /// Loaded from the token cache
    Cached,
    /// Obtained by the interactive flow during this run
    Authorized,
}

#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Session,
    pub source: SessionSource,
}

/// Builds sessions from the cache or the interactive flow
pub struct Authenticator<'a> {
    config: &'a Config,
    secret: &'a ApplicationSecret,
    store: TokenStore,
    opener: &'a dyn Opener,
    exchanger: &'a dyn TokenExchanger,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        config: &'a Config,
        secret: &'a ApplicationSecret,
        opener: &'a dyn Opener,
        exchanger: &'a dyn TokenExchanger,
    ) -> Self {
        Self {
            config,
            secret,
            store: TokenStore::from_config(config),
            opener,
            exchanger,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Cached token if there is one, otherwise run the authorization flow
    pub async fn session(&self) -> Result<ResolvedSession> {
        match self.store.load() {
            Ok(token) => {
                tracing::info!("Using cached credential from {:?}", self.store.path());
                return Ok(ResolvedSession {
                    session: Session::new(token),
                    source: SessionSource::Cached,
                });
            }
            Err(Error::TokenNotFound(path)) => {
                tracing::info!("No cached credential at {:?}, starting authorization", path);
            }
            Err(e) => {
                tracing::warn!("Unable to read cached credential, re-authorizing: {}", e);
            }
        }

        let mut flow = AuthorizationFlow::new(self.config, self.secret, &self.store, self.opener, self.exchanger);
        let token = flow.run().await?;

        Ok(ResolvedSession {
            session: Session::new(token),
            source: SessionSource::Authorized,
        })
    }

    /// Trade the session's refresh token for a new access token and cache it
    pub async fn refresh(&self, session: &Session) -> Result<Session> {
        let refresh_token = session.token().refresh_token.as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::OAuth("No refresh token cached".to_string()))?;

        tracing::info!("Access token rejected, refreshing");
        let token = self.exchanger.refresh(refresh_token).await?;
        self.store.save(&token)?;

        Ok(Session::with_client(session.http().clone(), token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingOpener {
        calls: AtomicUsize,
    }

    impl Opener for CountingOpener {
        fn open(&self, target: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Open {
                target: target.to_string(),
                reason: "headless".to_string(),
            })
        }
    }

    struct RefreshingExchanger;

    #[async_trait]
    impl TokenExchanger for RefreshingExchanger {
        async fn exchange_code(&self, _code: &str, _verifier: &str, _redirect_uri: &str) -> Result<CachedToken> {
            unreachable!("no interactive flow in these tests")
        }

        async fn refresh(&self, refresh_token: &str) -> Result<CachedToken> {
            Ok(CachedToken::new(
                "ya29.renewed".to_string(),
                None,
                Some(refresh_token.to_string()),
                Some(3600),
            ))
        }
    }

    fn test_config(home: &std::path::Path) -> Config {
        let mut config = Config::with_home(home);
        config.callback.host = "127.0.0.1".to_string();
        config.callback.port = 0;
        config
    }

    fn secret() -> ApplicationSecret {
        ApplicationSecret::from_json(r#"{"installed": {"client_id": "id", "client_secret": "s"}}"#).unwrap()
    }

    #[tokio::test]
    async fn test_cached_token_skips_browser() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = secret();
        let opener = CountingOpener::default();
        let auth = Authenticator::new(&config, &secret, &opener, &RefreshingExchanger);

        let cached = CachedToken::new("ya29.cached".to_string(), None, None, None);
        auth.store().save(&cached).unwrap();

        let resolved = auth.session().await.unwrap();
        assert_eq!(resolved.source, SessionSource::Cached);
        assert_eq!(resolved.session.token(), &cached);
        assert_eq!(opener.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_cache_reaches_user_consent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = secret();
        let opener = CountingOpener::default();
        let auth = Authenticator::new(&config, &secret, &opener, &RefreshingExchanger);

        let err = auth.session().await.unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert_eq!(opener.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_persists_new_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = secret();
        let opener = CountingOpener::default();
        let auth = Authenticator::new(&config, &secret, &opener, &RefreshingExchanger);

        let stale = Session::new(CachedToken::new("ya29.stale".to_string(), None, Some("1//r".to_string()), None));
        let fresh = auth.refresh(&stale).await.unwrap();

        assert_eq!(fresh.token().access_token, "ya29.renewed");
        assert_eq!(auth.store().load().unwrap(), *fresh.token());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = secret();
        let opener = CountingOpener::default();
        let auth = Authenticator::new(&config, &secret, &opener, &RefreshingExchanger);

        let session = Session::new(CachedToken::new("a".to_string(), None, None, None));
        assert!(matches!(auth.refresh(&session).await, Err(Error::OAuth(_))));
    }

    #[test]
    fn test_authorization_header_normalizes_type() {
        let mut token = CachedToken::new("abc".to_string(), Some("bearer".to_string()), None, None);
        assert_eq!(Session::new(token.clone()).authorization(), "Bearer abc");

        token.token_type = "MAC".to_string();
        assert_eq!(Session::new(token).authorization(), "MAC abc");
    }
}
