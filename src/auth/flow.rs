//! Interactive authorization
//!
//! Single pass through the OAuth2 authorization-code flow:
//!
//! ```text
//! Idle -> AwaitingUserConsent -> AwaitingCallback -> Exchanging -> Persisted -> Terminated
//! ```
//!
//! Every failure ends the pass; a human has to run the tool again. On
//! success the persisted token is handed back to the caller, which decides
//! whether to carry on with the pending upload.

use url::Url;
use crate::Result;
use crate::config::Config;
use crate::opener::Opener;
use super::callback_server::CallbackServer;
use super::pkce::{PkcePair, CHALLENGE_METHOD};
use super::provider::TokenExchanger;
use super::secret::{ApplicationSecret, RESPONSE_HTML};
use super::token_store::{CachedToken, TokenStore};

/// Position in the authorization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingUserConsent,
    AwaitingCallback,
    Exchanging,
    Persisted,
    Terminated,
}

/// Parameters of the browser authorization request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub scope: String,
    pub redirect_uri: String,
    pub state: String,
}

impl AuthorizationRequest {
    pub fn new(secret: &ApplicationSecret, scope: &str, redirect_uri: String, state: &str) -> Self {
        Self {
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            auth_uri: secret.auth_uri.clone(),
            scope: scope.to_string(),
            redirect_uri,
            state: state.to_string(),
        }
    }

    /// URL the user visits to grant access; asks for offline access so a
    /// refresh token is issued
    pub fn authorization_url(&self, pkce: &PkcePair) -> Result<String> {
        let mut url = Url::parse(&self.auth_uri)?;

        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scope)
            .append_pair("state", &self.state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD);

        Ok(url.to_string())
    }
}

/// One-shot authorization controller
pub struct AuthorizationFlow<'a> {
    config: &'a Config,
    secret: &'a ApplicationSecret,
    store: &'a TokenStore,
    opener: &'a dyn Opener,
    exchanger: &'a dyn TokenExchanger,
    transitions: Vec<FlowState>,
}

impl<'a> AuthorizationFlow<'a> {
    pub fn new(
        config: &'a Config,
        secret: &'a ApplicationSecret,
        store: &'a TokenStore,
        opener: &'a dyn Opener,
        exchanger: &'a dyn TokenExchanger,
    ) -> Self {
        Self {
            config,
            secret,
            store,
            opener,
            exchanger,
            transitions: vec![FlowState::Idle],
        }
    }

    pub fn state(&self) -> FlowState {
        self.transitions.last().copied().unwrap_or(FlowState::Idle)
    }

    /// States visited so far, starting with `Idle`
    pub fn transitions(&self) -> &[FlowState] {
        &self.transitions
    }

    /// Run the authorization pass and return the persisted token
    ///
    /// The listener is bound before the browser is opened so the redirect
    /// cannot arrive ahead of it.
    pub async fn run(&mut self) -> Result<CachedToken> {
        let server = CallbackServer::bind(&self.config.callback).await?;
        let request = AuthorizationRequest::new(
            self.secret,
            &self.config.scope,
            server.redirect_uri()?,
            &self.config.state_token,
        );
        let pkce = PkcePair::new();
        let auth_url = request.authorization_url(&pkce)?;

        self.advance(FlowState::AwaitingUserConsent);
        tracing::info!("Opening browser for authorization: {}", auth_url);
        self.opener.open(&auth_url)?;

        self.advance(FlowState::AwaitingCallback);
        let pending = server.next_callback(&request.state).await?;

        self.advance(FlowState::Exchanging);
        let exchanged = self.exchanger
            .exchange_code(pending.code(), &pkce.verifier, &request.redirect_uri)
            .await
            .and_then(|token| self.store.save(&token).map(|_| token));

        let token = match exchanged {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("Unable to retrieve token from web: {}", e);
                if let Err(respond_err) = pending.respond_failure().await {
                    tracing::warn!("Failed to send error page: {}", respond_err);
                }
                return Err(e);
            }
        };
        self.advance(FlowState::Persisted);

        if let Err(e) = pending.respond_success(RESPONSE_HTML).await {
            // The token is already stored; the browser just misses the page.
            tracing::warn!("Failed to send confirmation page: {}", e);
        }
        server.shutdown();
        self.advance(FlowState::Terminated);

        Ok(token)
    }

    fn advance(&mut self, next: FlowState) {
        tracing::debug!("Authorization flow: {:?} -> {:?}", self.state(), next);
        self.transitions.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallbackConfig;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;

    /// Plays the browser: follows the authorization URL straight back to
    /// the redirect URI with a code
    #[derive(Default)]
    struct BrowserStub {
        opened: Mutex<Vec<String>>,
        replies: Mutex<Vec<JoinHandle<String>>>,
    }

    impl Opener for BrowserStub {
        fn open(&self, target: &str) -> Result<()> {
            self.opened.lock().unwrap().push(target.to_string());

            let url = Url::parse(target).unwrap();
            let param = |name: &str| {
                url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned()).unwrap()
            };
            let redirect = Url::parse(&param("redirect_uri")).unwrap();
            let addr = format!("{}:{}", redirect.host_str().unwrap(), redirect.port().unwrap());
            let request = format!(
                "GET /?state={}&code=4%2Fcode&scope=drive HTTP/1.1\r\nHost: {}\r\n\r\n",
                param("state"),
                addr
            );

            self.replies.lock().unwrap().push(tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream.write_all(request.as_bytes()).await.unwrap();
                let mut response = String::new();
                stream.read_to_string(&mut response).await.unwrap();
                response
            }));
            Ok(())
        }
    }

    impl BrowserStub {
        async fn reply(&self) -> String {
            let handle = self.replies.lock().unwrap().pop().unwrap();
            handle.await.unwrap()
        }
    }

    struct RefusingOpener;

    impl Opener for RefusingOpener {
        fn open(&self, target: &str) -> Result<()> {
            Err(Error::Open {
                target: target.to_string(),
                reason: "exit status 1".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingExchanger {
        codes: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl TokenExchanger for RecordingExchanger {
        async fn exchange_code(&self, code: &str, code_verifier: &str, _redirect_uri: &str) -> Result<CachedToken> {
            self.codes.lock().unwrap().push((code.to_string(), code_verifier.to_string()));
            if self.fail {
                return Err(Error::OAuth("invalid_grant".to_string()));
            }
            Ok(CachedToken::new("ya29.fresh".to_string(), None, Some("1//r".to_string()), Some(3600)))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<CachedToken> {
            unreachable!("the flow never refreshes")
        }
    }

    fn test_config(home: &Path) -> Config {
        Config {
            callback: CallbackConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                ..CallbackConfig::default()
            },
            ..Config::with_home(home)
        }
    }

    fn test_secret() -> ApplicationSecret {
        ApplicationSecret::from_json(
            r#"{"installed": {"client_id": "client.apps", "client_secret": "shh"}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_authorization_url_parameters() {
        let request = AuthorizationRequest::new(
            &test_secret(),
            "https://www.googleapis.com/auth/drive",
            "http://localhost:31338".to_string(),
            "state-token",
        );
        let pkce = PkcePair::new();
        let url = Url::parse(&request.authorization_url(&pkce).unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["client_id"], "client.apps");
        assert_eq!(pairs["redirect_uri"], "http://localhost:31338");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "https://www.googleapis.com/auth/drive");
        assert_eq!(pairs["state"], "state-token");
        assert_eq!(pairs["code_challenge"], pkce.challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[tokio::test]
    async fn test_full_pass_persists_token_and_confirms() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = test_secret();
        let store = TokenStore::from_config(&config);
        let browser = BrowserStub::default();
        let exchanger = RecordingExchanger::default();

        let mut flow = AuthorizationFlow::new(&config, &secret, &store, &browser, &exchanger);
        let token = flow.run().await.unwrap();

        assert_eq!(
            flow.transitions(),
            &[
                FlowState::Idle,
                FlowState::AwaitingUserConsent,
                FlowState::AwaitingCallback,
                FlowState::Exchanging,
                FlowState::Persisted,
                FlowState::Terminated,
            ]
        );
        assert_eq!(store.load().unwrap(), token);

        let codes = exchanger.codes.lock().unwrap().clone();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].0, "4/code");
        assert_eq!(codes[0].1.len(), 64);

        let reply = browser.reply().await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with(RESPONSE_HTML));
        assert_eq!(browser.opened.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_opener_failure_stops_before_listening_for_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = test_secret();
        let store = TokenStore::from_config(&config);
        let exchanger = RecordingExchanger::default();

        let mut flow = AuthorizationFlow::new(&config, &secret, &store, &RefusingOpener, &exchanger);
        let err = flow.run().await.unwrap_err();

        assert!(matches!(err, Error::Open { .. }));
        assert_eq!(flow.state(), FlowState::AwaitingUserConsent);
        assert!(exchanger.codes.lock().unwrap().is_empty());
        assert!(matches!(store.load(), Err(Error::TokenNotFound(_))));
    }

    #[tokio::test]
    async fn test_exchange_failure_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let secret = test_secret();
        let store = TokenStore::from_config(&config);
        let browser = BrowserStub::default();
        let exchanger = RecordingExchanger {
            fail: true,
            ..RecordingExchanger::default()
        };

        let mut flow = AuthorizationFlow::new(&config, &secret, &store, &browser, &exchanger);
        assert!(flow.run().await.is_err());

        assert_eq!(flow.state(), FlowState::Exchanging);
        assert!(matches!(store.load(), Err(Error::TokenNotFound(_))));
        assert!(browser.reply().await.starts_with("HTTP/1.1 500"));
    }
}
