//! OAuth2 token endpoint client
//!
//! Exchanges authorization codes and refresh tokens for access tokens at the
//! `token_uri` of the bundled client descriptor.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::secret::ApplicationSecret;
use super::token_store::CachedToken;

/// Token endpoint operations the authorization flow depends on
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Trade a one-time authorization code for a token
    async fn exchange_code(&self, code: &str, code_verifier: &str, redirect_uri: &str) -> Result<CachedToken>;

    /// Obtain a fresh access token from a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<CachedToken>;
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    code_verifier: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'a str,
}

/// [`TokenExchanger`] talking to the real authorization server
#[derive(Clone)]
pub struct OAuthClient {
    secret: ApplicationSecret,
    http_client: Client,
}

impl OAuthClient {
    pub fn new(secret: ApplicationSecret) -> Self {
        Self {
            secret,
            http_client: Client::new(),
        }
    }

    async fn request_token<T: Serialize + Sync>(&self, form: &T, what: &str) -> Result<TokenResponse> {
        let response = self.http_client
            .post(&self.secret.token_uri)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(Error::OAuth(format!("{} failed ({}): {}", what, status, error_text)));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    async fn exchange_code(&self, code: &str, code_verifier: &str, redirect_uri: &str) -> Result<CachedToken> {
        let request = TokenExchangeRequest {
            client_id: &self.secret.client_id,
            client_secret: &self.secret.client_secret,
            code,
            code_verifier,
            redirect_uri,
            grant_type: "authorization_code",
        };

        let token = self.request_token(&request, "Token exchange").await?;
        Ok(into_cached(token, None))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CachedToken> {
        let request = RefreshRequest {
            client_id: &self.secret.client_id,
            client_secret: &self.secret.client_secret,
            refresh_token,
            grant_type: "refresh_token",
        };

        let token = self.request_token(&request, "Token refresh").await?;
        Ok(into_cached(token, Some(refresh_token)))
    }
}

/// Convert a response, keeping the previous refresh token when none is returned
fn into_cached(response: TokenResponse, previous_refresh: Option<&str>) -> CachedToken {
    let refresh = response.refresh_token
        .or_else(|| previous_refresh.map(str::to_string));

    CachedToken::new(
        response.access_token,
        response.token_type,
        refresh,
        response.expires_in,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"ya29.a","expires_in":3599,"refresh_token":"1//r","scope":"https://www.googleapis.com/auth/drive","token_type":"Bearer"}"#,
        )
        .unwrap();

        let token = into_cached(response, None);
        assert_eq!(token.access_token, "ya29.a");
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expiry.is_some());
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"ya29.b","expires_in":3599}"#).unwrap();

        let token = into_cached(response, Some("1//old"));
        assert_eq!(token.refresh_token.as_deref(), Some("1//old"));
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn test_exchange_form_fields() {
        let request = TokenExchangeRequest {
            client_id: "id",
            client_secret: "secret",
            code: "4/0A",
            code_verifier: "v",
            redirect_uri: "http://localhost:31338",
            grant_type: "authorization_code",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["grant_type"], "authorization_code");
        assert_eq!(value["redirect_uri"], "http://localhost:31338");
    }
}
