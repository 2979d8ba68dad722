//! Bundled application credentials
//!
//! The OAuth2 client descriptor and the confirmation page are compiled into
//! the binary; neither can be changed at runtime.

use serde::Deserialize;
use crate::Result;
use crate::error::Error;

/// Client descriptor as downloaded from the Google Cloud console
pub const CLIENT_SECRET_JSON: &str = include_str!("../../assets/client_secret.json");

/// Page served to the browser once the token has been persisted
pub const RESPONSE_HTML: &str = include_str!("../../assets/responsefile.html");

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 client credentials of the application
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Descriptor wrapper: desktop clients use `installed`, web clients `web`
#[derive(Debug, Deserialize)]
struct SecretDescriptor {
    installed: Option<ApplicationSecret>,
    web: Option<ApplicationSecret>,
}

impl ApplicationSecret {
    /// Parse the credentials compiled into the binary
    pub fn bundled() -> Result<Self> {
        Self::from_json(CLIENT_SECRET_JSON)
    }

    /// Parse a client descriptor
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: SecretDescriptor = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Unable to parse client secret file: {}", e)))?;

        let secret = descriptor.installed.or(descriptor.web).ok_or_else(|| {
            Error::Config("Client secret file has neither 'installed' nor 'web' credentials".to_string())
        })?;

        if secret.client_id.is_empty() {
            return Err(Error::Config("Client secret file has an empty client_id".to_string()));
        }

        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_secret_parses() {
        let secret = ApplicationSecret::bundled().unwrap();
        assert!(!secret.client_id.is_empty());
        assert_eq!(secret.token_uri, "https://oauth2.googleapis.com/token");
        assert_eq!(secret.redirect_uris, vec!["http://localhost:31338".to_string()]);
    }

    #[test]
    fn test_web_descriptor_with_defaults() {
        let secret = ApplicationSecret::from_json(
            r#"{"web": {"client_id": "id", "client_secret": "secret"}}"#,
        )
        .unwrap();
        assert_eq!(secret.client_id, "id");
        assert_eq!(secret.auth_uri, DEFAULT_AUTH_URI);
        assert!(secret.redirect_uris.is_empty());
    }

    #[test]
    fn test_descriptor_without_client_is_rejected() {
        let err = ApplicationSecret::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(ApplicationSecret::from_json("{").is_err());
    }

    #[test]
    fn test_response_page_is_html() {
        assert!(RESPONSE_HTML.contains("<html"));
    }
}
