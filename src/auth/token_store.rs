//! Token cache
//!
//! Keeps the single authorization token of the current user in
//! `~/.SaferViewer/drive-api-cert.json`. The record is reused as-is on later
//! runs; nothing here checks whether it is still accepted remotely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use crate::Result;
use crate::config::Config;
use crate::error::Error;

/// Token record as persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    /// The access token for API requests
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The refresh token for obtaining new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl CachedToken {
    /// Build a record from a token endpoint response
    pub fn new(
        access_token: String,
        token_type: Option<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        Self {
            access_token,
            token_type: token_type.unwrap_or_else(default_token_type),
            refresh_token,
            expiry: expires_in_secs.map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Owner of the on-disk token file
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.token_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached token
    ///
    /// A missing or unparsable file is [`Error::TokenNotFound`]; any other
    /// I/O failure is returned as is.
    pub fn load(&self) -> Result<CachedToken> {
        self.ensure_dir()?;

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::TokenNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            tracing::warn!("Ignoring malformed credential file {:?}: {}", self.path, e);
            Error::TokenNotFound(self.path.clone())
        })
    }

    /// Write the token, replacing any previous cache
    pub fn save(&self, token: &CachedToken) -> Result<()> {
        tracing::info!("Saving credential file to: {:?}", self.path);
        self.ensure_dir()?;

        let content = serde_json::to_string(token)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Remove the cached token if present
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() || parent.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}
