//! Configuration management
//!
//! Every path, port and name the tool relies on lives in [`Config`] so that
//! each component receives it at construction instead of reaching for
//! globals. The built-in defaults reproduce the fixed layout
//! (`~/.SaferViewer/drive-api-cert.json`, `/tmp/SaferViewer.log`, port
//! 31338); an optional `~/.SaferViewer/config.json` may override them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::Result;
use crate::error::Error;

/// Application name, used for the cache directory and the log file
pub const APP_NAME: &str = "SaferViewer";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the token cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Token cache file name, query-escaped when joined to `cache_dir`
    #[serde(default = "default_token_file")]
    pub token_file: String,

    /// Diagnostic log, appended to and never rotated
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Remote folder uploads are placed in
    #[serde(default = "default_folder_name")]
    pub folder_name: String,

    #[serde(default = "default_folder_description")]
    pub folder_description: String,

    /// OAuth2 scope requested from the user
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Opaque anti-forgery value echoed back by the authorization server
    #[serde(default = "default_state_token")]
    pub state_token: String,

    /// Continue with the pending upload after a first-run authorization
    /// instead of exiting once the token is persisted
    #[serde(default = "default_resume")]
    pub resume_after_authorization: bool,

    /// Resumable upload chunk size in bytes (multiple of 256 KiB)
    #[serde(default = "default_chunk_size")]
    pub upload_chunk_size: usize,

    /// Local redirect listener
    #[serde(default)]
    pub callback: CallbackConfig,
}

/// Settings for the local redirect listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_callback_host")]
    pub host: String,

    #[serde(default = "default_callback_port")]
    pub port: u16,

    /// Route the authorization server redirects to
    #[serde(default = "default_callback_path")]
    pub path: String,

    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
}

impl CallbackConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Address the listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_cache_dir() -> PathBuf {
    home_dir().join(format!(".{}", APP_NAME))
}

fn default_token_file() -> String {
    "drive-api-cert.json".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(format!("/tmp/{}.log", APP_NAME))
}

fn default_folder_name() -> String {
    APP_NAME.to_string()
}

fn default_folder_description() -> String {
    format!("{} Cache directory", APP_NAME)
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive".to_string()
}

fn default_state_token() -> String {
    "state-token".to_string()
}

fn default_resume() -> bool {
    true
}

fn default_chunk_size() -> usize {
    8 * 1024 * 1024
}

fn default_callback_host() -> String {
    "localhost".to_string()
}

fn default_callback_port() -> u16 {
    31338
}

fn default_callback_path() -> String {
    "/".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_header_bytes() -> usize {
    1 << 20
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            host: default_callback_host(),
            port: default_callback_port(),
            path: default_callback_path(),
            read_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
            max_header_bytes: default_max_header_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            token_file: default_token_file(),
            log_file: default_log_file(),
            folder_name: default_folder_name(),
            folder_description: default_folder_description(),
            scope: default_scope(),
            state_token: default_state_token(),
            resume_after_authorization: default_resume(),
            upload_chunk_size: default_chunk_size(),
            callback: CallbackConfig::default(),
        }
    }
}

impl Config {
    /// Default configuration rooted at an arbitrary home directory
    pub fn with_home(home: &Path) -> Self {
        Self {
            cache_dir: home.join(format!(".{}", APP_NAME)),
            log_file: home.join(format!("{}.log", APP_NAME)),
            ..Self::default()
        }
    }

    /// Full path of the token cache file
    pub fn token_path(&self) -> PathBuf {
        let escaped: String = url::form_urlencoded::byte_serialize(self.token_file.as_bytes()).collect();
        self.cache_dir.join(escaped)
    }
}

/// Get the override file path
pub fn config_path() -> PathBuf {
    default_cache_dir().join("config.json")
}

/// Load configuration, falling back to defaults when no override file exists
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from an explicit override file
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config at {:?}: {}", path, e)))
}
