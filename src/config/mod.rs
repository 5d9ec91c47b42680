//! Typed configuration from a TOML file plus environment.
//!
//! Loaded once at startup, fails fast on missing or malformed values.
//! The bot token is taken from `TELEGRAM_BOT_TOKEN` when set (preferred
//! over checking it into the config file) and wrapped in
//! `secrecy::SecretString` to prevent log leaks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::telegram::DEFAULT_API_URL;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// When present, updates arrive via webhook instead of long polling.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub token: Option<SecretString>,
    /// Server-side long-poll hold, seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_s: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            poll_timeout_s: default_poll_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Worker count; also the parallelism cap for update handling.
    #[serde(default = "default_pool_size")]
    pub size: usize,
    /// How long an update may wait for a free worker before being dropped.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            submit_timeout_ms: default_submit_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchiveConfig {
    /// Quote archive API root, e.g. `https://quotes.example.org/api`.
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    /// Externally reachable URL the platform will POST updates to.
    /// The bot token is appended as the path.
    pub public_url: String,
    #[serde(default = "default_webhook_bind")]
    pub bind: String,
    /// Self-signed certificate to upload with the webhook registration.
    /// TLS itself terminates at the reverse proxy in front of `bind`.
    #[serde(default)]
    pub certificate: Option<PathBuf>,
}

impl Config {
    /// Read and parse a config file, then overlay the environment.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config {}: {e}", path.display())))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))?;

        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.token = Some(SecretString::from(token));
        }

        Ok(config)
    }

    /// The bot token, from env or file. Errors when neither provided it.
    pub fn token(&self) -> Result<SecretString> {
        self.telegram
            .token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_owned()))
            .ok_or_else(|| {
                Error::Config(
                    "bot token not set: provide telegram.token or TELEGRAM_BOT_TOKEN".to_string(),
                )
            })
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_poll_timeout() -> u64 {
    25
}

fn default_pool_size() -> usize {
    4
}

fn default_submit_timeout() -> u64 {
    2000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("quotebot.db")
}

fn default_webhook_bind() -> String {
    "0.0.0.0:8443".to_string()
}
