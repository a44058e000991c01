//! Configuration for the chat server.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::core::errors::{ChatError, ChatResult};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Top-level configuration for the chat server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Port the HTTP server listens on.
    pub port: u16,
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Origin allowed for cross-origin requests.
    pub allowed_origin: String,
    /// Refuse channel upgrades that carry no `Origin` header.
    #[serde(default)]
    pub require_origin: bool,
    /// Reply generator settings.
    pub responder: ResponderConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            sqlite_path: PathBuf::from("ai_chat.sqlite"),
            allowed_origin: "http://localhost:3001".to_string(),
            require_origin: false,
            responder: ResponderConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Build a configuration from defaults overridden by environment variables.
    ///
    /// Recognized variables: `CHAT_PORT` (or `PORT`), `CHAT_DB_PATH`,
    /// `CHAT_ALLOWED_ORIGIN`, `CHAT_REQUIRE_ORIGIN`, `CHAT_REPLY_DELAY_MIN_MS`,
    /// `CHAT_REPLY_DELAY_MAX_MS`.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> ChatResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ChatConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> ChatResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        let port = env_var("CHAT_PORT")
            .map(|value| ("CHAT_PORT", value))
            .or_else(|| env_var("PORT").map(|value| ("PORT", value)));
        if let Some((key, port)) = port {
            config.port = parse_number(key, &port)?;
        }
        if let Some(path) = env_var("CHAT_DB_PATH") {
            config.sqlite_path = PathBuf::from(path);
        }
        if let Some(origin) = env_var("CHAT_ALLOWED_ORIGIN") {
            config.allowed_origin = origin;
        }
        if let Some(flag) = env_var("CHAT_REQUIRE_ORIGIN") {
            config.require_origin = parse_flag("CHAT_REQUIRE_ORIGIN", &flag)?;
        }
        if let Some(min) = env_var("CHAT_REPLY_DELAY_MIN_MS") {
            config.responder.delay_min_ms = parse_number("CHAT_REPLY_DELAY_MIN_MS", &min)?;
        }
        if let Some(max) = env_var("CHAT_REPLY_DELAY_MAX_MS") {
            config.responder.delay_max_ms = parse_number("CHAT_REPLY_DELAY_MAX_MS", &max)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.sqlite_path.as_os_str().is_empty() {
            return Err(ChatError::InvalidConfig(
                "sqlite_path must not be empty".to_string(),
            ));
        }

        Url::parse(&self.allowed_origin)?;

        self.responder.validate()
    }
}

/// Settings for the templated reply generator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Lower bound of the simulated latency, in milliseconds.
    pub delay_min_ms: u64,
    /// Upper bound of the simulated latency, in milliseconds.
    pub delay_max_ms: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            delay_min_ms: 1000,
            delay_max_ms: 3000,
        }
    }
}

impl ResponderConfig {
    /// Validate the delay range.
    ///
    /// # Errors
    /// Returns an error if the lower bound exceeds the upper bound.
    pub fn validate(&self) -> ChatResult<()> {
        if self.delay_min_ms > self.delay_max_ms {
            return Err(ChatError::InvalidConfig(format!(
                "reply delay min ({}ms) must be <= max ({}ms)",
                self.delay_min_ms, self.delay_max_ms
            )));
        }
        Ok(())
    }

    /// Lower bound as a [`Duration`].
    #[must_use]
    pub const fn delay_min(&self) -> Duration {
        Duration::from_millis(self.delay_min_ms)
    }

    /// Upper bound as a [`Duration`].
    #[must_use]
    pub const fn delay_max(&self) -> Duration {
        Duration::from_millis(self.delay_max_ms)
    }
}

fn parse_flag(key: &str, raw: &str) -> ChatResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ChatError::InvalidConfig(format!(
            "{key} is not a valid flag: {raw}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ChatResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ChatError::InvalidConfig(format!("{key} is not a valid number: {raw}")))
}
