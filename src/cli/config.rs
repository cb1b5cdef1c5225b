//! Channel Gate configuration file handling
//!
//! Operator configuration lives in one TOML file. It is loaded and validated
//! once at start and never changes while the bot runs. The bot token may be
//! supplied through `CHANNEL_GATE_BOT_TOKEN` instead of the file.

use channel_gate::platform::telegram::DEFAULT_API_URL;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `telegram.token`
pub const TOKEN_ENV: &str = "CHANNEL_GATE_BOT_TOKEN";

/// Token written into generated configs; rejected by `validate`
const PLACEHOLDER_TOKEN: &str = "YOUR_BOT_TOKEN";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_INVITE_TTL: &str = "10m";
const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_REQUEST_TIMEOUT: &str = "10s";
const DEFAULT_POLL_INTERVAL: &str = "500ms";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub telegram: TelegramConfig,

    pub access: AccessConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token
    #[serde(default)]
    pub token: String,

    /// Numeric id of the restricted channel (e.g. -1001234567890)
    pub channel_id: i64,

    /// Public @username of the channel, for display only
    pub channel_username: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Users allowed to run admin commands
    pub admin_ids: Vec<i64>,

    /// Invite link lifetime (humantime, e.g. "10m")
    #[serde(default = "default_invite_ttl")]
    pub invite_ttl: String,

    /// Users per page in `/users`
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// SQLite database file; records are kept in memory when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Bound on every platform call (humantime)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Pause between update polls (humantime)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_invite_ttl() -> String {
    DEFAULT_INVITE_TTL.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout() -> String {
    DEFAULT_REQUEST_TIMEOUT.to_string()
}

fn default_poll_interval() -> String {
    DEFAULT_POLL_INTERVAL.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let duration = humantime::parse_duration(value)
        .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", field, value, e)))?;
    if duration.is_zero() {
        return Err(ConfigError::Invalid(format!("{} must be greater than zero", field)));
    }
    Ok(duration)
}

impl GatewayConfig {
    /// Load, apply the token override and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_token_override(std::env::var(TOKEN_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read and parse without validation.
    pub fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.token = token;
        }
    }

    /// Reject configurations the bot cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = self.telegram.token.trim();
        if token.is_empty() || token == PLACEHOLDER_TOKEN {
            return Err(ConfigError::Invalid(format!(
                "telegram.token is not set (or set {})",
                TOKEN_ENV
            )));
        }
        if self.telegram.channel_id == 0 {
            return Err(ConfigError::Invalid("telegram.channel_id is not set".into()));
        }
        if self.access.admin_ids.is_empty() {
            return Err(ConfigError::Invalid("access.admin_ids is empty".into()));
        }
        if self.access.page_size == 0 {
            return Err(ConfigError::Invalid(
                "access.page_size must be greater than zero".into(),
            ));
        }
        self.invite_ttl()?;
        self.request_timeout()?;
        self.poll_interval()?;
        Ok(())
    }

    pub fn invite_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration("access.invite_ttl", &self.access.invite_ttl)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("platform.request_timeout", &self.platform.request_timeout)
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("platform.poll_interval", &self.platform.poll_interval)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(store_path: &Path) -> String {
        format!(
            r#"# Channel Gate Configuration
#
# Loaded once at start. Restart the bot after editing.

[telegram]
# Bot API token from @BotFather.
# The CHANNEL_GATE_BOT_TOKEN environment variable overrides this value.
token = "{placeholder}"

# Numeric id of the restricted channel. The bot must be an administrator
# allowed to create invite links.
channel_id = -1000000000000

# Public username of the channel (optional, display only)
# channel_username = "@my_channel"

# api_url = "{api_url}"

[access]
# Telegram user ids allowed to run admin commands
admin_ids = []

# Lifetime of each single-use invite link
invite_ttl = "{ttl}"

# Users per page in /users
page_size = {page_size}

[store]
# SQLite database with users, invite links, signals and the audit log.
# Remove this line to keep records in memory only.
path = "{store_path}"

[platform]
# Bound on every Telegram API call
request_timeout = "{request_timeout}"

# Pause between update polls
poll_interval = "{poll_interval}"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
level = "{level}"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/channel-gate/channel-gate.log"
"#,
            placeholder = PLACEHOLDER_TOKEN,
            api_url = DEFAULT_API_URL,
            ttl = DEFAULT_INVITE_TTL,
            page_size = DEFAULT_PAGE_SIZE,
            store_path = store_path.display(),
            request_timeout = DEFAULT_REQUEST_TIMEOUT,
            poll_interval = DEFAULT_POLL_INTERVAL,
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Write the commented default configuration file
    pub fn create_default(config_path: &Path, store_path: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml(store_path))
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("channel-gate")
}

/// Default config file: `~/.config/channel-gate/config.toml` on Linux
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("channel-gate")
        .join("config.toml")
}

/// Default database: `~/.local/share/channel-gate/gateway.db` on Linux
pub fn default_store_path() -> PathBuf {
    data_dir().join("gateway.db")
}
