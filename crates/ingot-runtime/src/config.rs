//! Runtime configuration.
//!
//! Configuration merges three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a TOML file (`bot.toml` by default),
//! 3. `BOT_`-prefixed environment variables, with `__` as the section
//!    separator (`BOT_GATEWAY__HOST`, `BOT_DEBUG`, ...).
//!
//! ```toml
//! debug = false
//! admins = [10001000]
//!
//! [gateway]
//! host = "127.0.0.1"
//! port = 6700
//!
//! [storage]
//! data_dir = "./bot_data"
//! autosave_secs = 10
//!
//! [logging]
//! directive = "ingot=debug,info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Extract(#[from] figment::Error),
}

/// Connection parameters for the messaging gateway adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token expected by the gateway, if it requires one.
    pub access_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 6700,
            access_token: None,
        }
    }
}

/// Persistent storage locations and the auto-save debounce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the key-value document and module file scopes.
    pub data_dir: PathBuf,
    /// Key-value document file name, relative to `data_dir`.
    pub file: PathBuf,
    /// Debounce interval for the coalesced auto-save.
    pub autosave_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            file: PathBuf::from("storage.json"),
            autosave_secs: 10,
        }
    }
}

/// Logging options consumed by [`logging`](crate::logging).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"ingot=debug,info"`.
    pub directive: String,
    /// Mirror log output into this file, if set.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directive: "info".to_owned(),
            file: None,
        }
    }
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub gateway: GatewayConfig,
    /// Debug sandbox mode; see the bus documentation.
    pub debug: bool,
    /// Account ids allowed to drive the admin module.
    pub admins: Vec<i64>,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl BotConfig {
    /// Loads `bot.toml` from the working directory plus the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("bot.toml")
    }

    /// Loads the given TOML file (which may be absent) plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Figment::from(Serialized::defaults(BotConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BOT_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Full path of the key-value storage document.
    pub fn storage_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.file)
    }

    /// Root directory of module file scopes.
    pub fn files_root(&self) -> PathBuf {
        self.storage.data_dir.join("files")
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.storage.autosave_secs)
    }
}
