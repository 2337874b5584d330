//! Runtime configuration for the high-score core.
//!
//! # Responsibility
//! - Describe where the preference database lives and which store to use.
//! - Resolve settings from `UNSCRAMBLE_*` environment variables.
//!
//! # Invariants
//! - A built config always carries a valid store name and log level.

use crate::logging::{default_log_level, normalize_level};
use crate::repo::high_score_repo::normalize_store_name;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_DB_FILE_NAME: &str = "unscramble.sqlite3";
pub const DEFAULT_STORE_NAME: &str = "unscramble_datastore";
pub const DEFAULT_LEGACY_STORE_NAME: &str = "GameActivity";

pub const ENV_DB_PATH: &str = "UNSCRAMBLE_DB_PATH";
pub const ENV_STORE_NAME: &str = "UNSCRAMBLE_STORE_NAME";
pub const ENV_LEGACY_STORE: &str = "UNSCRAMBLE_LEGACY_STORE";
pub const ENV_LOG_LEVEL: &str = "UNSCRAMBLE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "UNSCRAMBLE_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidStoreName { var: &'static str, value: String },
    InvalidLogLevel(String),
    EmptyValue(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStoreName { var, value } => {
                write!(f, "{var}: invalid store name `{value}`")
            }
            Self::InvalidLogLevel(message) => write!(f, "{ENV_LOG_LEVEL}: {message}"),
            Self::EmptyValue(var) => write!(f, "{var} is set but empty"),
        }
    }
}

impl Error for ConfigError {}

/// Location and naming of the persisted high-score store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub store_name: String,
    /// Store to import a legacy high score from on open; `None` skips it.
    pub legacy_store_name: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            store_name: DEFAULT_STORE_NAME.to_string(),
            legacy_store_name: Some(DEFAULT_LEGACY_STORE_NAME.to_string()),
        }
    }
}

/// Whole-process settings: store plus logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub store: StoreConfig,
    pub log_level: &'static str,
    /// File logging is skipped when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    ///
    /// Unset variables keep defaults. `UNSCRAMBLE_LEGACY_STORE=none` disables
    /// the legacy import.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DB_PATH) {
            config.store.db_path = PathBuf::from(non_empty(ENV_DB_PATH, &raw)?);
        }
        if let Some(raw) = lookup(ENV_STORE_NAME) {
            config.store.store_name = store_name(ENV_STORE_NAME, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LEGACY_STORE) {
            config.store.legacy_store_name = if raw.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(store_name(ENV_LEGACY_STORE, &raw)?)
            };
        }
        if let Some(raw) = lookup(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&raw).map_err(ConfigError::InvalidLogLevel)?;
        }
        if let Some(raw) = lookup(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(non_empty(ENV_LOG_DIR, &raw)?));
        }

        Ok(config)
    }
}

fn non_empty<'a>(var: &'static str, raw: &'a str) -> Result<&'a str, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyValue(var));
    }
    Ok(trimmed)
}

fn store_name(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    normalize_store_name(raw).map_err(|_| ConfigError::InvalidStoreName {
        var,
        value: raw.to_string(),
    })
}
