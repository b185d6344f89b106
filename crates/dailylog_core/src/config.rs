//! Runtime configuration resolved from the environment.
//!
//! # Responsibility
//! - Resolve storage, logging and oracle settings with stable defaults.
//! - Keep lookups injectable so resolution is testable without touching the
//!   process environment.
//!
//! # Invariants
//! - `log_dir` is always absolute (required by `init_logging`).
//! - An absent API key is valid: the core runs, oracle calls fail cleanly.
//! - Process environment values win over `.env` file values.

use crate::logging::default_log_level;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

pub const ENV_DATA_DIR: &str = "DAILYLOG_DATA_DIR";
pub const ENV_DB_PATH: &str = "DAILYLOG_DB_PATH";
pub const ENV_LOG_DIR: &str = "DAILYLOG_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "DAILYLOG_LOG_LEVEL";
pub const ENV_ORACLE_API_KEY: &str = "DAILYLOG_ORACLE_API_KEY";
pub const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_ORACLE_URL: &str = "DAILYLOG_ORACLE_URL";
pub const ENV_ORACLE_MODEL: &str = "DAILYLOG_ORACLE_MODEL";
pub const ENV_ORACLE_TIMEOUT_SECS: &str = "DAILYLOG_ORACLE_TIMEOUT_SECS";

const ENV_FILE_NAME: &str = ".env";
const DEFAULT_DATA_DIR: &str = "data";
const DB_FILE_NAME: &str = "dailylog.sqlite3";
const LOG_DIR_NAME: &str = "logs";
const DEFAULT_ORACLE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_ORACLE_MODEL: &str = "groq/compound";
const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
    CurrentDir(String),
    EnvFile { path: PathBuf, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
            Self::CurrentDir(message) => write!(f, "cannot resolve current directory: {message}"),
            Self::EnvFile { path, message } => {
                write!(f, "cannot read env file {}: {message}", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

/// Oracle endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ORACLE_URL.to_string(),
            model: DEFAULT_ORACLE_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

impl OracleConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub oracle: OracleConfig,
}

impl AppConfig {
    /// Resolves configuration from process environment variables, falling
    /// back to a `.env` file in the current directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|err| ConfigError::CurrentDir(err.to_string()))?;
        Self::with_env_file(&cwd, |key| std::env::var(key).ok())
    }

    /// Resolves through `process` first, then `<base_dir>/.env` if present.
    pub fn with_env_file(
        base_dir: &Path,
        process: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = read_env_file(&base_dir.join(ENV_FILE_NAME))?;
        Self::from_lookup(base_dir, |key| {
            process(key).or_else(|| file.get(key).cloned())
        })
    }

    /// Resolves configuration through `lookup`, anchoring relative paths at
    /// `base_dir`. Blank values count as unset.
    pub fn from_lookup(
        base_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let absolute = |value: PathBuf| {
            if value.is_absolute() {
                value
            } else {
                base_dir.join(value)
            }
        };

        let data_dir = absolute(PathBuf::from(
            get(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        ));
        let db_path = get(ENV_DB_PATH)
            .map(PathBuf::from)
            .map(absolute)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));
        let log_dir = get(ENV_LOG_DIR)
            .map(PathBuf::from)
            .map(absolute)
            .unwrap_or_else(|| data_dir.join(LOG_DIR_NAME));
        let log_level = get(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string());

        let timeout = match get(ENV_ORACLE_TIMEOUT_SECS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_ORACLE_TIMEOUT_SECS,
                        value: raw,
                    })
                }
            },
            None => DEFAULT_ORACLE_TIMEOUT,
        };

        let oracle = OracleConfig {
            endpoint: get(ENV_ORACLE_URL).unwrap_or_else(|| DEFAULT_ORACLE_URL.to_string()),
            model: get(ENV_ORACLE_MODEL).unwrap_or_else(|| DEFAULT_ORACLE_MODEL.to_string()),
            api_key: get(ENV_ORACLE_API_KEY).or_else(|| get(ENV_GROQ_API_KEY)),
            timeout,
        };

        Ok(Self {
            db_path,
            log_dir,
            log_level,
            oracle,
        })
    }
}

/// Reads `KEY=VALUE` lines; a missing file is empty.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_env_file(&text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(err) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn parse_env_file(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
