use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Medguard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:8089";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "medgemma";
const DEFAULT_RETRIEVAL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 60_000;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medguard=info"
}

/// Get the application data directory
/// ~/Medguard/ on all platforms. `None` when no home directory can be resolved.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

/// Default location of the pattern table override.
pub fn default_patterns_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("patterns.json"))
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime configuration for the server and its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub ollama_url: String,
    pub model: String,
    /// Unset means the vector-search collaborator is unavailable.
    pub vector_url: Option<String>,
    /// Pattern table file. `None` means the built-in table.
    pub patterns_path: Option<PathBuf>,
    pub knowledge_path: Option<PathBuf>,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (environment, tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("MEDGUARD_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: "MEDGUARD_BIND",
            value: bind_raw.clone(),
        })?;

        let patterns_path = match lookup("MEDGUARD_PATTERNS") {
            Some(path) => Some(PathBuf::from(path)),
            None => default_patterns_path().filter(|p| p.exists()),
        };

        Ok(Self {
            bind,
            ollama_url: lookup("MEDGUARD_OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: lookup("MEDGUARD_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            vector_url: lookup("MEDGUARD_VECTOR_URL").filter(|u| !u.trim().is_empty()),
            patterns_path,
            knowledge_path: lookup("MEDGUARD_KNOWLEDGE").map(PathBuf::from),
            retrieval_timeout: millis(
                &lookup,
                "MEDGUARD_RETRIEVAL_TIMEOUT_MS",
                DEFAULT_RETRIEVAL_TIMEOUT_MS,
            )?,
            generation_timeout: millis(
                &lookup,
                "MEDGUARD_GENERATION_TIMEOUT_MS",
                DEFAULT_GENERATION_TIMEOUT_MS,
            )?,
        })
    }
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(Duration::from_millis(default)),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
    }
}
