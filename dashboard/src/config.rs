//! Configuration Management
//!
//! Provides application configuration as a singleton using `OnceLock`.
//! Configuration values are read from environment variables with sensible defaults.
//!
//! ## Configuration Variables
//!
//! - `DATABASE_URL`: SQLite database url (default: `sqlite://packages.db`)
//! - `BIND_ADDRESS`: HTTP server bind address (default: `127.0.0.1:8080`)
//! - `BASE_URL`: Prefix the dashboard is mounted under (default: `/`)
//! - `LOG_DIR`: Directory for daily rolling log files (default: unset, stdout only)
//! - `X86_MIRROR`: Local x86_64 mirror root, holding `<repo>.db` (default: unset)
//! - `LOONG_MIRROR`: Local loong64 mirror root, holding `<repo>/os/loong64/<repo>.db` (default: unset)

use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub base_url: String,
    pub log_dir: Option<String>,
    pub x86_mirror: Option<String>,
    pub loong_mirror: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://packages.db".to_string(),
            bind_address: "127.0.0.1:8080".to_string(),
            base_url: "/".to_string(),
            log_dir: None,
            x86_mirror: None,
            loong_mirror: None,
        }
    }
}

impl Config {
    /// Initialize the global config from the environment (can only be called once)
    pub fn init() -> &'static Config {
        CONFIG.get_or_init(|| Config::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Build a config from an arbitrary variable source, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            database_url: non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_address: non_empty("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            base_url: non_empty("BASE_URL")
                .map(|url| normalize_base_url(&url))
                .unwrap_or(defaults.base_url),
            log_dir: non_empty("LOG_DIR"),
            x86_mirror: non_empty("X86_MIRROR"),
            loong_mirror: non_empty("LOONG_MIRROR"),
        }
    }

    /// Mount the dashboard under `url`, normalized to `/prefix/`.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }
}

/// Ensure the base url starts and ends with a single `/`
pub(crate) fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
