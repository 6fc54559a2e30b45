use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub storage: StorageKind,
    pub database_path: PathBuf,
    pub cache_namespace: String,
    pub bus_queue_capacity: usize,
    pub request_timeout: Duration,
    pub metrics_window_days: u32,
    pub ageing_threshold_days: u32,
    pub log_level: String,
    /// `.env` file that seeded the environment, if one was found.
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage: StorageKind::Memory,
            database_path: PathBuf::from("backlog.db"),
            cache_namespace: "backlog:".to_string(),
            bus_queue_capacity: 1024,
            request_timeout: Duration::from_millis(5000),
            metrics_window_days: 30,
            ageing_threshold_days: 30,
            log_level: "info".to_string(),
            env_file: None,
        }
    }
}

impl AppConfig {
    /// Reads the process environment after loading an optional `.env` file.
    /// Runs before logging is set up, so the loaded file is recorded in
    /// `env_file` for the caller to report.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().ok();
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.env_file = env_file;
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        };

        let http_addr = match read("BACKLOG_HTTP_ADDR") {
            Some((key, v)) => v.parse().map_err(|e| invalid(key, &v, e))?,
            None => defaults.http_addr,
        };
        let storage = match read("BACKLOG_STORAGE") {
            Some((key, v)) => match v.to_ascii_lowercase().as_str() {
                "memory" => StorageKind::Memory,
                "sqlite" => StorageKind::Sqlite,
                _ => return Err(invalid(key, &v, "expected memory or sqlite")),
            },
            None => defaults.storage,
        };
        let database_path = read("BACKLOG_DATABASE_PATH")
            .map(|(_, v)| PathBuf::from(v))
            .unwrap_or(defaults.database_path);
        let cache_namespace = read("BACKLOG_CACHE_NAMESPACE")
            .map(|(_, v)| v)
            .unwrap_or(defaults.cache_namespace);
        let bus_queue_capacity = match read("BACKLOG_BUS_QUEUE_CAPACITY") {
            Some((key, v)) => match v.parse::<usize>() {
                Ok(0) => return Err(invalid(key, &v, "must be at least 1")),
                Ok(n) => n,
                Err(e) => return Err(invalid(key, &v, e)),
            },
            None => defaults.bus_queue_capacity,
        };
        let request_timeout = match read("BACKLOG_REQUEST_TIMEOUT_MS") {
            Some((key, v)) => match v.parse::<u64>() {
                Ok(0) => return Err(invalid(key, &v, "must be at least 1")),
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => return Err(invalid(key, &v, e)),
            },
            None => defaults.request_timeout,
        };
        let metrics_window_days = match read("BACKLOG_METRICS_WINDOW_DAYS") {
            Some((key, v)) => v.parse().map_err(|e| invalid(key, &v, e))?,
            None => defaults.metrics_window_days,
        };
        let ageing_threshold_days = match read("BACKLOG_AGEING_THRESHOLD_DAYS") {
            Some((key, v)) => v.parse().map_err(|e| invalid(key, &v, e))?,
            None => defaults.ageing_threshold_days,
        };
        let log_level = read("BACKLOG_LOG_LEVEL")
            .map(|(_, v)| v)
            .unwrap_or(defaults.log_level);

        Ok(Self {
            http_addr,
            storage,
            database_path,
            cache_namespace,
            bus_queue_capacity,
            request_timeout,
            metrics_window_days,
            ageing_threshold_days,
            log_level,
            env_file: None,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
