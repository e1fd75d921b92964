use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub search: SearchConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            search: SearchConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Tuning for the search pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Results needed before the relaxation ladder stops.
    pub min_results: usize,
    /// Cap on candidates returned by one atomic search.
    pub candidate_limit: usize,
    /// Blocked units above which the executor switches to chunked scans.
    pub blocked_safety_cap: usize,
    pub chunk_size: usize,
    /// Per round trip, not per request.
    pub index_timeout: Duration,
    /// Longest stay accepted, in nights.
    pub max_stay_nights: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_results: 5,
            candidate_limit: 500,
            blocked_safety_cap: 10_000,
            chunk_size: 256,
            index_timeout: Duration::from_millis(250),
            max_stay_nights: 365,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            min_results: env_number("SEARCH_MIN_RESULTS", defaults.min_results)?,
            candidate_limit: env_number("SEARCH_CANDIDATE_LIMIT", defaults.candidate_limit)?,
            blocked_safety_cap: env_number(
                "SEARCH_BLOCKED_SAFETY_CAP",
                defaults.blocked_safety_cap,
            )?,
            chunk_size: env_number("SEARCH_CHUNK_SIZE", defaults.chunk_size)?,
            index_timeout: Duration::from_millis(env_number(
                "SEARCH_INDEX_TIMEOUT_MS",
                defaults.index_timeout.as_millis() as u64,
            )?),
            max_stay_nights: env_number("SEARCH_MAX_STAY_NIGHTS", defaults.max_stay_nights)?,
            default_page_size: env_number("SEARCH_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: env_number("SEARCH_MAX_PAGE_SIZE", defaults.max_page_size)?,
        })
    }
}

fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "SEARCH_MIN_RESULTS",
            "SEARCH_CANDIDATE_LIMIT",
            "SEARCH_BLOCKED_SAFETY_CAP",
            "SEARCH_CHUNK_SIZE",
            "SEARCH_INDEX_TIMEOUT_MS",
            "SEARCH_MAX_STAY_NIGHTS",
            "SEARCH_DEFAULT_PAGE_SIZE",
            "SEARCH_MAX_PAGE_SIZE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.search, SearchConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn search_overrides_are_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SEARCH_MIN_RESULTS", "3");
        env::set_var("SEARCH_INDEX_TIMEOUT_MS", "75");
        env::set_var("SEARCH_BLOCKED_SAFETY_CAP", "42");
        env::set_var("SEARCH_MAX_STAY_NIGHTS", "30");
        let config = SearchConfig::from_env().expect("search config loads");
        assert_eq!(config.min_results, 3);
        assert_eq!(config.index_timeout, Duration::from_millis(75));
        assert_eq!(config.blocked_safety_cap, 42);
        assert_eq!(config.max_stay_nights, 30);
        assert_eq!(config.candidate_limit, 500);
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_search_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SEARCH_CHUNK_SIZE", "lots");
        match SearchConfig::from_env() {
            Err(ConfigError::InvalidNumber { key }) => assert_eq!(key, "SEARCH_CHUNK_SIZE"),
            other => panic!("expected invalid number, got {other:?}"),
        }
        reset_env();
    }
}
