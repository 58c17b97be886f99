use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
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
    pub scoring: ScoringConfig,
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

        let scoring = ScoringConfig::load()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring,
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection settings for the external scoring service.
///
/// Credentials are mandatory: a run can never start without a reachable,
/// authenticated scoring backend, so a missing value fails startup instead
/// of surfacing mid-run.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ScoringConfig {
    fn load() -> Result<Self, ConfigError> {
        let endpoint = env::var("APP_SCORING_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingScoringEndpoint)?;

        let api_key = env::var("APP_SCORING_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingScoringApiKey)?;

        let timeout_secs = env::var("APP_SCORING_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidScoringTimeout)?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingScoringEndpoint,
    MissingScoringApiKey,
    InvalidScoringTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingScoringEndpoint => {
                write!(f, "APP_SCORING_URL must be set to the scoring service base URL")
            }
            ConfigError::MissingScoringApiKey => {
                write!(f, "APP_SCORING_API_KEY must be set to authenticate scoring calls")
            }
            ConfigError::InvalidScoringTimeout => {
                write!(f, "APP_SCORING_TIMEOUT_SECS must be a valid u64 of seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
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
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_SCORING_URL");
        env::remove_var("APP_SCORING_API_KEY");
        env::remove_var("APP_SCORING_TIMEOUT_SECS");
    }

    fn set_scoring_env() {
        env::set_var("APP_SCORING_URL", "http://scoring.internal/api/");
        env::set_var("APP_SCORING_API_KEY", "test-key");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_scoring_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.scoring.timeout, Duration::from_secs(30));
    }

    #[test]
    fn load_fails_fast_without_scoring_credentials() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        match AppConfig::load() {
            Err(ConfigError::MissingScoringEndpoint) => {}
            other => panic!("expected missing scoring endpoint, got {other:?}"),
        }

        env::set_var("APP_SCORING_URL", "http://scoring.internal");
        match AppConfig::load() {
            Err(ConfigError::MissingScoringApiKey) => {}
            other => panic!("expected missing scoring api key, got {other:?}"),
        }
    }

    #[test]
    fn scoring_endpoint_trailing_slash_is_trimmed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_scoring_env();
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.scoring.endpoint, "http://scoring.internal/api");
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        set_scoring_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }
}
