use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
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
    pub hub: HubConfig,
    pub integrations_file: Option<PathBuf>,
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
        let log_format = LogFormat::from_str(&env::var("APP_LOG_FORMAT").unwrap_or_default());
        let integrations_file = env::var("HUB_INTEGRATIONS_FILE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            hub: HubConfig::from_env()?,
            integrations_file,
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
    pub log_format: LogFormat,
}

/// Line layout of the fmt subscriber. `pretty` is meant for local runs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Self::Full,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }
}

/// Operational limits applied to every connector call and composite run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub call_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub sync_concurrency: usize,
    pub campaign_concurrency: usize,
    pub campaign_deadline: Duration,
    pub sync_progress_interval: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(10_000),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            sync_concurrency: 8,
            campaign_concurrency: 4,
            campaign_deadline: Duration::from_secs(300),
            sync_progress_interval: 25,
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let call_timeout_ms = env_number("HUB_CALL_TIMEOUT_MS", 10_000u64)?;
        let retry_attempts = env_number("HUB_RETRY_ATTEMPTS", defaults.retry_attempts)?;
        let retry_backoff_ms = env_number("HUB_RETRY_BACKOFF_MS", 250u64)?;
        let sync_concurrency = env_number("HUB_SYNC_CONCURRENCY", defaults.sync_concurrency)?;
        let campaign_concurrency =
            env_number("HUB_CAMPAIGN_CONCURRENCY", defaults.campaign_concurrency)?;
        let campaign_deadline_secs = env_number("HUB_CAMPAIGN_DEADLINE_SECS", 300u64)?;
        let sync_progress_interval = env_number(
            "HUB_SYNC_PROGRESS_INTERVAL",
            defaults.sync_progress_interval,
        )?;

        if call_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                var: "HUB_CALL_TIMEOUT_MS",
            });
        }
        if campaign_deadline_secs == 0 {
            return Err(ConfigError::OutOfRange {
                var: "HUB_CAMPAIGN_DEADLINE_SECS",
            });
        }
        if retry_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                var: "HUB_RETRY_ATTEMPTS",
            });
        }
        if sync_concurrency == 0 {
            return Err(ConfigError::OutOfRange {
                var: "HUB_SYNC_CONCURRENCY",
            });
        }
        if campaign_concurrency == 0 {
            return Err(ConfigError::OutOfRange {
                var: "HUB_CAMPAIGN_CONCURRENCY",
            });
        }

        Ok(Self {
            call_timeout: Duration::from_millis(call_timeout_ms),
            retry_attempts,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            sync_concurrency,
            campaign_concurrency,
            campaign_deadline: Duration::from_secs(campaign_deadline_secs),
            sync_progress_interval,
        })
    }
}

fn env_number<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        _ => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    OutOfRange { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a non-negative integer")
            }
            ConfigError::OutOfRange { var } => write!(f, "{var} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}
