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
    pub pipeline: PipelineConfig,
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
        let include_targets = env::var("APP_LOG_TARGETS")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let sweep_log_level = env::var("RISK_SWEEP_LOG_LEVEL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let policy_path = env::var("RISK_POLICY_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let sweep_interval_secs = numeric_var("RISK_SWEEP_INTERVAL_SECS", 3600)?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "RISK_SWEEP_INTERVAL_SECS",
            });
        }
        let sweep_concurrency = numeric_var("RISK_SWEEP_CONCURRENCY", 8)?.max(1) as usize;
        let feed_timeout_ms = numeric_var("RISK_FEED_TIMEOUT_MS", 5000)?;
        if feed_timeout_ms == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "RISK_FEED_TIMEOUT_MS",
            });
        }
        let fulfillment_timeout_ms = numeric_var("RISK_FULFILLMENT_TIMEOUT_MS", 10_000)?;
        if fulfillment_timeout_ms == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "RISK_FULFILLMENT_TIMEOUT_MS",
            });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                include_targets,
                sweep_log_level,
            },
            pipeline: PipelineConfig {
                policy_path,
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                sweep_concurrency,
                feed_timeout: Duration::from_millis(feed_timeout_ms),
                fulfillment_timeout: Duration::from_millis(fulfillment_timeout_ms),
            },
        })
    }
}

fn numeric_var(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
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
    pub include_targets: bool,
    /// Separate level for the monitoring sweep, e.g. `debug` while chasing a stuck order.
    pub sweep_log_level: Option<String>,
}

/// Where merchant policies come from and how often the monitoring sweep runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// JSON file holding the merchant policy registry; built-in defaults when unset.
    pub policy_path: Option<PathBuf>,
    pub sweep_interval: Duration,
    pub sweep_concurrency: usize,
    /// Upper bound on one dispute-feed poll during a sweep.
    pub feed_timeout: Duration,
    /// Upper bound on one fulfillment lookup while building dispute evidence.
    pub fulfillment_timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a positive whole number")
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
