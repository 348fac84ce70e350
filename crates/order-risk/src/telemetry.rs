use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

const SWEEP_TARGET: &str = "order_risk::monitoring";

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{}'", value)
            }
            TelemetryError::Subscriber(err) => write!(f, "subscriber already installed: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured levels.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(config)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_targets)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Base level plus the optional monitoring-sweep override.
pub(crate) fn filter_directives(config: &TelemetryConfig) -> String {
    match &config.sweep_log_level {
        Some(level) => format!("{},{SWEEP_TARGET}={level}", config.log_level),
        None => config.log_level.clone(),
    }
}

pub(crate) fn configured_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    let directives = filter_directives(config);
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
        value: directives,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str, sweep: Option<&str>) -> TelemetryConfig {
        TelemetryConfig {
            log_level: level.to_string(),
            include_targets: false,
            sweep_log_level: sweep.map(str::to_string),
        }
    }

    #[test]
    fn sweep_override_scopes_to_monitoring() {
        assert_eq!(filter_directives(&config("info", None)), "info");
        assert_eq!(
            filter_directives(&config("warn", Some("debug"))),
            "warn,order_risk::monitoring=debug"
        );
        assert!(configured_filter(&config("warn", Some("debug"))).is_ok());
    }

    #[test]
    fn unknown_sweep_level_is_rejected() {
        match configured_filter(&config("info", Some("chatty"))) {
            Err(TelemetryError::EnvFilter { value, .. }) => {
                assert_eq!(value, "info,order_risk::monitoring=chatty");
            }
            other => panic!("expected filter error, got {other:?}"),
        }
    }
}
