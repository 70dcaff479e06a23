//! Process-level diagnostics: the `tracing` subscriber and the Prometheus exporter.

use std::net::SocketAddr;
use std::str::FromStr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
    #[error("failed to install prometheus exporter: {0}")]
    Metrics(#[from] BuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Installs the global `tracing` subscriber, filtered by `RUST_LOG`.
///
/// # Errors
///
/// Returns [`ObservabilityError::Subscriber`] when a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), ObservabilityError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| ObservabilityError::Subscriber(err.to_string()))
}

/// Installs the global metrics recorder and serves the Prometheus exposition on `addr`.
///
/// # Errors
///
/// Returns [`ObservabilityError::Metrics`] when the listener cannot be bound or a
/// global recorder is already installed.
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<(), ObservabilityError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn second_subscriber_install_fails() {
        let _ = init_tracing(LogFormat::Json);
        assert!(matches!(
            init_tracing(LogFormat::Pretty),
            Err(ObservabilityError::Subscriber(_))
        ));
    }
}
