//! Logger configuration and construction of the base logger.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqlog_core::level::ParseLevelError;
use reqlog_core::{Field, JsonSink, Level, Logger, Sink, TracingSink};
use serde::{Deserialize, Serialize};

use crate::webhook::message::DEFAULT_NOTIFY_TIMEOUT;
use crate::webhook::{wrapper_with_notifier, HttpNotifier, Notifier};

pub const ENV_VAR: &str = "REQLOG_ENV";
pub const SERVICE_VAR: &str = "REQLOG_SERVICE";
pub const LEVEL_VAR: &str = "REQLOG_LEVEL";
pub const WEBHOOK_URL_VAR: &str = "REQLOG_WEBHOOK_URL";
pub const WEBHOOK_LEVEL_VAR: &str = "REQLOG_WEBHOOK_LEVEL";

/// Base field naming the emitting service.
pub const SERVICE_NAME_KEY: &str = "serviceName";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown environment {0:?}, expected \"development\" or \"production\"")]
    InvalidEnvironment(String),
    #[error("invalid {var}: {source}")]
    InvalidLevel {
        var: &'static str,
        #[source]
        source: ParseLevelError,
    },
    #[error("invalid webhook url {url:?}: {reason}")]
    InvalidWebhookUrl { url: String, reason: String },
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Human-oriented output through `tracing`, debug and above.
    Development,
    /// JSON lines on stdout, info and above.
    #[default]
    Production,
}

impl Environment {
    #[must_use]
    pub fn default_level(self) -> Level {
        match self {
            Environment::Development => Level::Debug,
            Environment::Production => Level::Info,
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Webhook notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    /// Entries at or above this level are posted.
    pub min_level: Level,
    /// Per-delivery request timeout.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_level: Level::Error,
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub environment: Environment,
    pub service_name: String,
    /// Overrides the environment's default level.
    pub level: Option<Level>,
    pub webhook: Option<WebhookConfig>,
}

impl LoggerConfig {
    /// Reads the `REQLOG_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable holds an unrecognized value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    /// Unset and empty variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable holds an unrecognized value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let parse_level = |var: &'static str, value: &str| {
            value
                .parse::<Level>()
                .map_err(|source| ConfigError::InvalidLevel { var, source })
        };

        let mut config = LoggerConfig::default();
        if let Some(env) = get(ENV_VAR) {
            config.environment = env.parse()?;
        }
        if let Some(service) = get(SERVICE_VAR) {
            config.service_name = service;
        }
        if let Some(level) = get(LEVEL_VAR) {
            config.level = Some(parse_level(LEVEL_VAR, &level)?);
        }
        if let Some(url) = get(WEBHOOK_URL_VAR) {
            let mut webhook = WebhookConfig {
                url,
                ..WebhookConfig::default()
            };
            if let Some(level) = get(WEBHOOK_LEVEL_VAR) {
                webhook.min_level = parse_level(WEBHOOK_LEVEL_VAR, &level)?;
            }
            config.webhook = Some(webhook);
        }
        Ok(config)
    }

    /// Effective level of the local sink.
    #[must_use]
    pub fn effective_level(&self) -> Level {
        self.level.unwrap_or_else(|| self.environment.default_level())
    }
}

fn validate_webhook_url(url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidWebhookUrl {
        url: url.to_string(),
        reason,
    };
    let parsed = reqwest::Url::parse(url).map_err(|err| invalid(err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds the base logger for `config`: a local sink chosen by environment,
/// decorated with webhook delivery when configured, carrying `serviceName`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidWebhookUrl`] for an unusable webhook URL.
pub fn build_logger(config: &LoggerConfig) -> Result<Logger, ConfigError> {
    let level = config.effective_level();
    let local: Arc<dyn Sink> = match config.environment {
        Environment::Development => Arc::new(TracingSink::new(level)),
        Environment::Production => Arc::new(JsonSink::stdout(level)),
    };
    let timeout = config
        .webhook
        .as_ref()
        .map_or(DEFAULT_NOTIFY_TIMEOUT, |webhook| webhook.timeout);
    build_logger_with(config, local, Arc::new(HttpNotifier::new(timeout)))
}

/// Like [`build_logger`], over a caller-supplied local sink and notifier.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidWebhookUrl`] for an unusable webhook URL.
pub fn build_logger_with(
    config: &LoggerConfig,
    local: Arc<dyn Sink>,
    notifier: Arc<dyn Notifier>,
) -> Result<Logger, ConfigError> {
    let sink = match &config.webhook {
        Some(webhook) => {
            validate_webhook_url(&webhook.url)?;
            let wrap = wrapper_with_notifier(webhook.url.as_str(), webhook.min_level, notifier);
            wrap(local)
        }
        None => local,
    };

    tracing::debug!(
        environment = ?config.environment,
        level = %config.effective_level(),
        webhook = config.webhook.is_some(),
        "built base logger"
    );

    Ok(Logger::new(sink).with(&[Field::string(SERVICE_NAME_KEY, config.service_name.clone())]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;
    use reqlog_core::{ObservedSink, Value};

    use super::*;
    use crate::webhook::{NotifyError, WebhookMessage};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[derive(Default)]
    struct CountingNotifier {
        posts: Mutex<usize>,
    }

    impl Notifier for CountingNotifier {
        fn post(&self, _url: &str, _message: &WebhookMessage) -> Result<(), NotifyError> {
            *self.posts.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn defaults_are_production_without_webhook() {
        let config = LoggerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LoggerConfig::default());
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.effective_level(), Level::Info);
    }

    #[test]
    fn reads_all_variables() {
        let config = LoggerConfig::from_lookup(lookup(&[
            (ENV_VAR, "development"),
            (SERVICE_VAR, "billing"),
            (LEVEL_VAR, "warn"),
            (WEBHOOK_URL_VAR, "https://hooks.example.test/abc"),
            (WEBHOOK_LEVEL_VAR, "critical"),
        ]))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.service_name, "billing");
        assert_eq!(config.effective_level(), Level::Warn);
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url, "https://hooks.example.test/abc");
        assert_eq!(webhook.min_level, Level::Fatal);
        assert_eq!(webhook.timeout, DEFAULT_NOTIFY_TIMEOUT);
    }

    #[test]
    fn empty_variables_keep_defaults() {
        let config =
            LoggerConfig::from_lookup(lookup(&[(ENV_VAR, " "), (WEBHOOK_URL_VAR, "")])).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.webhook.is_none());
    }

    #[test]
    fn rejects_unknown_values() {
        let err = LoggerConfig::from_lookup(lookup(&[(ENV_VAR, "staging")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvironment(ref env) if env == "staging"));

        let err = LoggerConfig::from_lookup(lookup(&[(LEVEL_VAR, "loud")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel { var: LEVEL_VAR, .. }));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: LoggerConfig = serde_json::from_value(serde_json::json!({
            "environment": "development",
            "service_name": "search",
            "webhook": { "url": "http://localhost:9000/hook" }
        }))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.level, None);
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.min_level, Level::Error);
        assert_eq!(webhook.timeout, DEFAULT_NOTIFY_TIMEOUT);
    }

    #[test]
    fn environment_selects_default_level() {
        let dev = LoggerConfig {
            environment: Environment::Development,
            ..LoggerConfig::default()
        };
        assert!(build_logger(&dev).unwrap().enabled(Level::Debug));

        let prod = build_logger(&LoggerConfig::default()).unwrap();
        assert!(!prod.enabled(Level::Debug));
        assert!(prod.enabled(Level::Info));
    }

    #[test]
    fn base_logger_carries_service_name() {
        let config = LoggerConfig {
            service_name: "orders".to_string(),
            ..LoggerConfig::default()
        };
        let logger = build_logger(&config).unwrap();
        assert_eq!(
            logger.field(SERVICE_NAME_KEY).and_then(Value::as_str),
            Some("orders")
        );
    }

    #[test]
    fn webhook_decorates_local_sink() {
        let config = LoggerConfig {
            webhook: Some(WebhookConfig {
                url: "https://hooks.example.test/abc".to_string(),
                min_level: Level::Warn,
                ..WebhookConfig::default()
            }),
            ..LoggerConfig::default()
        };
        let (local, logs) = ObservedSink::new(Level::Info);
        let notifier = Arc::new(CountingNotifier::default());
        let logger = build_logger_with(&config, Arc::new(local), notifier.clone()).unwrap();

        logger.info("fine", &[]);
        logger.error("not fine", &[]);

        assert_eq!(*notifier.posts.lock(), 1);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs.all()[1].count_field(SERVICE_NAME_KEY), 1);
    }

    #[test]
    fn invalid_webhook_url_is_rejected() {
        for url in ["not a url", "ftp://hooks.example.test/abc"] {
            let config = LoggerConfig {
                webhook: Some(WebhookConfig {
                    url: url.to_string(),
                    ..WebhookConfig::default()
                }),
                ..LoggerConfig::default()
            };
            let err = build_logger(&config).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidWebhookUrl { .. }), "{url}");
        }
    }
}
