//! `reqlog` server integration: RPC interceptor pipelines, the webhook sink, HTTP
//! request binding, configuration and process-level observability.

pub mod config;
pub mod http_logger;
pub mod observability;
pub mod rpc;
pub mod webhook;

pub use config::{build_logger, ConfigError, Environment, LoggerConfig, WebhookConfig};
pub use http_logger::{request_context, request_logger, HttpLoggerLayer};
pub use observability::{init_tracing, install_metrics_exporter, LogFormat};
pub use rpc::{compose_interceptors, Call, Code, ServerInterceptorsOptions, Status};
pub use webhook::{wrapper, WebhookSink};
