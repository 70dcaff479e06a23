//! Tower middleware stages for RPC calls.
//!
//! - [`trace`]: `traceparent` continuation and the `rpc.server` span
//! - [`bind`]: Binds the request-scoped logger into the call context
//! - [`access_log`]: Begin/end events with elapsed time and outcome code
//! - [`recovery`]: Converts handler panics into `Internal` statuses
//! - [`metrics`]: Prometheus-style counters and latency histogram
//! - [`timeout`]: Per-call deadline on the handler's context
//! - [`payload`]: Optional debug logging of request and response messages
//! - [`pipeline`]: Ordered stage lists wrapping a handler

pub mod access_log;
pub mod bind;
pub mod metrics;
pub mod payload;
pub mod pipeline;
pub mod recovery;
pub mod timeout;
pub mod trace;

pub use access_log::AccessLogLayer;
pub use bind::BindLoggerLayer;
pub use metrics::MetricsLayer;
pub use payload::{payload_logging, PayloadLogLayer};
pub use pipeline::{
    boxed_stage, BoxRpcService, BoxStage, Pipeline, StageKind, StreamPipeline, UnaryPipeline,
};
pub use recovery::RecoveryLayer;
pub use timeout::TimeoutLayer;
pub use trace::TraceContextLayer;
