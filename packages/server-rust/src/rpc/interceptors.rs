//! Composition of the server-side interceptor pipelines.
//!
//! Both pipelines run their stages in the same fixed order:
//!
//! 1. trace context (when `with_tracing`)
//! 2. logger binding
//! 3. access log
//! 4. panic recovery (when `with_panic_recovery`)
//! 5. metrics (when `with_metrics`)
//! 6. deadline (unary only, when `unary_timeout` is non-zero)
//! 7. caller-supplied stages, in the order given

use std::fmt;
use std::time::Duration;

use reqlog_core::Logger;

use super::middleware::{
    AccessLogLayer, BindLoggerLayer, BoxStage, MetricsLayer, Pipeline, RecoveryLayer, StageKind,
    StreamPipeline, TimeoutLayer, TraceContextLayer, UnaryPipeline,
};

/// Options for [`compose_interceptors`].
///
/// `Req`/`Resp` are the unary message types and `St` the server-stream handle.
pub struct ServerInterceptorsOptions<Req, Resp, St> {
    pub logger: Logger,
    pub with_panic_recovery: bool,
    pub with_metrics: bool,
    pub with_tracing: bool,
    /// Zero disables the deadline stage.
    pub unary_timeout: Duration,
    pub additional_unary: Vec<BoxStage<Req, Resp>>,
    pub additional_stream: Vec<BoxStage<St, ()>>,
}

impl<Req, Resp, St> ServerInterceptorsOptions<Req, Resp, St> {
    /// Options with every optional stage disabled.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            with_panic_recovery: false,
            with_metrics: false,
            with_tracing: false,
            unary_timeout: Duration::ZERO,
            additional_unary: Vec::new(),
            additional_stream: Vec::new(),
        }
    }
}

impl<Req, Resp, St> fmt::Debug for ServerInterceptorsOptions<Req, Resp, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInterceptorsOptions")
            .field("logger", &self.logger)
            .field("with_panic_recovery", &self.with_panic_recovery)
            .field("with_metrics", &self.with_metrics)
            .field("with_tracing", &self.with_tracing)
            .field("unary_timeout", &self.unary_timeout)
            .field("additional_unary", &self.additional_unary.len())
            .field("additional_stream", &self.additional_stream.len())
            .finish()
    }
}

/// Builds the unary and streaming pipelines described by `options`.
pub fn compose_interceptors<Req, Resp, St>(
    options: ServerInterceptorsOptions<Req, Resp, St>,
) -> (UnaryPipeline<Req, Resp>, StreamPipeline<St>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
    St: Send + 'static,
{
    let ServerInterceptorsOptions {
        logger,
        with_panic_recovery,
        with_metrics,
        with_tracing,
        unary_timeout,
        additional_unary,
        additional_stream,
    } = options;

    let mut unary = Pipeline::new();
    let mut stream = Pipeline::new();

    if with_tracing {
        unary.push(StageKind::Tracing, TraceContextLayer);
        stream.push(StageKind::Tracing, TraceContextLayer);
    }

    unary.push(StageKind::BindLogger, BindLoggerLayer::new(logger.clone()));
    stream.push(StageKind::BindLogger, BindLoggerLayer::new(logger));

    unary.push(StageKind::AccessLog, AccessLogLayer);
    stream.push(StageKind::AccessLog, AccessLogLayer);

    if with_panic_recovery {
        unary.push(StageKind::Recovery, RecoveryLayer);
        stream.push(StageKind::Recovery, RecoveryLayer);
    }

    if with_metrics {
        unary.push(StageKind::Metrics, MetricsLayer::unary());
        stream.push(StageKind::Metrics, MetricsLayer::stream());
    }

    if !unary_timeout.is_zero() {
        unary.push(StageKind::Timeout, TimeoutLayer::new(unary_timeout));
    }

    for stage in additional_unary {
        unary.push_boxed(StageKind::Custom, stage);
    }
    for stage in additional_stream {
        stream.push_boxed(StageKind::Custom, stage);
    }

    tracing::debug!(
        unary = ?unary,
        stream = ?stream,
        "composed server interceptors"
    );

    (unary, stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
