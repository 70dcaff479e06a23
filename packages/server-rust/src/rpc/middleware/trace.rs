//! Trace-context stage.
//!
//! Continues the caller's trace when the call metadata carries a valid
//! `traceparent`, otherwise starts a new root trace. The resulting span context is
//! installed in the call's [`RequestContext`](reqlog_core::RequestContext) and the
//! inner future runs inside an `rpc.server` tracing span.

use std::task::{Context, Poll};

use reqlog_core::trace::TRACEPARENT_HEADER;
use reqlog_core::{with_span_context, SpanContext};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::rpc::call::{Call, MethodPath, RpcFuture};
use crate::rpc::status::Status;

/// Parses the `traceparent` entry of `metadata`, ignoring malformed values.
pub(crate) fn remote_parent(metadata: &http::HeaderMap) -> Option<SpanContext> {
    metadata
        .get(TRACEPARENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Span for the local side of a call: a child of `remote` or a new root.
pub(crate) fn local_span(remote: Option<SpanContext>) -> SpanContext {
    remote.map_or_else(SpanContext::new_root, |parent| parent.child())
}

// ---------------------------------------------------------------------------
// TraceContextLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextLayer;

impl<S> Layer<S> for TraceContextLayer {
    type Service = TraceContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceContextService { inner }
    }
}

// ---------------------------------------------------------------------------
// TraceContextService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TraceContextService<S> {
    inner: S,
}

impl<S, T> Service<Call<T>> for TraceContextService<S>
where
    S: Service<Call<T>, Error = Status> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = Status;
    type Future = RpcFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: Call<T>) -> Self::Future {
        let remote = remote_parent(&call.metadata);
        let span_ctx = local_span(remote);
        call.ctx = with_span_context(&call.ctx, span_ctx);

        let MethodPath { service, method } = call.method_path();
        let span = info_span!(
            "rpc.server",
            rpc.service = %service,
            rpc.method = %method,
            trace_id = %span_ctx.trace_id,
            span_id = %span_ctx.span_id,
            remote_parent = remote.is_some(),
        );

        Box::pin(self.inner.call(call).instrument(span))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};
    use reqlog_core::active_span;
    use tower::ServiceExt;

    use super::*;

    const REMOTE: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn observe_span() -> impl Service<Call<()>, Response = Option<SpanContext>, Error = Status> {
        TraceContextLayer.layer(tower::service_fn(|call: Call<()>| {
            Box::pin(async move { Ok(active_span(&call.ctx)) }) as RpcFuture<_>
        }))
    }

    fn with_traceparent(value: &'static str) -> Call<()> {
        let mut metadata = HeaderMap::new();
        metadata.insert(TRACEPARENT_HEADER, HeaderValue::from_static(value));
        Call::new("/s.S/M", ()).with_metadata(metadata)
    }

    #[tokio::test]
    async fn continues_remote_trace_with_fresh_span() {
        let remote: SpanContext = REMOTE.parse().unwrap();
        let span = observe_span()
            .oneshot(with_traceparent(REMOTE))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(span.trace_id, remote.trace_id);
        assert_ne!(span.span_id, remote.span_id);
        assert!(span.has_span_id());
        assert!(span.sampled);
    }

    #[tokio::test]
    async fn starts_root_trace_without_header() {
        let span = observe_span()
            .oneshot(Call::new("/s.S/M", ()))
            .await
            .unwrap()
            .unwrap();
        assert!(span.has_trace_id());
        assert!(span.has_span_id());
    }

    #[tokio::test]
    async fn malformed_header_starts_root_trace() {
        let span = observe_span()
            .oneshot(with_traceparent("00-not-a-trace-01"))
            .await
            .unwrap()
            .unwrap();
        assert!(span.has_trace_id());
        assert_ne!(span.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[test]
    fn remote_parent_reads_metadata() {
        let call = with_traceparent(REMOTE);
        assert_eq!(remote_parent(&call.metadata), Some(REMOTE.parse().unwrap()));
        assert_eq!(remote_parent(&HeaderMap::new()), None);
    }
}
