//! Deadline stage for unary calls.
//!
//! The handler receives a child context that expires after the configured
//! duration. The stage never abandons the handler: it awaits the result and lets
//! the handler decide how to react to expiry. The child context is released when the
//! call finishes, whether it succeeds, fails or the future is dropped.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::rpc::call::{Call, RpcFuture};
use crate::rpc::status::Status;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S, T> Service<Call<T>> for TimeoutService<S>
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
        let (ctx, guard) = call.ctx.with_timeout(self.timeout);
        call.ctx = ctx;
        let fut = self.inner.call(call);

        Box::pin(async move {
            let result = fut.await;
            guard.release();
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use reqlog_core::{ContextError, RequestContext};
    use tokio::time::Instant;
    use tower::ServiceExt;

    use super::*;
    use crate::rpc::status::Code;

    #[tokio::test(start_paused = true)]
    async fn handler_observes_deadline() {
        let svc = TimeoutLayer::new(Duration::from_millis(100)).layer(tower::service_fn(
            |call: Call<()>| async move {
                let start = Instant::now();
                tokio::select! {
                    () = call.ctx.done() => {}
                    () = tokio::time::sleep(Duration::from_millis(500)) => {}
                }
                match call.ctx.err() {
                    Some(err) => Err::<Duration, _>(Status::from(err)),
                    None => Ok(start.elapsed()),
                }
            },
        ));

        let start = Instant::now();
        let err = svc.oneshot(Call::new("/s.S/Slow", ())).await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(105));
    }

    #[tokio::test(start_paused = true)]
    async fn handler_may_ignore_expiry() {
        let svc = TimeoutLayer::new(Duration::from_millis(10)).layer(tower::service_fn(
            |_call: Call<()>| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, Status>("late but fine")
            },
        ));

        assert_eq!(svc.oneshot(Call::new("/s.S/M", ())).await.unwrap(), "late but fine");
    }

    #[tokio::test]
    async fn child_context_is_released_after_completion() {
        let seen: Arc<Mutex<Option<RequestContext>>> = Arc::default();
        let captured = seen.clone();
        let svc = TimeoutLayer::new(Duration::from_secs(60)).layer(tower::service_fn(
            move |call: Call<()>| {
                let captured = captured.clone();
                async move {
                    assert!(call.ctx.err().is_none());
                    *captured.lock() = Some(call.ctx);
                    Ok::<_, Status>(())
                }
            },
        ));

        svc.oneshot(Call::new("/s.S/M", ())).await.unwrap();

        let ctx = seen.lock().take().unwrap();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn parent_context_is_untouched() {
        let parent = RequestContext::background();
        let svc = TimeoutLayer::new(Duration::from_millis(5)).layer(tower::service_fn(
            |_call: Call<()>| async { Ok::<_, Status>(()) },
        ));

        svc.oneshot(Call::new("/s.S/M", ()).with_context(parent.clone()))
            .await
            .unwrap();
        assert!(parent.err().is_none());
        assert!(parent.deadline().is_none());
    }
}
