//! Panic-recovery stage.
//!
//! A panic raised while building or polling the inner future is caught, logged at
//! error severity through the request logger and answered with an `Internal` status
//! carrying no detail.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::task::{Context, Poll};

use futures_util::FutureExt;
use reqlog_core::{retrieve, RequestContext};
use tower::{Layer, Service};

use crate::rpc::call::{Call, RpcFuture};
use crate::rpc::status::Status;

// ---------------------------------------------------------------------------
// RecoveryLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryLayer;

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService { inner }
    }
}

// ---------------------------------------------------------------------------
// RecoveryService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

impl<S, T> Service<Call<T>> for RecoveryService<S>
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

    fn call(&mut self, call: Call<T>) -> Self::Future {
        let ctx = call.ctx.clone();
        let inner = &mut self.inner;
        let fut = match panic::catch_unwind(AssertUnwindSafe(move || inner.call(call))) {
            Ok(fut) => fut,
            Err(payload) => {
                let status = recover(&ctx, payload.as_ref());
                return Box::pin(async move { Err(status) });
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(recover(&ctx, payload.as_ref())),
            }
        })
    }
}

fn recover(ctx: &RequestContext, payload: &(dyn Any + Send)) -> Status {
    retrieve(ctx).error(format!("panic: {}", panic_message(payload)), &[]);
    Status::internal("")
}

/// Renders a panic payload. Payloads other than string types render as a placeholder.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqlog_core::{bind, Level, Logger, ObservedLogs, ObservedSink};
    use tower::ServiceExt;

    use super::*;
    use crate::rpc::status::Code;

    fn bound_call() -> (Call<u32>, ObservedLogs) {
        let (sink, logs) = ObservedSink::new(Level::Debug);
        let ctx = bind(&RequestContext::background(), &Logger::new(Arc::new(sink)));
        (Call::new("/s.S/M", 7).with_context(ctx), logs)
    }

    #[tokio::test]
    async fn async_panic_becomes_internal_status() {
        let (call, logs) = bound_call();
        let svc = RecoveryLayer.layer(tower::service_fn(|call: Call<u32>| async move {
            if call.message == 7 {
                panic!("database exploded: secret=hunter2");
            }
            Ok::<_, Status>(call.message)
        }));

        let err = svc.oneshot(call).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.message(), "");

        let errors = logs.filter_level(Level::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].entry.message, "panic: database exploded: secret=hunter2");
    }

    /// Service whose `call` panics before producing a future.
    #[derive(Clone)]
    struct PanicsOnCall;

    impl Service<Call<u32>> for PanicsOnCall {
        type Response = u32;
        type Error = Status;
        type Future = RpcFuture<u32>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, call: Call<u32>) -> Self::Future {
            panic!("bad request {}", call.message);
        }
    }

    #[tokio::test]
    async fn synchronous_panic_is_recovered() {
        let (call, logs) = bound_call();
        let svc = RecoveryLayer.layer(PanicsOnCall);

        let err = svc.oneshot(call).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(logs.filter_level(Level::Error)[0].entry.message, "panic: bad request 7");
    }

    #[tokio::test]
    async fn success_passes_through_untouched() {
        let (call, logs) = bound_call();
        let svc = RecoveryLayer.layer(tower::service_fn(|call: Call<u32>| async move {
            Ok::<_, Status>(call.message + 1)
        }));

        assert_eq!(svc.oneshot(call).await.unwrap(), 8);
        assert!(logs.is_empty());
    }

    #[test]
    fn panic_message_handles_payload_types() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
