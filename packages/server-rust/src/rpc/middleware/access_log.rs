//! Access-log stage: begin/end events per call with method identity, elapsed time
//! and outcome code.
//!
//! The end event is only written when the inner future completes. A panic below
//! this stage skips it unless a recovery stage sits between the two.

use std::task::{Context, Poll};
use std::time::Instant;

use reqlog_core::{retrieve, Field};
use tower::{Layer, Service};

use crate::rpc::call::{Call, MethodPath, RpcFuture};
use crate::rpc::status::{Code, Status};

// ---------------------------------------------------------------------------
// AccessLogLayer
// ---------------------------------------------------------------------------

/// Tower layer logging through the logger bound by the binding stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogLayer;

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

// ---------------------------------------------------------------------------
// AccessLogService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S, T> Service<Call<T>> for AccessLogService<S>
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
        let logger = retrieve(&call.ctx);
        let MethodPath { service, method } = call.method_path();

        logger.info(
            format!("begin request: {service}/{method}"),
            &[
                Field::string("service", service.clone()),
                Field::string("method", method.clone()),
            ],
        );

        let start = Instant::now();
        let fut = self.inner.call(call);

        Box::pin(async move {
            let result = fut.await;
            let elapsed = start.elapsed();
            let code = Code::of(&result);

            logger.info(
                format!("end request: {elapsed:?}"),
                &[
                    Field::duration("elapsed", elapsed),
                    Field::string("service", service),
                    Field::string("method", method),
                    Field::string("code", code.as_str()),
                ],
            );

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

    use reqlog_core::{bind, Level, Logger, ObservedLogs, ObservedSink, RequestContext, Value};
    use tower::ServiceExt;

    use super::*;

    fn bound_call(method: &str) -> (Call<()>, ObservedLogs) {
        let (sink, logs) = ObservedSink::new(Level::Debug);
        let logger = Logger::new(Arc::new(sink));
        let ctx = bind(&RequestContext::background(), &logger);
        (Call::new(method, ()).with_context(ctx), logs)
    }

    fn text<'a>(entry: &'a reqlog_core::LoggedEntry, key: &str) -> Option<&'a str> {
        entry.field(key).and_then(Value::as_str)
    }

    #[tokio::test]
    async fn logs_begin_and_end_with_method_identity() {
        let (call, logs) = bound_call("/example.Service/DoThing");
        let svc = AccessLogLayer.layer(tower::service_fn(|_call: Call<()>| async {
            Ok::<_, Status>("done")
        }));

        assert_eq!(svc.oneshot(call).await.unwrap(), "done");

        let all = logs.all();
        assert_eq!(all.len(), 2);

        let begin = &all[0];
        assert_eq!(begin.entry.level, Level::Info);
        assert_eq!(begin.entry.message, "begin request: example.Service/DoThing");
        assert_eq!(text(begin, "service"), Some("example.Service"));
        assert_eq!(text(begin, "method"), Some("DoThing"));

        let end = &all[1];
        assert_eq!(end.entry.level, Level::Info);
        assert!(end.entry.message.starts_with("end request: "));
        assert_eq!(text(end, "service"), Some("example.Service"));
        assert_eq!(text(end, "method"), Some("DoThing"));
        assert_eq!(text(end, "code"), Some("OK"));
        assert!(matches!(end.field("elapsed"), Some(Value::Duration(_))));
    }

    #[tokio::test]
    async fn end_event_carries_error_code() {
        let (call, logs) = bound_call("/example.Service/Fail");
        let svc = AccessLogLayer.layer(tower::service_fn(|_call: Call<()>| async {
            Err::<(), _>(Status::not_found("no such thing"))
        }));

        let err = svc.oneshot(call).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);

        let end = logs.filter_message_prefix("end request");
        assert_eq!(end.len(), 1);
        assert_eq!(text(&end[0], "code"), Some("NotFound"));
    }

    #[tokio::test]
    async fn elapsed_covers_handler_time() {
        let (call, logs) = bound_call("/s.S/Slow");
        let svc = AccessLogLayer.layer(tower::service_fn(|_call: Call<()>| async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<_, Status>(())
        }));

        svc.oneshot(call).await.unwrap();

        let end = logs.filter_message_prefix("end request");
        let Some(Value::Duration(elapsed)) = end[0].field("elapsed") else {
            panic!("missing elapsed field");
        };
        assert!(*elapsed >= std::time::Duration::from_millis(20));
    }
}
