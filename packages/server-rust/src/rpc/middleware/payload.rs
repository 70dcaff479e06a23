//! Debug logging of request and response messages.
//!
//! Not part of the default pipeline; add it through the `additional_unary`
//! option with [`payload_logging`]. Must sit inside the logger-binding stage.

use std::task::{Context, Poll};

use reqlog_core::{retrieve, Field, Level, Logger};
use serde::Serialize;
use tower::{Layer, Service};

use super::pipeline::{boxed_stage, BoxStage};
use crate::rpc::call::{Call, RpcFuture};
use crate::rpc::status::Status;

pub const PAYLOAD_KEY: &str = "payload";

/// Caller-supplied stage logging JSON renderings of unary messages at debug.
#[must_use]
pub fn payload_logging<Req, Resp>() -> BoxStage<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    boxed_stage(PayloadLogLayer)
}

fn log_payload<M: Serialize>(logger: &Logger, message: &str, payload: &M) {
    if !logger.enabled(Level::Debug) {
        return;
    }
    match serde_json::to_string(payload) {
        Ok(body) => logger.debug(message, &[Field::string(PAYLOAD_KEY, body)]),
        Err(err) => logger.debug(message, &[Field::error(&err)]),
    }
}

// ---------------------------------------------------------------------------
// PayloadLogLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadLogLayer;

impl<S> Layer<S> for PayloadLogLayer {
    type Service = PayloadLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PayloadLogService { inner }
    }
}

// ---------------------------------------------------------------------------
// PayloadLogService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PayloadLogService<S> {
    inner: S,
}

impl<S, Req> Service<Call<Req>> for PayloadLogService<S>
where
    S: Service<Call<Req>, Error = Status> + Send,
    S::Future: Send + 'static,
    S::Response: Serialize + Send + 'static,
    Req: Serialize,
{
    type Response = S::Response;
    type Error = Status;
    type Future = RpcFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: Call<Req>) -> Self::Future {
        let logger = retrieve(&call.ctx);
        log_payload(&logger, "request payload", &call.message);

        let fut = self.inner.call(call);
        Box::pin(async move {
            let result = fut.await;
            if let Ok(response) = &result {
                log_payload(&logger, "response payload", response);
            }
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

    use reqlog_core::{bind, ObservedLogs, ObservedSink, RequestContext, Value};
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Greeting {
        name: String,
    }

    fn bound_call(level: Level, name: &str) -> (Call<Greeting>, ObservedLogs) {
        let (sink, logs) = ObservedSink::new(level);
        let ctx = bind(&RequestContext::background(), &Logger::new(Arc::new(sink)));
        let message = Greeting {
            name: name.to_string(),
        };
        (Call::new("/greet.Greeter/Hello", message).with_context(ctx), logs)
    }

    fn greeter() -> impl Service<Call<Greeting>, Response = Greeting, Error = Status> {
        PayloadLogLayer.layer(tower::service_fn(|call: Call<Greeting>| async move {
            Ok::<_, Status>(Greeting {
                name: format!("hello {}", call.message.name),
            })
        }))
    }

    #[tokio::test]
    async fn logs_request_and_response_as_json() {
        let (call, logs) = bound_call(Level::Debug, "ada");
        let resp = greeter().oneshot(call).await.unwrap();
        assert_eq!(resp.name, "hello ada");

        let all = logs.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entry.level, Level::Debug);
        assert_eq!(all[0].entry.message, "request payload");
        assert_eq!(
            all[0].field(PAYLOAD_KEY).and_then(Value::as_str),
            Some(r#"{"name":"ada"}"#)
        );
        assert_eq!(all[1].entry.message, "response payload");
        assert_eq!(
            all[1].field(PAYLOAD_KEY).and_then(Value::as_str),
            Some(r#"{"name":"hello ada"}"#)
        );
    }

    #[tokio::test]
    async fn silent_above_debug() {
        let (call, logs) = bound_call(Level::Info, "ada");
        greeter().oneshot(call).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn failed_call_logs_request_only() {
        let (call, logs) = bound_call(Level::Debug, "ada");
        let svc = PayloadLogLayer.layer(tower::service_fn(|_call: Call<Greeting>| async {
            Err::<Greeting, _>(Status::invalid_argument("no"))
        }));

        svc.oneshot(call).await.unwrap_err();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.all()[0].entry.message, "request payload");
    }
}
