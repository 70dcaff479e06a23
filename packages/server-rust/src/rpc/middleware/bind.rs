//! Logger-binding stage: attaches the request-scoped logger to each call's context.

use std::task::{Context, Poll};

use reqlog_core::{bind, Logger};
use tower::{Layer, Service};

use crate::rpc::call::Call;
use crate::rpc::status::Status;

/// Tower layer binding a fresh correlation-enriched child of `logger` into every call.
#[derive(Debug, Clone)]
pub struct BindLoggerLayer {
    logger: Logger,
}

impl BindLoggerLayer {
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for BindLoggerLayer {
    type Service = BindLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BindLoggerService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindLoggerService<S> {
    inner: S,
    logger: Logger,
}

impl<S, T> Service<Call<T>> for BindLoggerService<S>
where
    S: Service<Call<T>, Error = Status>,
{
    type Response = S::Response;
    type Error = Status;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: Call<T>) -> Self::Future {
        call.ctx = bind(&call.ctx, &self.logger);
        self.inner.call(call)
    }
}

#[cfg(test)]
mod tests {
    use reqlog_core::correlation::REQUEST_ID_KEY;
    use reqlog_core::{try_retrieve, Value};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn handler_sees_bound_logger() {
        let svc = BindLoggerLayer::new(Logger::nop()).layer(tower::service_fn(
            |call: Call<()>| async move {
                let logger = try_retrieve(&call.ctx)?;
                Ok::<_, Status>(logger.field(REQUEST_ID_KEY).and_then(Value::as_str).map(str::to_string))
            },
        ));

        let request_id = svc.oneshot(Call::new("/s.S/M", ())).await.unwrap();
        assert!(request_id.is_some_and(|id| id.len() == 36));
    }

    #[tokio::test]
    async fn each_call_gets_its_own_request_id() {
        let mut svc = BindLoggerLayer::new(Logger::nop()).layer(tower::service_fn(
            |call: Call<()>| async move {
                let logger = try_retrieve(&call.ctx)?;
                Ok::<_, Status>(logger.field(REQUEST_ID_KEY).cloned())
            },
        ));

        let first = svc.ready().await.unwrap().call(Call::new("/s.S/M", ())).await.unwrap();
        let second = svc.ready().await.unwrap().call(Call::new("/s.S/M", ())).await.unwrap();
        assert_ne!(first, second);
    }
}
