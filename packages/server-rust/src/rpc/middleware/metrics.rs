//! Server-side RPC metrics recorded through the `metrics` facade.
//!
//! # Metrics
//! - `grpc_server_started_total` (counter): calls entering the stage
//! - `grpc_server_handled_total` (counter): completed calls, with `grpc_code`
//! - `grpc_server_handling_seconds` (histogram): handling latency
//!
//! Every metric carries `grpc_type`, `grpc_service` and `grpc_method` labels.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};

use crate::rpc::call::{Call, MethodPath, RpcFuture};
use crate::rpc::status::{Code, Status};

pub const STARTED_TOTAL: &str = "grpc_server_started_total";
pub const HANDLED_TOTAL: &str = "grpc_server_handled_total";
pub const HANDLING_SECONDS: &str = "grpc_server_handling_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer {
    grpc_type: &'static str,
}

impl MetricsLayer {
    #[must_use]
    pub fn unary() -> Self {
        Self { grpc_type: "unary" }
    }

    #[must_use]
    pub fn stream() -> Self {
        Self {
            grpc_type: "bidi_stream",
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            grpc_type: self.grpc_type,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    grpc_type: &'static str,
}

impl<S, T> Service<Call<T>> for MetricsService<S>
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
        let MethodPath { service, method } = call.method_path();
        let grpc_type = self.grpc_type;

        ::metrics::counter!(
            STARTED_TOTAL,
            "grpc_type" => grpc_type,
            "grpc_service" => service.clone(),
            "grpc_method" => method.clone()
        )
        .increment(1);

        let start = Instant::now();
        let fut = self.inner.call(call);

        Box::pin(async move {
            let result = fut.await;
            let code = Code::of(&result);

            ::metrics::counter!(
                HANDLED_TOTAL,
                "grpc_type" => grpc_type,
                "grpc_service" => service.clone(),
                "grpc_method" => method.clone(),
                "grpc_code" => code.as_str()
            )
            .increment(1);
            ::metrics::histogram!(
                HANDLING_SECONDS,
                "grpc_type" => grpc_type,
                "grpc_service" => service,
                "grpc_method" => method
            )
            .record(start.elapsed().as_secs_f64());

            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
