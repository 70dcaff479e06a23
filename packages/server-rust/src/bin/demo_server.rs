//! Drives a few in-process calls through the composed interceptor pipelines.
//!
//! The logger comes from the `REQLOG_*` environment; `--service` overrides the
//! service name. With `--metrics-addr` the Prometheus exposition stays available
//! until Ctrl-C.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use http::{HeaderMap, HeaderValue};
use reqlog_core::trace::TRACEPARENT_HEADER;
use reqlog_core::{retrieve, Field};
use reqlog_server::rpc::middleware::payload_logging;
use reqlog_server::rpc::RpcFuture;
use reqlog_server::{
    build_logger, compose_interceptors, init_tracing, install_metrics_exporter, Call, LogFormat,
    LoggerConfig, ServerInterceptorsOptions, Status,
};
use tower::ServiceExt;

#[derive(Debug, Parser)]
#[command(name = "demo-server", about = "Exercise the reqlog interceptor pipelines")]
struct Args {
    /// Format of the crate's own diagnostics.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    format: LogFormat,

    /// Service name, overriding REQLOG_SERVICE.
    #[arg(long, env = "REQLOG_SERVICE", default_value = "demo")]
    service: String,

    /// Serve Prometheus metrics on this address and wait for Ctrl-C.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Deadline applied to unary calls, in milliseconds.
    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,
}

fn greet(call: Call<String>) -> RpcFuture<String> {
    Box::pin(async move {
        let logger = retrieve(&call.ctx);
        match call.message.as_str() {
            "" => Err(Status::invalid_argument("name is required")),
            "panic" => panic!("greeter cannot greet {:?}", call.message),
            "slow" => {
                tokio::select! {
                    () = call.ctx.done() => {}
                    () = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                match call.ctx.err() {
                    Some(err) => Err(err.into()),
                    None => Ok("finally".to_string()),
                }
            }
            name => {
                logger.info("greeting", &[Field::string("name", name.to_string())]);
                Ok(format!("hello {name}"))
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.format).context("installing tracing subscriber")?;

    if let Some(addr) = args.metrics_addr {
        install_metrics_exporter(addr).context("installing metrics exporter")?;
    }

    let mut config = LoggerConfig::from_env().context("reading REQLOG_* environment")?;
    config.service_name = args.service;
    let logger = build_logger(&config).context("building logger")?;

    let mut options: ServerInterceptorsOptions<String, String, ()> =
        ServerInterceptorsOptions::new(logger.clone());
    options.with_panic_recovery = true;
    options.with_metrics = args.metrics_addr.is_some();
    options.with_tracing = true;
    options.unary_timeout = Duration::from_millis(args.timeout_ms);
    options.additional_unary.push(payload_logging());

    let (unary, _stream) = compose_interceptors(options);
    let service = unary.service(tower::service_fn(greet));

    let mut traced = HeaderMap::new();
    traced.insert(
        TRACEPARENT_HEADER,
        HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
    );

    let calls = [
        Call::new("/demo.Greeter/Hello", "ada".to_string()).with_metadata(traced),
        Call::new("/demo.Greeter/Hello", String::new()),
        Call::new("/demo.Greeter/Hello", "panic".to_string()),
        Call::new("/demo.Greeter/Hello", "slow".to_string()),
    ];

    for call in calls {
        let outcome = service.clone().oneshot(call).await;
        match outcome {
            Ok(reply) => tracing::info!(%reply, "call succeeded"),
            Err(status) => tracing::info!(%status, "call failed"),
        }
    }

    if args.metrics_addr.is_some() {
        tracing::info!("waiting for Ctrl-C");
        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    }

    logger.sync();
    Ok(())
}
