//! The request value that flows through interceptor stages.

use std::future::Future;
use std::pin::Pin;

use http::HeaderMap;
use reqlog_core::RequestContext;

use super::status::Status;

/// Boxed future returned by stage services.
pub type RpcFuture<R> = Pin<Box<dyn Future<Output = Result<R, Status>> + Send>>;

/// One RPC invocation: its context, fully-qualified method, metadata and message.
///
/// For unary calls `T` is the request message; for streaming calls it is the
/// server-side stream handle.
#[derive(Debug, Clone)]
pub struct Call<T> {
    pub ctx: RequestContext,
    pub method: String,
    pub metadata: HeaderMap,
    pub message: T,
}

impl<T> Call<T> {
    /// Call with a background context and empty metadata.
    pub fn new(method: impl Into<String>, message: T) -> Self {
        Self {
            ctx: RequestContext::background(),
            method: method.into(),
            metadata: HeaderMap::new(),
            message,
        }
    }

    #[must_use]
    pub fn with_context(mut self, ctx: RequestContext) -> Self {
        self.ctx = ctx;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: HeaderMap) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn method_path(&self) -> MethodPath {
        MethodPath::parse(&self.method)
    }
}

/// Service and method split out of a `/package.Service/Method` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPath {
    pub service: String,
    pub method: String,
}

impl MethodPath {
    /// Splits at the last `/`: everything before it (without the leading `/`) is the
    /// service, the rest is the method. Trailing slashes are ignored.
    #[must_use]
    pub fn parse(full_method: &str) -> Self {
        let trimmed = full_method.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((service, method)) => Self {
                service: service.strip_prefix('/').unwrap_or(service).to_string(),
                method: method.to_string(),
            },
            None => Self {
                service: String::new(),
                method: trimmed.to_string(),
            },
        }
    }
}
