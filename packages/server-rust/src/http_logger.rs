//! HTTP request binding: one request-scoped logger per `http::Request`.
//!
//! [`HttpLoggerLayer`] builds a [`RequestContext`] for each request, continuing a
//! `traceparent` header when one is present, binds the logger into it and stores
//! the context in the request extensions. Handlers read it back with
//! [`request_context`] or [`request_logger`].

use std::task::{Context, Poll};

use http::Request;
use reqlog_core::{bind, try_retrieve, with_span_context, ContextError, Logger, RequestContext};
use tower::{Layer, Service};

use crate::rpc::middleware::trace::remote_parent;

/// Context stored by [`HttpLoggerLayer`], if the request went through it.
#[must_use]
pub fn request_context<B>(req: &Request<B>) -> Option<&RequestContext> {
    req.extensions().get::<RequestContext>()
}

/// Logger bound to the request.
///
/// # Errors
///
/// Returns [`ContextError::Unbound`] when the request never went through
/// [`HttpLoggerLayer`].
pub fn request_logger<B>(req: &Request<B>) -> Result<Logger, ContextError> {
    request_context(req).map_or(Err(ContextError::Unbound), try_retrieve)
}

// ---------------------------------------------------------------------------
// HttpLoggerLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpLoggerLayer {
    logger: Logger,
}

impl HttpLoggerLayer {
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for HttpLoggerLayer {
    type Service = HttpLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpLoggerService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpLoggerService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpLoggerService<S> {
    inner: S,
    logger: Logger,
}

impl<S, B> Service<Request<B>> for HttpLoggerService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let parent = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();
        let parent = match remote_parent(req.headers()) {
            Some(remote) => with_span_context(&parent, remote.child()),
            None => parent,
        };
        req.extensions_mut().insert(bind(&parent, &self.logger));
        self.inner.call(req)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
