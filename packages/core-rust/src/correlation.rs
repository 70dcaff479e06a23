//! Binds a request-scoped logger carrying a correlation identifier into a context.

use std::sync::LazyLock;

use uuid::Uuid;

use crate::context::{ContextError, ContextKey, RequestContext};
use crate::field::Field;
use crate::logger::Logger;
use crate::trace::active_span;

pub const TRACE_ID_KEY: &str = "traceId";
pub const REQUEST_ID_KEY: &str = "requestId";
pub const SPAN_ID_KEY: &str = "spanId";

static LOGGER_KEY: LazyLock<ContextKey<Logger>> = LazyLock::new(|| ContextKey::new("logger"));

/// Binds `logger` into a child of `parent`, enriched with exactly one correlation id:
/// `traceId` when `parent` has an active trace, otherwise a fresh UUID v4 `requestId`.
#[must_use]
pub fn bind(parent: &RequestContext, logger: &Logger) -> RequestContext {
    let correlation = match active_span(parent) {
        Some(span) if span.has_trace_id() => {
            Field::string(TRACE_ID_KEY, span.trace_id.to_string())
        }
        _ => Field::string(REQUEST_ID_KEY, Uuid::new_v4().to_string()),
    };
    parent.with_value(&LOGGER_KEY, logger.with(&[correlation]))
}

/// Logger bound to `ctx`, enriched with `spanId` when the context has an active span.
///
/// # Errors
///
/// Returns [`ContextError::Unbound`] when `ctx` never passed through [`bind`].
pub fn try_retrieve(ctx: &RequestContext) -> Result<Logger, ContextError> {
    let logger = ctx.value(&LOGGER_KEY).ok_or(ContextError::Unbound)?;
    match active_span(ctx) {
        Some(span) if span.has_span_id() => {
            Ok(logger.with(&[Field::string(SPAN_ID_KEY, span.span_id.to_string())]))
        }
        _ => Ok(logger.clone()),
    }
}

/// Logger bound to `ctx`.
///
/// # Panics
///
/// Panics when `ctx` never passed through [`bind`]: a stage reading the logger ahead
/// of the binding stage is a wiring defect.
#[must_use]
pub fn retrieve(ctx: &RequestContext) -> Logger {
    match try_retrieve(ctx) {
        Ok(logger) => logger,
        Err(err) => panic!("{err}: retrieve called before bind"),
    }
}
