//! Distributed-trace identifiers and their binding in a [`RequestContext`].
//!
//! Ids follow W3C Trace Context: a 16-byte trace id and an 8-byte span id, both
//! invalid when all-zero, rendered as lowercase hex.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::context::{ContextKey, RequestContext};

/// Metadata header carrying the W3C trace context.
pub const TRACEPARENT_HEADER: &str = "traceparent";

static SPAN_KEY: LazyLock<ContextKey<SpanContext>> = LazyLock::new(|| ContextKey::new("span"));

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId([u8; 16]);

impl TraceId {
    pub const INVALID: TraceId = TraceId([0; 16]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random, valid id.
    #[must_use]
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random::<u128>().to_be_bytes());
            if id.is_valid() {
                return id;
            }
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId([u8; 8]);

impl SpanId {
    pub const INVALID: SpanId = SpanId([0; 8]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random::<u64>().to_be_bytes());
            if id.is_valid() {
                return id;
            }
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// SpanContext
// ---------------------------------------------------------------------------

/// Identity of the active span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub sampled: bool,
}

impl SpanContext {
    #[must_use]
    pub fn new(trace_id: TraceId, span_id: SpanId, sampled: bool) -> Self {
        Self {
            trace_id,
            span_id,
            sampled,
        }
    }

    /// New root span with fresh ids.
    #[must_use]
    pub fn new_root() -> Self {
        Self::new(TraceId::random(), SpanId::random(), true)
    }

    /// Child span in the same trace with a fresh span id.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::new(self.trace_id, SpanId::random(), self.sampled)
    }

    #[must_use]
    pub fn has_trace_id(&self) -> bool {
        self.trace_id.is_valid()
    }

    #[must_use]
    pub fn has_span_id(&self) -> bool {
        self.span_id.is_valid()
    }

    /// Formats as a version-00 `traceparent` value.
    #[must_use]
    pub fn to_traceparent(&self) -> String {
        let flags = u8::from(self.sampled);
        format!("00-{}-{}-{flags:02x}", self.trace_id, self.span_id)
    }
}

/// Error returned for malformed `traceparent` values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid traceparent: {0:?}")]
pub struct ParseTraceparentError(String);

impl FromStr for SpanContext {
    type Err = ParseTraceparentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTraceparentError(s.to_string());
        let mut parts = s.trim().split('-');
        let (Some(version), Some(trace), Some(span), Some(flags)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if version.len() != 2 || version.eq_ignore_ascii_case("ff") {
            return Err(invalid());
        }
        if version == "00" && parts.next().is_some() {
            return Err(invalid());
        }

        let mut trace_bytes = [0u8; 16];
        let mut span_bytes = [0u8; 8];
        let mut flag_bytes = [0u8; 1];
        hex::decode_to_slice(trace, &mut trace_bytes).map_err(|_| invalid())?;
        hex::decode_to_slice(span, &mut span_bytes).map_err(|_| invalid())?;
        hex::decode_to_slice(flags, &mut flag_bytes).map_err(|_| invalid())?;

        let ctx = SpanContext::new(
            TraceId(trace_bytes),
            SpanId(span_bytes),
            flag_bytes[0] & 0x01 == 0x01,
        );
        if !ctx.has_trace_id() || !ctx.has_span_id() {
            return Err(invalid());
        }
        Ok(ctx)
    }
}

// ---------------------------------------------------------------------------
// Context accessors
// ---------------------------------------------------------------------------

/// Returns a child context whose active span is `span`.
#[must_use]
pub fn with_span_context(ctx: &RequestContext, span: SpanContext) -> RequestContext {
    ctx.with_value(&SPAN_KEY, span)
}

/// The active span of `ctx`, if any.
#[must_use]
pub fn active_span(ctx: &RequestContext) -> Option<SpanContext> {
    ctx.value(&SPAN_KEY).copied()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
