//! Opaque per-request context: typed value bindings plus cancellation state.
//!
//! A `RequestContext` is immutable. Every derivation (`with_value`, `with_cancel`,
//! `with_deadline`) returns a child that shares the parent's bindings and observes
//! the parent's cancellation, while the parent is left untouched.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

// ---------------------------------------------------------------------------
// ContextKey
// ---------------------------------------------------------------------------

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token identifying one binding slot in a [`RequestContext`].
///
/// Every call to [`ContextKey::new`] yields a distinct slot, so two modules can never
/// collide even when they bind values of the same type. Owners keep their key
/// private and expose typed accessors instead.
pub struct ContextKey<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ContextKey<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ContextError
// ---------------------------------------------------------------------------

/// Errors reported by context accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("no logger bound to request context")]
    Unbound,
}

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

struct Binding {
    key: u64,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Binding>>,
}

/// Request-scoped carrier of typed bindings, cancellation and deadline.
#[derive(Clone)]
pub struct RequestContext {
    bindings: Option<Arc<Binding>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Empty root context that is never canceled on its own.
    #[must_use]
    pub fn background() -> Self {
        Self {
            bindings: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Returns a child context with `value` bound under `key`.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(&self, key: &ContextKey<T>, value: T) -> Self {
        Self {
            bindings: Some(Arc::new(Binding {
                key: key.id,
                value: Arc::new(value),
                parent: self.bindings.clone(),
            })),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }

    /// Nearest value bound under `key`.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<&T> {
        let mut current = self.bindings.as_deref();
        while let Some(binding) = current {
            if binding.key == key.id {
                return binding.value.downcast_ref::<T>();
            }
            current = binding.parent.as_deref();
        }
        None
    }

    /// Returns a cancelable child and the guard releasing it. Dropping the guard
    /// cancels the child and everything derived from it, never the parent.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelGuard) {
        let token = self.cancel.child_token();
        let child = Self {
            bindings: self.bindings.clone(),
            cancel: token.clone(),
            deadline: self.deadline,
        };
        (child, CancelGuard(token.drop_guard()))
    }

    /// Like [`with_cancel`](Self::with_cancel), additionally expiring at `deadline`.
    /// An earlier deadline inherited from the parent is kept.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelGuard) {
        let (mut child, guard) = self.with_cancel();
        child.deadline = Some(match self.deadline {
            Some(inherited) if inherited < deadline => inherited,
            _ => deadline,
        });
        (child, guard)
    }

    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelGuard) {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live. A passed deadline
    /// takes precedence over an explicit cancel.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        if expired {
            Some(ContextError::DeadlineExceeded)
        } else if self.cancel.is_cancelled() {
            Some(ContextError::Canceled)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is canceled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("deadline", &self.deadline)
            .field("canceled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CancelGuard
// ---------------------------------------------------------------------------

/// Releases a derived context when dropped.
#[must_use = "dropping the guard cancels the derived context immediately"]
pub struct CancelGuard(DropGuard);

impl CancelGuard {
    /// Cancels the derived context now.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for CancelGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelGuard")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
