//! Ordered stage lists that wrap a handler into a single boxed service.

use std::fmt;

use tower::util::{BoxCloneService, BoxCloneServiceLayer};
use tower::{Layer, Service};

use crate::rpc::call::Call;
use crate::rpc::status::Status;

/// Type-erased, cloneable service handling `Call<T>` and answering `R`.
pub type BoxRpcService<T, R> = BoxCloneService<Call<T>, R, Status>;

/// Type-erased stage: a layer turning one `BoxRpcService` into another.
pub type BoxStage<T, R> = BoxCloneServiceLayer<BoxRpcService<T, R>, Call<T>, R, Status>;

/// Boxes any compatible tower layer into a [`BoxStage`].
pub fn boxed_stage<L, T, R>(layer: L) -> BoxStage<T, R>
where
    L: Layer<BoxRpcService<T, R>> + Send + Sync + 'static,
    L::Service: Service<Call<T>, Response = R, Error = Status> + Clone + Send + 'static,
    <L::Service as Service<Call<T>>>::Future: Send + 'static,
    T: 'static,
    R: 'static,
{
    BoxCloneServiceLayer::new(layer)
}

// ---------------------------------------------------------------------------
// StageKind
// ---------------------------------------------------------------------------

/// What a pipeline stage does, recorded for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Tracing,
    BindLogger,
    AccessLog,
    Recovery,
    Metrics,
    Timeout,
    /// Supplied by the caller.
    Custom,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered list of stages, outermost first.
pub struct Pipeline<T, R> {
    stages: Vec<(StageKind, BoxStage<T, R>)>,
}

/// Pipeline for single-response calls.
pub type UnaryPipeline<Req, Resp> = Pipeline<Req, Resp>;

/// Pipeline for streaming calls; the handler drives the stream and answers `()`.
pub type StreamPipeline<St> = Pipeline<St, ()>;

impl<T: Send + 'static, R: Send + 'static> Pipeline<T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends `layer` as the innermost stage so far.
    pub fn push<L>(&mut self, kind: StageKind, layer: L)
    where
        L: Layer<BoxRpcService<T, R>> + Send + Sync + 'static,
        L::Service: Service<Call<T>, Response = R, Error = Status> + Clone + Send + 'static,
        <L::Service as Service<Call<T>>>::Future: Send + 'static,
    {
        self.stages.push((kind, boxed_stage(layer)));
    }

    pub fn push_boxed(&mut self, kind: StageKind, stage: BoxStage<T, R>) {
        self.stages.push((kind, stage));
    }

    /// Stage kinds in execution order.
    #[must_use]
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|(kind, _)| *kind).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Wraps `handler` so that the first stage runs first on every call.
    pub fn service<S>(&self, handler: S) -> BoxRpcService<T, R>
    where
        S: Service<Call<T>, Response = R, Error = Status> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        self.stages
            .iter()
            .rev()
            .fold(BoxCloneService::new(handler), |inner, (_, stage)| {
                stage.layer(inner)
            })
    }
}

impl<T: Send + 'static, R: Send + 'static> Default for Pipeline<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> Clone for Pipeline<T, R> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<T, R> fmt::Debug for Pipeline<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|(kind, _)| kind))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
