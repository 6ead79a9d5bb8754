//! Batch concurrent request controller
//!
//! Runs units of work against a [`UnitExecutor`] in strictly sequential batches:
//! - At most `width` units are in flight at once
//! - Batch K fully settles before batch K+1 is dispatched
//! - Results are stored in input order, not completion order
//! - Whole-run and per-unit cancellation at any time
//!
//! # Example
//!
//! ```rust,ignore
//! use nodeflow_core::{BatchController, FnExecutor, UnitOfWork, UnitSuccess};
//! use std::num::NonZeroUsize;
//!
//! let executor = FnExecutor::new(|unit_id, params: String, _token| async move {
//!     Ok(UnitSuccess::now(format!("{unit_id}:{params}")))
//! });
//! let controller = BatchController::new(executor, NonZeroUsize::new(5).unwrap());
//!
//! let handle = controller.run(vec![UnitOfWork::new(1, "a".to_string())]);
//! let outcome = handle.outcome().await;
//! assert_eq!(outcome.all_results.len(), 1);
//! ```

use crate::cancellation::{AbortHandle, CancellationRegistry};
use crate::error::{BatchError, ExecutorError, ABORTED_BEFORE_EXECUTION};
use crate::types::{FailureCause, RunOutcome, UnitId, UnitOfWork, UnitResult, UnitSuccess};
use futures::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Unit executor trait
///
/// Implement this trait to define how one unit is executed against the remote side.
/// Implementations should honor `token` by dropping their in-flight request when it fires.
#[async_trait::async_trait]
pub trait UnitExecutor<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Success payload
    type Output: Send + 'static;

    /// Execute a single unit
    async fn execute(
        &self,
        unit_id: UnitId,
        params: &P,
        token: CancellationToken,
    ) -> Result<UnitSuccess<Self::Output>, ExecutorError>;
}

/// Executor built from an async closure
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    /// Wrap a closure `(unit_id, params, token) -> Future<Result<..>>`
    #[inline]
    #[must_use]
    pub fn new<P, T, Fut>(f: F) -> Self
    where
        F: Fn(UnitId, P, CancellationToken) -> Fut,
        Fut: Future<Output = Result<UnitSuccess<T>, ExecutorError>>,
    {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<P, T, F, Fut> UnitExecutor<P> for FnExecutor<F>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(UnitId, P, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<UnitSuccess<T>, ExecutorError>> + Send,
{
    type Output = T;

    async fn execute(
        &self,
        unit_id: UnitId,
        params: &P,
        token: CancellationToken,
    ) -> Result<UnitSuccess<T>, ExecutorError> {
        (self.f)(unit_id, params.clone(), token).await
    }
}

/// How the orchestration loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Completed,
    Canceled,
}

/// Batch controller
///
/// Holds the executor and the concurrency width; every [`run`](Self::run) gets its own
/// cancellation handles.
pub struct BatchController<P, E> {
    executor: Arc<E>,
    width: NonZeroUsize,
    _params: PhantomData<fn(P)>,
}

impl<P, E> Clone for BatchController<P, E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            width: self.width,
            _params: PhantomData,
        }
    }
}

impl<P, E> std::fmt::Debug for BatchController<P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchController")
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

impl<P, E> BatchController<P, E>
where
    P: Send + Sync + 'static,
    E: UnitExecutor<P> + 'static,
{
    /// Create new controller
    #[inline]
    #[must_use]
    pub fn new(executor: E, width: NonZeroUsize) -> Self {
        Self::with_shared(Arc::new(executor), width)
    }

    /// Create controller around a shared executor
    #[inline]
    #[must_use]
    pub fn with_shared(executor: Arc<E>, width: NonZeroUsize) -> Self {
        Self {
            executor,
            width,
            _params: PhantomData,
        }
    }

    /// Concurrency width
    #[inline]
    #[must_use]
    pub fn width(&self) -> NonZeroUsize {
        self.width
    }

    /// Start a run
    ///
    /// Returns immediately; the batches are driven by a task on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn run(&self, units: Vec<UnitOfWork<P>>) -> ControllerHandle<P, E::Output> {
        let registry = Arc::new(CancellationRegistry::new(units.iter().map(|u| u.unit_id)));
        let results = Arc::new(Mutex::new(Vec::with_capacity(units.len())));

        tracing::info!(
            units = units.len(),
            width = self.width.get(),
            "starting batch run"
        );

        let task = tokio::spawn(orchestrate(
            units,
            self.width,
            Arc::clone(&self.executor),
            Arc::clone(&registry),
            Arc::clone(&results),
        ));

        ControllerHandle {
            abort: AbortHandle::new(registry),
            results,
            task,
        }
    }
}

/// Start a run with a one-off controller
pub fn run_batches<P, E>(
    units: Vec<UnitOfWork<P>>,
    width: NonZeroUsize,
    executor: E,
) -> ControllerHandle<P, E::Output>
where
    P: Send + Sync + 'static,
    E: UnitExecutor<P> + 'static,
{
    BatchController::new(executor, width).run(units)
}

/// Handle of one running batch
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct ControllerHandle<P, T> {
    abort: AbortHandle,
    results: Arc<Mutex<Vec<UnitResult<P, T>>>>,
    task: JoinHandle<Result<RunEnd, BatchError>>,
}

impl<P, T> ControllerHandle<P, T> {
    /// Abort every outstanding unit; batches not started yet are skipped
    #[inline]
    pub fn abort_all(&self, reason: impl Into<String>) {
        self.abort.abort_all(reason);
    }

    /// Abort one unit; returns whether anything changed
    #[inline]
    pub fn abort_by_id(&self, unit_id: UnitId, reason: impl Into<String>) -> bool {
        self.abort.abort_by_id(unit_id, reason)
    }

    /// Cloneable abort capability, usable after `outcome` took the handle
    #[inline]
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Number of results appended so far
    #[inline]
    #[must_use]
    pub fn settled_count(&self) -> usize {
        self.results.lock().len()
    }

    /// Wait for the run to end
    pub async fn outcome(self) -> RunOutcome<P, T> {
        let end = match self.task.await {
            Ok(Ok(end)) => Ok(end),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(BatchError::Orchestration(describe_join_error(join_err))),
        };
        let all_results = std::mem::take(&mut *self.results.lock());

        match end {
            Ok(RunEnd::Completed) => {
                tracing::info!(results = all_results.len(), "batch run completed");
                RunOutcome {
                    all_results,
                    is_canceled: false,
                    error_message: None,
                }
            }
            Ok(RunEnd::Canceled) => {
                let reason = self.abort.registry().run_reason();
                tracing::info!(results = all_results.len(), ?reason, "batch run canceled");
                RunOutcome {
                    all_results,
                    is_canceled: true,
                    error_message: reason,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(error = %message, "batch run failed");
                self.abort
                    .abort_all(format!("Request processing failed: {message}"));
                RunOutcome {
                    all_results,
                    is_canceled: true,
                    error_message: Some(message),
                }
            }
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "orchestration task cancelled".to_string();
    }
    let panic = err.into_panic();
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Unknown error".to_string())
}

async fn orchestrate<P, E>(
    units: Vec<UnitOfWork<P>>,
    width: NonZeroUsize,
    executor: Arc<E>,
    registry: Arc<CancellationRegistry>,
    results: Arc<Mutex<Vec<UnitResult<P, E::Output>>>>,
) -> Result<RunEnd, BatchError>
where
    P: Send + Sync + 'static,
    E: UnitExecutor<P> + 'static,
{
    let total_batches = units.len().div_ceil(width.get());
    let mut pending = units.into_iter();

    for batch_index in 0..total_batches {
        if registry.is_run_canceled() {
            tracing::info!(batch_index, total_batches, "run canceled, skipping remaining batches");
            return Ok(RunEnd::Canceled);
        }

        let batch: Vec<UnitOfWork<P>> = pending.by_ref().take(width.get()).collect();
        tracing::debug!(batch_index, size = batch.len(), "dispatching batch");

        let dispatched = batch
            .into_iter()
            .map(|unit| dispatch_unit(executor.as_ref(), registry.as_ref(), unit));
        let settled = join_all(dispatched).await;

        let mut first_error = None;
        {
            let mut results = results.lock();
            for result in settled {
                match result {
                    Ok(result) => results.push(result),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        tracing::debug!(batch_index, total_batches, "batch settled");
    }

    Ok(RunEnd::Completed)
}

async fn dispatch_unit<P, E>(
    executor: &E,
    registry: &CancellationRegistry,
    unit: UnitOfWork<P>,
) -> Result<UnitResult<P, E::Output>, BatchError>
where
    P: Send + Sync + 'static,
    E: UnitExecutor<P>,
{
    let UnitOfWork { unit_id, params } = unit;
    let token = registry
        .token(unit_id)
        .ok_or(BatchError::MissingHandle(unit_id))?;

    if token.is_cancelled() {
        tracing::debug!(unit_id, reason = ?registry.reason(unit_id), "unit aborted before execution");
        return Ok(UnitResult::failed(
            unit_id,
            params,
            FailureCause::AbortedBeforeExecution,
            ABORTED_BEFORE_EXECUTION,
        ));
    }

    let result = match executor.execute(unit_id, &params, token).await {
        Ok(success) => {
            tracing::trace!(unit_id, "unit completed");
            UnitResult::completed(unit_id, params, success)
        }
        Err(err) => {
            tracing::warn!(unit_id, error = %err, "unit failed");
            UnitResult::failed(unit_id, params, err.cause(), err.to_string())
        }
    };
    Ok(result)
}
