//! Resolving remote computations back into the stream.
//!
//! [GatherFallback] waits for a [RemoteHandle](crate::remote::RemoteHandle), or a batch
//! of them, and emits the result. Failed computations are replaced by a default value,
//! so every input produces exactly one emission.
//!
//! The operator is asynchronous. [GatherNode] adapts it to the synchronous graph by
//! spawning every gather on the tokio runtime; [InFlight] collects the outcome.
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use bon::Builder;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::channels::{Downstream, Node};
use crate::credit::{CreditLedger, Credits};
use crate::errorhandling::OperatorError;
use crate::remote::{Gather, RemoteError};

/// Receives the remote failures [GatherFallback] replaced with its default.
///
/// Any `Fn(&str, &RemoteError)` closure is a diagnostic sink; it gets the operator name
/// and the failure.
pub trait DiagnosticSink: Send + Sync + 'static {
    /// Record one ignored failure of the operator called `operator`
    fn record(&self, operator: &str, error: &RemoteError);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&str, &RemoteError) + Send + Sync + 'static,
{
    fn record(&self, operator: &str, error: &RemoteError) {
        self(operator, error)
    }
}

/// Logs every ignored failure at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn record(&self, operator: &str, error: &RemoteError) {
        warn!(operator, %error, "ignoring failed remote computation");
    }
}

/// Counters of a [GatherFallback]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatherStats {
    /// Emissions of a resolved value
    pub resolved: u64,
    /// Emissions of the default value
    pub fallbacks: u64,
}

/// Gathers pending remote results and emits them, falling back to `default_obj`
/// when the remote computation failed.
///
/// The credits of every input are retained as soon as `update` is called, before the
/// returned future is first polled, and released after the emission. An upstream may
/// therefore release its own hold right after calling `update`.
///
/// Any number of `update` calls may be awaited concurrently on one instance and they
/// complete in whatever order their results arrive. The downstream is locked only for
/// the synchronous emission.
///
/// Errors from the downstream itself are not replaced by the default, they are
/// returned after the credits were released.
///
/// # Example
/// ```rust
/// use creditflow::credit::{CountingLedger, Credits};
/// use creditflow::operators::GatherFallback;
/// use creditflow::remote::{RemoteError, RemoteHandle};
/// use creditflow::sinks::VecSink;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ledger = CountingLedger::new();
/// let sink = VecSink::new();
/// let mut gather: GatherFallback<RemoteHandle<i32>, i32> = GatherFallback::builder()
///     .name("gather")
///     .default_obj(-1)
///     .ledger(ledger.shared())
///     .build();
/// gather.subscribe(sink.clone());
///
/// gather.update(RemoteHandle::ready(7), Credits::none()).await.unwrap();
/// gather
///     .update(RemoteHandle::failed(RemoteError::Cancelled), Credits::none())
///     .await
///     .unwrap();
/// assert_eq!(sink.drain_payloads(), vec![7, -1]);
/// # }
/// ```
#[derive(Builder)]
pub struct GatherFallback<G: Gather, R> {
    #[builder(into)]
    name: String,
    /// Emitted in place of a failed result
    default_obj: G::Output,
    ledger: Arc<dyn CreditLedger>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    #[builder(skip)]
    downstream: Mutex<Downstream<G::Output, R>>,
    #[builder(skip)]
    resolved: AtomicU64,
    #[builder(skip)]
    fallbacks: AtomicU64,
}

impl<G, R> GatherFallback<G, R>
where
    G: Gather,
    R: Send + 'static,
{
    /// Link a node to receive the gathered values
    pub fn subscribe(&mut self, node: impl Node<G::Output, R>) {
        self.downstream.get_mut().subscribe(node)
    }

    /// Name of this operator
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emission counters so far
    pub fn stats(&self) -> GatherStats {
        GatherStats {
            resolved: self.resolved.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Retain `credits`, then return a future which waits for `pending` and emits its
    /// value, or the default if it failed, together with `credits`. The future
    /// resolves to the results of the downstream.
    ///
    /// The retain happens here, not on first poll. If it fails the future resolves to
    /// the error without awaiting or emitting anything.
    pub fn update(
        &self,
        pending: G,
        credits: Credits,
    ) -> impl Future<Output = Result<Vec<R>, OperatorError>> + Send + '_ {
        let retained = self.ledger.retain(&credits);
        async move {
            retained?;
            self.resolve(pending, credits).await
        }
    }

    /// Everything after the retain
    async fn resolve(&self, pending: G, credits: Credits) -> Result<Vec<R>, OperatorError> {
        trace!(operator = %self.name, credits = credits.len(), "awaiting remote result");

        let payload = match pending.gather().await {
            Ok(value) => {
                self.resolved.fetch_add(1, Ordering::Relaxed);
                value
            }
            Err(error) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                match &self.diagnostics {
                    Some(diagnostics) => {
                        debug!(operator = %self.name, %error, "remote computation failed");
                        diagnostics.record(&self.name, &error);
                    }
                    None => {
                        warn!(operator = %self.name, %error, "remote computation failed, emitting default");
                    }
                }
                self.default_obj.clone()
            }
        };

        let emitted = self.downstream.lock().await.emit(payload, &credits);
        self.ledger.release(&credits)?;
        emitted
    }
}

type GatherResult<R> = Result<Vec<R>, OperatorError>;
type Tasks<R> = VecDeque<JoinHandle<GatherResult<R>>>;

/// Gathers which were started by a [GatherNode] and have not been collected yet.
///
/// Cheaply clonable, all clones refer to the same set. Dropping the set does not stop
/// the gathers, they still emit and release their credits.
pub struct InFlight<R> {
    tasks: Arc<std::sync::Mutex<Tasks<R>>>,
}

impl<R> Clone for InFlight<R> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<R> Default for InFlight<R> {
    fn default() -> Self {
        Self {
            tasks: Arc::new(std::sync::Mutex::new(VecDeque::new())),
        }
    }
}

/// A gather taken out of the set for joining. Goes back to the front of the set
/// unless it was joined.
struct Joining<'a, R> {
    in_flight: &'a InFlight<R>,
    task: Option<JoinHandle<GatherResult<R>>>,
}

impl<R> Drop for Joining<'_, R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.in_flight.lock().push_front(task);
        }
    }
}

impl<R> InFlight<R> {
    /// Number of gathers not collected yet, finished or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if there is nothing left to collect
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, task: JoinHandle<GatherResult<R>>) {
        self.lock().push_back(task)
    }

    fn pop(&self) -> Option<JoinHandle<GatherResult<R>>> {
        self.lock().pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, Tasks<R>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R> InFlight<R>
where
    R: Send + 'static,
{
    /// Wait for every gather started so far, including those started while waiting,
    /// and return the concatenation of their results in the order they were started.
    ///
    /// All gathers are awaited even if some fail. The first failure is returned.
    ///
    /// Cancelling the returned future loses nothing: gathers not yet joined stay in
    /// the set and keep running.
    pub async fn join_all(&self) -> Result<Vec<R>, OperatorError> {
        let mut results = Vec::new();
        let mut first_error = None;
        while let Some(task) = self.pop() {
            let mut joining = Joining {
                in_flight: self,
                task: Some(task),
            };
            let joined = match joining.task.as_mut() {
                Some(task) => task.await,
                None => continue,
            };
            joining.task = None;
            match joined.map_err(OperatorError::from).and_then(|r| r) {
                Ok(r) => results.extend(r),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

/// Places a [GatherFallback] in the synchronous graph.
///
/// Every `update` retains the credits, spawns the gather on the current tokio runtime
/// and returns at once with no results; the results are collected through [InFlight].
/// Calling `update` outside of a runtime fails with [OperatorError::NoRuntime], and a
/// failed retain is returned directly. In both cases nothing is spawned.
pub struct GatherNode<G: Gather, R> {
    operator: Arc<GatherFallback<G, R>>,
    in_flight: InFlight<R>,
}

impl<G, R> GatherNode<G, R>
where
    G: Gather,
    R: Send + 'static,
{
    /// Wrap an operator. Subscribe its downstream before, it can not be changed after.
    pub fn new(operator: GatherFallback<G, R>) -> Self {
        Self {
            operator: Arc::new(operator),
            in_flight: InFlight::default(),
        }
    }

    /// The gathers this node started
    pub fn in_flight(&self) -> InFlight<R> {
        self.in_flight.clone()
    }

    /// The wrapped operator
    pub fn operator(&self) -> &GatherFallback<G, R> {
        &self.operator
    }
}

impl<G, R> Node<G, R> for GatherNode<G, R>
where
    G: Gather,
    R: Send + 'static,
{
    fn update(&mut self, pending: G, credits: Credits) -> Result<Vec<R>, OperatorError> {
        let runtime =
            Handle::try_current().map_err(|_| OperatorError::NoRuntime(self.operator.name.clone()))?;
        // retain before returning, upstream may release right after
        self.operator.ledger.retain(&credits)?;
        let operator = Arc::clone(&self.operator);
        let task = runtime.spawn(async move { operator.resolve(pending, credits).await });
        self.in_flight.push(task);
        Ok(Vec::new())
    }
}
