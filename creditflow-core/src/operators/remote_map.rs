use std::sync::Arc;

use tracing::{error, trace};

use crate::channels::{Downstream, Node};
use crate::credit::Credits;
use crate::errorhandling::{BoxError, OperatorError, TransformError};
use crate::remote::{RemoteExecutor, RemoteHandle};
use crate::types::{Batch, Data};

type RemoteFn<V, VO> = Arc<dyn Fn(V) -> Result<VO, BoxError> + Send + Sync>;

/// Apply a function to every element of every batch in the stream by submitting each
/// element for remote execution.
///
/// Submission does not block: the emitted batch contains one [RemoteHandle] per input
/// element, in input order. Failures of the function only show when the handles are
/// resolved, typically by a downstream [GatherFallback](super::GatherFallback).
/// If the executor refuses a submission the whole call is aborted, logged and the error
/// returned, without emitting anything.
///
/// Like [BatchMapper](super::BatchMapper) this operator passes credits along untouched.
pub struct RemoteBatchMapper<V, VO, E, R> {
    name: String,
    executor: E,
    func: RemoteFn<V, VO>,
    downstream: Downstream<Batch<RemoteHandle<VO>>, R>,
}

impl<V, VO, E, R> RemoteBatchMapper<V, VO, E, R>
where
    V: Data,
    VO: Data,
    E: RemoteExecutor,
{
    /// Create a new operator submitting `func` for every element to `executor`
    pub fn new<Err>(
        name: impl Into<String>,
        executor: E,
        func: impl Fn(V) -> Result<VO, Err> + Send + Sync + 'static,
    ) -> Self
    where
        Err: Into<BoxError>,
    {
        Self {
            name: name.into(),
            executor,
            func: Arc::new(move |x: V| -> Result<VO, BoxError> { func(x).map_err(Into::into) }),
            downstream: Downstream::new(),
        }
    }

    /// Link a node to receive the batches of handles
    pub fn subscribe(&mut self, node: impl Node<Batch<RemoteHandle<VO>>, R>) {
        self.downstream.subscribe(node)
    }

    /// Name of this operator
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V, VO, E, R> Node<Batch<V>, R> for RemoteBatchMapper<V, VO, E, R>
where
    V: Data,
    VO: Data,
    E: RemoteExecutor,
    R: Send + 'static,
{
    fn update(&mut self, batch: Batch<V>, credits: Credits) -> Result<Vec<R>, OperatorError> {
        let handles: Result<Batch<RemoteHandle<VO>>, _> = batch
            .into_iter()
            .map(|item| {
                let func = Arc::clone(&self.func);
                self.executor.submit(move |x| func(x), item)
            })
            .collect();
        // handles submitted before a failure are abandoned, their tasks
        // are the executor's business
        let handles = handles.map_err(|source| {
            error!(operator = %self.name, error = %source, "remote submission failed");
            TransformError::Submit {
                operator: self.name.clone(),
                source,
            }
        })?;
        trace!(operator = %self.name, submitted = handles.len(), "submitted batch");
        self.downstream.emit(handles, &credits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::credit::CountingLedger;
    use crate::remote::{Gather, RemoteError, SubmitError, TokioExecutor};
    use crate::sinks::VecSink;

    /// An executor which accepts a fixed number of submissions, running them inline
    #[derive(Clone)]
    struct LimitedExecutor {
        remaining: Arc<AtomicUsize>,
    }

    impl RemoteExecutor for LimitedExecutor {
        fn submit<I, O, F>(&self, func: F, item: I) -> Result<RemoteHandle<O>, SubmitError>
        where
            I: Send + 'static,
            O: Data,
            F: FnOnce(I) -> Result<O, BoxError> + Send + 'static,
        {
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |x| x.checked_sub(1))
                .map_err(|_| SubmitError::NoRuntime)?;
            Ok(match func(item) {
                Ok(x) => RemoteHandle::ready(x),
                Err(e) => RemoteHandle::failed(RemoteError::Task(e.to_string())),
            })
        }
    }

    #[tokio::test]
    async fn emits_handles_in_order() {
        let ledger = CountingLedger::new();
        let sink = VecSink::new();
        let mut mapper = RemoteBatchMapper::new("square", TokioExecutor::current(), |x: i32| {
            Ok::<_, BoxError>(x * x)
        });
        mapper.subscribe(sink.clone());

        let credits = ledger.issue_many(1);
        mapper.update(vec![1, 2, 3], credits.clone()).unwrap();

        let emitted = sink.drain_vec(..);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].credits, credits);
        assert_eq!(ledger.stats().retains, 0);

        let handles = emitted.into_iter().next().unwrap().payload;
        assert_eq!(handles.gather().await, Ok(vec![1, 4, 9]));
    }

    /// Function failures do not surface at submission but on resolution
    #[tokio::test]
    async fn function_failure_surfaces_later() {
        let sink = VecSink::new();
        let mut mapper = RemoteBatchMapper::new("fails", TokioExecutor::current(), |x: i32| {
            if x == 2 {
                Err("two is not allowed")
            } else {
                Ok(x)
            }
        });
        mapper.subscribe(sink.clone());

        mapper.update(vec![1, 2], Credits::none()).unwrap();
        let mut handles = sink.drain_payloads().pop().unwrap();
        let failed = handles.pop().unwrap();
        assert_eq!(
            failed.resolve().await,
            Err(RemoteError::Task("two is not allowed".into()))
        );
        assert_eq!(handles.pop().unwrap().resolve().await, Ok(1));
    }

    #[test]
    fn submission_failure_aborts() {
        let sink: VecSink<Batch<RemoteHandle<i32>>> = VecSink::new();
        let executor = LimitedExecutor {
            remaining: Arc::new(AtomicUsize::new(2)),
        };
        let mut mapper = RemoteBatchMapper::new("limited", executor, |x: i32| Ok::<_, BoxError>(x));
        mapper.subscribe(sink.clone());

        let err = mapper.update(vec![1, 2, 3], Credits::none()).unwrap_err();
        assert!(matches!(
            err,
            OperatorError::Transform(TransformError::Submit {
                source: SubmitError::NoRuntime,
                ..
            })
        ));
        assert!(sink.is_empty());
    }

    /// Without an async runtime the tokio executor can not accept work
    #[test]
    fn no_runtime_aborts() {
        let sink: VecSink<Batch<RemoteHandle<i32>>> = VecSink::new();
        let mut mapper =
            RemoteBatchMapper::new("detached", TokioExecutor::current(), |x: i32| Ok::<_, BoxError>(x));
        mapper.subscribe(sink.clone());
        assert!(mapper.update(vec![1], Credits::none()).is_err());
        // an empty batch needs no runtime
        mapper.update(vec![], Credits::none()).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
