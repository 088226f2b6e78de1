//! Interface to the remote execution substrate.
//!
//! Work is [submitted](RemoteExecutor::submit) without blocking and comes back as a
//! [RemoteHandle] which resolves later, to a value or a [RemoteError].
use std::future::Future;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use thiserror::Error;

use crate::errorhandling::BoxError;
use crate::types::Data;

mod tokio_executor;

pub use tokio_executor::TokioExecutor;

/// Failure of a remote computation, observed when its handle is resolved
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote task failed: {0}")]
    Task(String),
    #[error("Remote task panicked")]
    Panicked,
    #[error("Remote task was cancelled")]
    Cancelled,
}

/// Work could not be handed to the substrate at all
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("No execution context available to run remote tasks")]
    NoRuntime,
}

/// A pending remote computation.
///
/// Handles are clonable and every clone observes the same resolution.
#[derive(Clone)]
pub struct RemoteHandle<O> {
    inner: Shared<BoxFuture<'static, Result<O, RemoteError>>>,
}

impl<O> RemoteHandle<O>
where
    O: Data,
{
    /// Wrap a future resolving to the result of a remote computation
    pub fn new(computation: impl Future<Output = Result<O, RemoteError>> + Send + 'static) -> Self {
        Self {
            inner: computation.boxed().shared(),
        }
    }

    /// A handle which is already resolved to `value`
    pub fn ready(value: O) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// A handle which is already resolved to a failure
    pub fn failed(error: RemoteError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Wait for the computation to finish
    pub async fn resolve(&self) -> Result<O, RemoteError> {
        self.inner.clone().await
    }

    /// The result of the computation if it has already been observed to finish
    pub fn peek(&self) -> Option<Result<O, RemoteError>> {
        self.inner.peek().cloned()
    }
}

impl<O> std::fmt::Debug for RemoteHandle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("resolved", &self.inner.peek().is_some())
            .finish()
    }
}

/// A remote execution substrate
pub trait RemoteExecutor: Send + Sync + 'static {
    /// Schedule `func(item)` for execution and return immediately.
    ///
    /// Errors returned by `func` are not reported here but when the returned handle is
    /// resolved.
    fn submit<I, O, F>(&self, func: F, item: I) -> Result<RemoteHandle<O>, SubmitError>
    where
        I: Send + 'static,
        O: Data,
        F: FnOnce(I) -> Result<O, BoxError> + Send + 'static;
}

/// Something which can be resolved against the remote substrate, i.e. a single
/// [RemoteHandle] or a batch of them.
#[async_trait]
pub trait Gather: Send + Sized + 'static {
    /// What this resolves to
    type Output: Data;

    /// Wait for resolution
    async fn gather(self) -> Result<Self::Output, RemoteError>;
}

#[async_trait]
impl<O> Gather for RemoteHandle<O>
where
    O: Data,
{
    type Output = O;

    async fn gather(self) -> Result<O, RemoteError> {
        self.inner.await
    }
}

/// A batch of handles resolves to the batch of values, or fails as a whole if any one
/// of them fails.
#[async_trait]
impl<O> Gather for Vec<RemoteHandle<O>>
where
    O: Data,
{
    type Output = Vec<O>;

    async fn gather(self) -> Result<Vec<O>, RemoteError> {
        try_join_all(self.into_iter().map(|h| h.inner)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn clones_share_resolution() {
        let (tx, rx) = tokio::sync::oneshot::channel::<i32>();
        let handle = RemoteHandle::new(async move { rx.await.map_err(|_| RemoteError::Cancelled) });
        let clone = handle.clone();
        assert!(handle.peek().is_none());

        tx.send(5).unwrap();
        assert_eq!(clone.resolve().await, Ok(5));
        assert_eq!(handle.peek(), Some(Ok(5)));
    }

    #[tokio::test]
    async fn batch_gather_keeps_order() {
        let slow = RemoteHandle::new(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(1)
        });
        let batch = vec![slow, RemoteHandle::ready(2), RemoteHandle::ready(3)];
        assert_eq!(batch.gather().await, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn batch_gather_fails_as_whole() {
        let batch = vec![
            RemoteHandle::ready(1),
            RemoteHandle::failed(RemoteError::Task("boom".into())),
        ];
        assert_eq!(
            batch.gather().await,
            Err(RemoteError::Task("boom".into()))
        );
    }

    #[tokio::test]
    async fn empty_batch_gathers_empty() {
        let batch: Vec<RemoteHandle<i32>> = Vec::new();
        assert_eq!(batch.gather().await, Ok(vec![]));
    }
}
