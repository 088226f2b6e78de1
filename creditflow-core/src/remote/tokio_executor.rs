use tokio::runtime::Handle;
use tracing::trace;

use super::{RemoteError, RemoteExecutor, RemoteHandle, SubmitError};
use crate::errorhandling::BoxError;
use crate::types::Data;

/// Runs remote work on tokio's blocking thread pool.
///
/// By default work goes to the runtime of the calling context, looked up on every
/// submission; submitting outside of a runtime fails with [SubmitError::NoRuntime].
/// Use [TokioExecutor::on] to pin the executor to a specific runtime instead.
#[derive(Debug, Default, Clone)]
pub struct TokioExecutor {
    runtime: Option<Handle>,
}

impl TokioExecutor {
    /// Execute on whichever runtime is current at submission time
    pub fn current() -> Self {
        Self::default()
    }

    /// Always execute on the given runtime
    pub fn on(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
        }
    }
}

impl RemoteExecutor for TokioExecutor {
    fn submit<I, O, F>(&self, func: F, item: I) -> Result<RemoteHandle<O>, SubmitError>
    where
        I: Send + 'static,
        O: Data,
        F: FnOnce(I) -> Result<O, BoxError> + Send + 'static,
    {
        let runtime = match &self.runtime {
            Some(rt) => rt.clone(),
            None => Handle::try_current().map_err(|_| SubmitError::NoRuntime)?,
        };
        let task = runtime.spawn_blocking(move || func(item));
        trace!("submitted remote task");
        Ok(RemoteHandle::new(async move {
            match task.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(RemoteError::Task(e.to_string())),
                Err(e) if e.is_panic() => Err(RemoteError::Panicked),
                Err(_) => Err(RemoteError::Cancelled),
            }
        }))
    }
}
