use crate::error::{LockstepError, Result};
use crate::memory::Literal;
use crate::types::ReplicaId;
use std::future::Future;
use tokio::task::JoinHandle;

/// A collective instance started by `CollectiveStart`.
///
/// The instance runs in a spawned task; `wait()` is the matching Done. If
/// dropped without waiting, the task is aborted.
pub struct CollectiveHandle {
    inner: Option<JoinHandle<Result<Vec<Literal>>>>,
    replica: ReplicaId,
}

impl CollectiveHandle {
    pub(crate) fn spawn(
        replica: ReplicaId,
        fut: impl Future<Output = Result<Vec<Literal>>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Some(tokio::spawn(fut)),
            replica,
        }
    }

    /// Wait for the instance and return its results.
    pub async fn wait(mut self) -> Result<Vec<Literal>> {
        let Some(handle) = self.inner.take() else {
            return Err(LockstepError::AsyncProtocolViolation {
                replica: Some(self.replica),
                reason: "collective handle already consumed".into(),
            });
        };
        handle.await.map_err(|e| LockstepError::ReplicaPanicked {
            replica: self.replica,
            reason: format!("collective task failed: {e}"),
        })?
    }
}

impl Drop for CollectiveHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.inner {
            handle.abort();
        }
    }
}
