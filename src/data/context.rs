use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::errors::{ModelError, ModelResult};

/// Deadline and cancellation signal for one store call.
///
/// Losing the race against either drops the in-flight database future and
/// reports `Timeout`. The statement may still complete on the server, so a
/// write that timed out can have been committed.
#[derive(Debug, Clone)]
pub struct QueryCtx {
    deadline: Instant,
    cancel: CancellationToken,
}

impl QueryCtx {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// A context cancelled together with `parent`.
    pub fn child_of(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: parent.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    pub async fn run<T, F>(&self, fut: F) -> ModelResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("query cancelled");
                Err(ModelError::Timeout)
            }
            res = tokio::time::timeout_at(self.deadline, fut) => match res {
                Ok(inner) => inner.map_err(ModelError::from),
                Err(_) => {
                    warn!("query deadline exceeded");
                    Err(ModelError::Timeout)
                }
            },
        }
    }
}
