//! Cooperative cancellation for long flows.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{WdkError, WdkResult};

/// Triggers an [`AbortSignal`].
#[derive(Debug, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    /// Creates an untriggered controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal observing this controller.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }

    /// Triggers every signal handed out by this controller.
    pub fn abort(&self) {
        self.token.cancel();
    }
}

/// Read side of an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    /// Whether the controller was triggered.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails with [`WdkError::Cancelled`] once triggered.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Cancelled`] naming `operation`.
    pub fn check(&self, operation: &str) -> WdkResult<()> {
        if self.is_aborted() {
            Err(cancelled(operation))
        } else {
            Ok(())
        }
    }

    /// Drives `future` until it completes or the controller fires, whichever
    /// comes first. `future` is dropped on abort.
    ///
    /// # Errors
    ///
    /// Returns [`WdkError::Cancelled`] naming `operation` on abort, otherwise
    /// whatever `future` returns.
    pub async fn race<T, F>(&self, operation: &str, future: F) -> WdkResult<T>
    where
        F: Future<Output = WdkResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(cancelled(operation)),
            result = future => result,
        }
    }
}

fn cancelled(operation: &str) -> WdkError {
    WdkError::Cancelled {
        operation: operation.to_string(),
    }
}
