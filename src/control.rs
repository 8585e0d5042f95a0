//! Cooperative cancellation for pipeline runs.
//!
//! Every long-running operation in the pipeline — node execution, refinement
//! iterations, LLM calls — checks a [`CancelToken`] at its suspension points.
//! Cancellation is cooperative: an in-flight LLM call is allowed to complete
//! (providers rarely support mid-call aborts), but nothing new is started and
//! the run unwinds with [`CancelledError`].

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::watch;

/// Raised when a run observes its cancellation signal.
///
/// Carried inside node and pipeline errors so callers can distinguish a
/// cancelled run from a failed one.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("operation cancelled")]
#[diagnostic(code(qasida::control::cancelled))]
pub struct CancelledError;

/// Owning side of a cancellation signal.
///
/// Dropping the handle does *not* cancel outstanding work; only an explicit
/// [`cancel`](Self::cancel) does.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal all associated tokens to stop at their next suspension point.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of a cancellation signal, cheap to clone into tasks.
///
/// # Examples
///
/// ```
/// use qasida::control::CancelToken;
///
/// let (handle, token) = CancelToken::pair();
/// assert!(!token.is_cancelled());
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a linked handle/token pair.
    #[must_use]
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that never fires. Useful for tests and fire-and-forget runs.
    #[must_use]
    pub fn never() -> CancelToken {
        let (tx, rx) = watch::channel(false);
        // A watch receiver keeps returning the last observed value once the
        // sender is gone.
        drop(tx);
        CancelToken { rx }
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Check the signal, failing with [`CancelledError`] if it has fired.
    ///
    /// Call sites are the suspension points named by the pipeline's
    /// concurrency model: between nodes, between refinement iterations and
    /// refiners, and before every LLM call.
    pub fn ensure_active(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}
