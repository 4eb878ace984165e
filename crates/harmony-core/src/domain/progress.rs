//! Progress reporting and cancellation for long-running operations
//!
//! Every service operation returns a [`PendingOperation`]: a handle that
//! exposes a [`Progress`] (completed/total units plus a cancel action) and
//! resolves exactly once with the operation's outcome.
//!
//! ## Guarantees
//!
//! - The outcome is delivered at most once. It travels through a oneshot
//!   channel, so a late response from an aborted backend call has nowhere
//!   to go.
//! - Cancelling before the backend responds drops the in-flight work and
//!   resolves the operation with the caller-supplied cancellation error.
//!   Cancellation is polled first, so it wins a tie with a response that
//!   arrives in the same wakeup.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ============================================================================
// Progress
// ============================================================================

struct ProgressState {
    total: AtomicU64,
    completed: AtomicU64,
    cancel_token: CancellationToken,
    updates: watch::Sender<(u64, u64)>,
}

/// Observable, cancellable unit-of-work counter
///
/// Cloning yields another handle to the same progress.
#[derive(Clone)]
pub struct Progress {
    state: Arc<ProgressState>,
}

impl Progress {
    /// Creates progress expecting `total` units of work
    #[must_use]
    pub fn discrete(total: u64) -> Self {
        let (updates, _) = watch::channel((0, total));
        Self {
            state: Arc::new(ProgressState {
                total: AtomicU64::new(total),
                completed: AtomicU64::new(0),
                cancel_token: CancellationToken::new(),
                updates,
            }),
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.state.total.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.state.completed.load(Ordering::SeqCst)
    }

    /// Fraction of work done in `0.0..=1.0`
    ///
    /// Zero-unit progress counts as finished.
    #[must_use]
    pub fn fraction_completed(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        (self.completed() as f64 / total as f64).min(1.0)
    }

    /// Replaces the expected total, e.g. once a byte length is known
    pub fn set_total(&self, total: u64) {
        self.state.total.store(total, Ordering::SeqCst);
        self.notify();
    }

    /// Records `units` more units of completed work
    pub fn add_completed(&self, units: u64) {
        self.state.completed.fetch_add(units, Ordering::SeqCst);
        self.notify();
    }

    /// Marks all work as done
    pub fn complete(&self) {
        self.state.completed.store(self.total(), Ordering::SeqCst);
        self.notify();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed() >= self.total()
    }

    /// Requests cancellation of the operation
    pub fn cancel(&self) {
        self.state.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancel_token.is_cancelled()
    }

    /// Token that fires when [`cancel`](Self::cancel) is called
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancel_token.clone()
    }

    /// Subscribes to `(completed, total)` updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<(u64, u64)> {
        self.state.updates.subscribe()
    }

    fn notify(&self) {
        let _ = self.state.updates.send((self.completed(), self.total()));
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("completed", &self.completed())
            .field("total", &self.total())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ============================================================================
// PendingOperation
// ============================================================================

type AbortFn<E> = Arc<dyn Fn() -> E + Send + Sync>;

/// Handle to one outstanding operation
///
/// Await it (or call [`outcome`](Self::outcome)) to receive the result, or
/// register a callback with [`on_completion`](Self::on_completion).
pub struct PendingOperation<T, E> {
    progress: Progress,
    receiver: oneshot::Receiver<Result<T, E>>,
    on_abort: AbortFn<E>,
}

impl<T, E> PendingOperation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Runs `work` on the Tokio runtime under `progress`
    ///
    /// `cancelled` builds the error delivered when the operation is
    /// cancelled (or its task is torn down) before `work` finishes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F, C>(progress: Progress, cancelled: C, work: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        C: Fn() -> E + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let on_abort: AbortFn<E> = Arc::new(cancelled);

        let task_progress = progress.clone();
        let task_abort = Arc::clone(&on_abort);
        tokio::spawn(async move {
            let cancel_token = task_progress.cancellation_token();
            let outcome = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Operation cancelled before completion");
                    Err(task_abort())
                }
                result = work => {
                    task_progress.complete();
                    result
                }
            };
            // The receiver may already be gone if the caller lost interest.
            let _ = sender.send(outcome);
        });

        Self {
            progress,
            receiver,
            on_abort,
        }
    }

    /// The operation's progress
    #[must_use]
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Requests cancellation; the outcome becomes the cancellation error
    /// unless the backend already responded
    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Waits for the single outcome of the operation
    pub async fn outcome(self) -> Result<T, E> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err((self.on_abort)()),
        }
    }

    /// Delivers the outcome to `callback` exactly once, returning the progress
    pub fn on_completion<F>(self, callback: F) -> Progress
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let progress = self.progress.clone();
        tokio::spawn(async move {
            callback(self.outcome().await);
        });
        progress
    }
}

impl<T, E> IntoFuture for PendingOperation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.outcome())
    }
}

impl<T, E> fmt::Debug for PendingOperation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}
