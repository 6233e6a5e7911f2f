//! Caller-supplied execution context.
//!
//! Every remote call and build step takes a [`Context`]. The context carries
//! a cancellation signal; when it fires, the in-flight call returns promptly
//! with the caller's `Cancelled` error instead of waiting for completion.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Execution context carrying cancellation.
///
/// Cloning is cheap and clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// Create a context that is never cancelled unless [`Context::cancel`]
    /// is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Derive a child context. Cancelling the parent cancels the child,
    /// but not the other way around.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Signal cancellation to every holder of this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Get the underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast with `cancelled` if the context is already cancelled.
    ///
    /// # Errors
    ///
    /// Returns `cancelled` when cancellation was requested.
    pub fn check<E>(&self, cancelled: E) -> Result<(), E> {
        if self.is_cancelled() {
            Err(cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` to completion unless the context is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `cancelled` if cancellation wins the race, otherwise the
    /// future's own error.
    pub async fn run<T, E, F>(&self, cancelled: E, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(cancelled),
            result = fut => result,
        }
    }
}
