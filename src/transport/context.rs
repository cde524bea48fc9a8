//! Deadline and cancellation scope for a call.
//!
//! # Example
//!
//! ```ignore
//! let ctx = Context::with_timeout(Duration::from_secs(1));
//! let res = outbound.call(&ctx, request).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RpcError};

/// Deadline plus cancellation token.
///
/// Clones share the token: cancelling any clone cancels all of them.
/// [`Context::child`] derives a context that is cancelled with its parent
/// but can also be cancelled on its own.
#[derive(Debug, Clone)]
pub struct Context {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Context {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// Derive a context cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// Derive a child whose deadline is the earlier of the parent's and
    /// `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: Some(match self.deadline {
                Some(existing) if existing < candidate => existing,
                _ => candidate,
            }),
            token: self.token.child_token(),
        }
    }

    pub(crate) fn from_parts(deadline: Option<Instant>, token: CancellationToken) -> Self {
        Self { deadline, token }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(RpcError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if d <= Instant::now()) {
            return Err(RpcError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the token fires or the deadline passes.
    ///
    /// When the context wins, `fut` is dropped, which releases whatever it
    /// held.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RpcError::Cancelled),
            _ = sleep_until(self.deadline) => Err(RpcError::DeadlineExceeded),
            res = fut => res,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::background();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::DeadlineExceeded));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_from_clone() {
        let ctx = Context::background();
        let handle = ctx.clone();

        let task = tokio::spawn(async move {
            ctx.run(std::future::pending::<Result<()>>()).await
        });
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, RpcError::Cancelled));
    }

    #[test]
    fn test_child_follows_parent_but_not_reverse() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_with_timeout_keeps_earlier_deadline() {
        let parent = Context::with_timeout(Duration::from_millis(10));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_check_on_cancelled_context() {
        let ctx = Context::background();
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(RpcError::Cancelled)));
    }
}
