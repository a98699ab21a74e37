//! Cancellable execution scope.
//!
//! A [`Scope`] is what downstream code waits on to learn that the request no
//! longer matters: it carries an optional deadline and a cancellation token.
//! Child scopes inherit both; a child deadline can only be tighter.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope is done.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScopeError {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("context canceled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

impl std::error::Error for ScopeError {}

#[derive(Clone, Debug, Default)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// A fresh root scope with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Child scope expiring after `timeout`, or at the parent's deadline if
    /// that comes first. Cancelling the parent cancels the child.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let requested = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < requested => parent,
            _ => requested,
        };
        Self { token: self.token.child_token(), deadline: Some(deadline) }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Signal everything waiting on this scope (and its children).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// `None` while the scope is live.
    pub fn err(&self) -> Option<ScopeError> {
        if self.token.is_cancelled() {
            Some(ScopeError::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ScopeError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves when the scope is cancelled or its deadline passes.
    pub async fn done(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => ScopeError::Cancelled,
                () = tokio::time::sleep_until(deadline) => ScopeError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ScopeError::Cancelled
            }
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_expires() {
        let scope = Scope::new().with_timeout(Duration::from_millis(10));
        assert_eq!(scope.err(), None);
        assert_eq!(scope.done().await, ScopeError::DeadlineExceeded);
        assert_eq!(scope.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn parent_cancel_reaches_child() {
        let parent = Scope::new();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert_eq!(child.done().await, ScopeError::Cancelled);
    }

    #[test]
    fn child_deadline_never_extends_parent() {
        let parent = Scope::new().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
