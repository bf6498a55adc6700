//! Run-level cancellation
//!
//! A token is shared by every in-flight case; each case derives a child so a
//! per-case timeout can cancel that case alone while a run-level cancel
//! reaches all of them.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct TokenState {
    cancelled: AtomicBool,
    notify: watch::Sender<bool>,
}

/// Cancellation token for gracefully stopping a run
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
    parent: Option<Box<CancellationToken>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create a new root token
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                notify: tx,
            }),
            parent: None,
        }
    }

    /// Create a token that is cancelled when either it or `self` is cancelled
    pub fn child(&self) -> Self {
        let mut child = Self::new();
        child.parent = Some(Box::new(self.clone()));
        child
    }

    /// Signal cancellation to all listeners of this token and its children
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.send_replace(true);
    }

    /// Check if cancellation has been requested here or on any ancestor
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Resolves once this token or an ancestor is cancelled
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        async move {
            let mut rx = self.state.notify.subscribe();
            match &self.parent {
                None => {
                    let _ = rx.wait_for(|cancelled| *cancelled).await;
                }
                Some(parent) => {
                    tokio::select! {
                        _ = rx.wait_for(|cancelled| *cancelled) => {}
                        _ = parent.cancelled() => {}
                    }
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_child_sees_parent_cancel() {
        let root = CancellationToken::new();
        let child = root.child();
        assert!(!child.is_cancelled());

        root.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let root = CancellationToken::new();
        let child = root.child();
        child.cancel();

        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let root = CancellationToken::new();
        let child = root.child();

        let waiter = {
            let child = child.clone();
            tokio::spawn(async move { child.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        root.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancellation should wake the waiter")
            .unwrap();
    }

    #[test]
    fn test_cancelled_pending_until_cancel() {
        let token = CancellationToken::new();
        let mut waiter = tokio_test::task::spawn(token.cancelled());

        tokio_test::assert_pending!(waiter.poll());
        token.cancel();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
