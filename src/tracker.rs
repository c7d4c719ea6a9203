//! Outstanding connection tracking.
//!
//! Every accepted connection holds a [`ConnectionGuard`] for the lifetime of
//! its handler task. Dropping the guard releases the slot, so the count is
//! decremented exactly once whether the handler returns normally, fails, or
//! panics. Shutdown waits on [`ConnectionTracker::wait_idle`].

use std::sync::Arc;
use tokio::sync::watch;

/// Counts active connection handlers.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Register a new handler. The returned guard must move into the task.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|n| *n += 1);
        ConnectionGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of handlers currently running.
    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Resolve once no handler is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot held by one connection handler.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_track_and_release() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active(), 0);

        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.active(), 2);

        drop(a);
        assert_eq!(tracker.active(), 1);
        drop(b);
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn test_clones_share_count() {
        let tracker = ConnectionTracker::new();
        let other = tracker.clone();

        let guard = other.track();
        assert_eq!(tracker.active(), 1);
        drop(guard);
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn test_wait_idle_ready_when_empty() {
        let tracker = ConnectionTracker::new();
        let mut wait = task::spawn(tracker.wait_idle());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_wait_idle_blocks_until_last_guard_drops() {
        let tracker = ConnectionTracker::new();
        let first = tracker.track();
        let second = tracker.track();

        let mut wait = task::spawn(tracker.wait_idle());
        assert_pending!(wait.poll());

        drop(first);
        assert_pending!(wait.poll());

        drop(second);
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_guard_released_from_task() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::task::yield_now().await;
        });

        tracker.wait_idle().await;
        assert_eq!(tracker.active(), 0);
        handle.await.unwrap();
    }
}
