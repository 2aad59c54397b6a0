use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Single-shot event shared by the supervisor and every engine (§4.4, §9):
/// once tripped it cannot be reset, and every waiter proceeds past it
/// exactly once, whether it was already tripped or not yet.
#[derive(Default)]
pub struct ReleaseLatch {
    fired: AtomicBool,
    notify: Notify,
}

impl ReleaseLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    pub fn is_tripped(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_proceed_once_latch_is_tripped() {
        let latch = Arc::new(ReleaseLatch::new());
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let latch = latch.clone();
            waiters.push(tokio::spawn(async move {
                latch.wait().await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        latch.trip();
        for w in waiters {
            tokio::time::timeout(Duration::from_secs(1), w).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn wait_after_trip_returns_immediately() {
        let latch = ReleaseLatch::new();
        latch.trip();
        tokio::time::timeout(Duration::from_millis(50), latch.wait()).await.unwrap();
    }
}
