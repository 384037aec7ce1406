//! Per-execution mutual exclusion.
//!
//! Every state mutation of an execution (advance step, resume, cancel)
//! happens while holding that execution's lock, from reload to persist.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lock table keyed by execution id.
#[derive(Clone, Debug, Default)]
pub struct ExecutionLocks {
    inner: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ExecutionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of an execution.
    pub async fn acquire(&self, execution_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .entry(execution_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the entry when nobody holds or waits on it.
    pub fn forget(&self, execution_id: Uuid) {
        self.inner
            .remove_if(&execution_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of tracked executions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_exclusive() {
        let locks = ExecutionLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_ids_do_not_block() {
        let locks = ExecutionLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_forget_keeps_held_locks() {
        let locks = ExecutionLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        locks.forget(id);
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.forget(id);
        assert!(locks.is_empty());
    }
}
