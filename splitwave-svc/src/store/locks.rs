//! Per-session write exclusion

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// One async mutex per session, created on first use
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.inner.read().await.get(&id) {
            return lock.clone();
        }
        self.inner.write().await.entry(id).or_default().clone()
    }

    /// Wait for exclusive access to a session
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        self.handle(id).await.lock_owned().await
    }

    /// Exclusive access if nobody else holds it right now
    pub async fn try_lock(&self, id: Uuid) -> Option<OwnedMutexGuard<()>> {
        self.handle(id).await.try_lock_owned().ok()
    }

    /// Drop the entry for a session that no longer exists
    pub async fn forget(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_lock_fails_while_held() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.lock(id).await;
        assert!(locks.try_lock(id).await.is_none());
        assert!(locks.try_lock(Uuid::new_v4()).await.is_some());

        drop(guard);
        assert!(locks.try_lock(id).await.is_some());
    }

    #[tokio::test]
    async fn test_forget_removes_entry() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();
        drop(locks.lock(id).await);
        assert_eq!(locks.inner.read().await.len(), 1);
        locks.forget(id).await;
        assert_eq!(locks.inner.read().await.len(), 0);
    }
}
