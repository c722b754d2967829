//! Fault-injecting store wrapper used by protocol tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{MemoryStore, Store, StoreError, TxnFn, TxnResult, WatchCallback, WatchHandle};

/// Wraps a `MemoryStore`, failing the next `n` writes and counting every
/// write attempt.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub inner: MemoryStore,
    fail_next: AtomicU32,
    lose_acks: AtomicU32,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_next: AtomicU32::new(0),
            lose_acks: AtomicU32::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// The next `n` transactions commit but report a failure to the caller.
    pub fn lose_next_acks(&self, n: u32) {
        self.lose_acks.store(n, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.update(path, patch).await
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        self.check_write()?;
        self.inner.push(path, value).await
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.remove(path).await
    }

    async fn transaction(
        &self,
        path: &str,
        update: &mut TxnFn<'_>,
    ) -> Result<TxnResult, StoreError> {
        self.check_write()?;
        let result = self.inner.transaction(path, update).await?;
        let lost = self
            .lose_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(StoreError::Unavailable("acknowledgement lost".into()));
        }
        Ok(result)
    }

    fn subscribe(&self, path: &str, callback: WatchCallback) -> Result<WatchHandle, StoreError> {
        self.inner.subscribe(path, callback)
    }

    fn unsubscribe(&self, handle: WatchHandle) -> bool {
        self.inner.unsubscribe(handle)
    }

    fn server_time(&self) -> i64 {
        self.inner.server_time()
    }
}
