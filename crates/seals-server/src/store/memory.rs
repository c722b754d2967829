//! In-process realtime store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::path::{get_in, normalize, set_in};
use super::{
    Clock, Store, StoreError, StorePath, SystemClock, TxnDecision, TxnFn, TxnResult,
    WatchCallback, WatchHandle,
};

struct Watcher {
    path: StorePath,
    callback: WatchCallback,
}

#[derive(Default)]
struct Watchers {
    next_id: u64,
    entries: HashMap<u64, Watcher>,
}

struct Inner {
    root: Mutex<Value>,
    watchers: Mutex<Watchers>,
    clock: Arc<dyn Clock>,
    last_time: AtomicI64,
    push_seq: AtomicU64,
}

/// Pending notification collected under the lock and delivered after it.
struct Notification {
    callback: WatchCallback,
    value: Option<Value>,
}

/// JSON tree guarded by a single lock. Every write, transactions included,
/// is applied atomically; watch callbacks run after the lock is released so
/// they may call back into the store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: Mutex::new(Value::Object(Map::new())),
                watchers: Mutex::new(Watchers::default()),
                clock,
                last_time: AtomicI64::new(i64::MIN),
                push_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live watches, across all paths.
    pub fn watch_count(&self) -> usize {
        self.inner.watchers.lock().entries.len()
    }

    fn now(&self) -> i64 {
        let now = self.inner.clock.now_ms();
        let previous = self.inner.last_time.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    /// Applies `mutate` to the tree under the lock and returns the
    /// notifications it triggered.
    fn write<T>(
        &self,
        path: &StorePath,
        mutate: impl FnOnce(&mut Value) -> T,
    ) -> (T, Vec<Notification>) {
        let mut root = self.inner.root.lock();

        let affected: Vec<(StorePath, WatchCallback, Option<Value>)> = {
            let watchers = self.inner.watchers.lock();
            watchers
                .entries
                .values()
                .filter(|w| w.path.overlaps(path))
                .map(|w| {
                    let before = get_in(&root, &w.path).cloned();
                    (w.path.clone(), Arc::clone(&w.callback), before)
                })
                .collect()
        };

        let result = mutate(&mut root);

        let notifications = affected
            .into_iter()
            .filter_map(|(watch_path, callback, before)| {
                let after = get_in(&root, &watch_path).cloned();
                (after != before).then_some(Notification {
                    callback,
                    value: after,
                })
            })
            .collect();
        (result, notifications)
    }

    fn dispatch(notifications: Vec<Notification>) {
        for notification in notifications {
            (notification.callback)(notification.value.as_ref());
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = StorePath::parse(path)?;
        let root = self.inner.root.lock();
        Ok(get_in(&root, &path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = StorePath::parse(path)?;
        let value = normalize(value, self.now());
        let ((), notifications) = self.write(&path, |root| set_in(root, &path, value));
        Self::dispatch(notifications);
        Ok(())
    }

    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<(), StoreError> {
        let path = StorePath::parse(path)?;
        let now = self.now();
        let children: Vec<(StorePath, Option<Value>)> = patch
            .into_iter()
            .map(|(key, value)| {
                let child = StorePath::parse(&format!("{path}/{key}"))?;
                Ok((child, normalize(value, now)))
            })
            .collect::<Result<_, StoreError>>()?;

        let ((), notifications) = self.write(&path, |root| {
            for (child, value) in children {
                set_in(root, &child, value);
            }
        });
        Self::dispatch(notifications);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let now = self.now();
        let seq = self.inner.push_seq.fetch_add(1, Ordering::SeqCst);
        let key = push_key(now, seq);
        self.set(&format!("{path}/{key}"), value).await?;
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let path = StorePath::parse(path)?;
        if path.is_root() {
            return Err(StoreError::InvalidPath("refusing to remove the root".into()));
        }
        let ((), notifications) = self.write(&path, |root| set_in(root, &path, None));
        Self::dispatch(notifications);
        Ok(())
    }

    async fn transaction(
        &self,
        path: &str,
        update: &mut TxnFn<'_>,
    ) -> Result<TxnResult, StoreError> {
        let path = StorePath::parse(path)?;
        let now = self.now();

        let (result, notifications) = self.write(&path, |root| {
            let current = get_in(root, &path).cloned();
            match update(current.clone()) {
                TxnDecision::Commit(next) => {
                    let next = normalize(next, now);
                    set_in(root, &path, next.clone());
                    TxnResult {
                        committed: true,
                        snapshot: next,
                    }
                }
                TxnDecision::Abort => TxnResult {
                    committed: false,
                    snapshot: current,
                },
            }
        });
        Self::dispatch(notifications);
        Ok(result)
    }

    fn subscribe(&self, path: &str, callback: WatchCallback) -> Result<WatchHandle, StoreError> {
        let path = StorePath::parse(path)?;
        let mut watchers = self.inner.watchers.lock();
        watchers.next_id += 1;
        let id = watchers.next_id;
        watchers.entries.insert(id, Watcher { path, callback });
        Ok(WatchHandle(id))
    }

    fn unsubscribe(&self, handle: WatchHandle) -> bool {
        self.inner.watchers.lock().entries.remove(&handle.0).is_some()
    }

    fn server_time(&self) -> i64 {
        self.now()
    }
}

/// Fixed-width keys so lexical order matches push order.
fn push_key(now: i64, seq: u64) -> String {
    format!("{now:013}{seq:020}")
}
