//! Shared realtime store abstraction.
//!
//! The session protocols only talk to a path-addressed JSON tree with atomic
//! per-path transactions and change watches. `MemoryStore` is the in-process
//! implementation; a hosted realtime database can sit behind the same trait.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

mod memory;
mod path;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use path::StorePath;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Network-style failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Decision returned by a transaction update function.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnDecision {
    /// Replace the value at the path. `Value::Null` removes it.
    Commit(Value),
    /// Leave the value untouched.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxnResult {
    pub committed: bool,
    /// Value at the path after the transaction.
    pub snapshot: Option<Value>,
}

/// Transaction update function. It may be invoked more than once by stores
/// that retry on contention, so it must not have side effects beyond
/// recording its latest decision.
pub type TxnFn<'a> = dyn FnMut(Option<Value>) -> TxnDecision + Send + 'a;

pub type WatchCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub(crate) u64);

/// Sentinels the store resolves at write time.
pub struct ServerValue;

impl ServerValue {
    const KEY: &'static str = ".sv";

    /// Replaced by the store's own clock when written.
    pub fn timestamp() -> Value {
        serde_json::json!({ ".sv": "timestamp" })
    }

    pub(crate) fn is_timestamp(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.len() == 1 && obj.get(Self::KEY) == Some(&Value::from("timestamp")))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Shallow merge of `patch` into the object at `path`.
    async fn update(&self, path: &str, patch: Map<String, Value>) -> Result<(), StoreError>;

    /// Appends under a generated, time-ordered key and returns the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Atomic read-modify-write of the value at `path`.
    async fn transaction(&self, path: &str, update: &mut TxnFn<'_>)
    -> Result<TxnResult, StoreError>;

    /// Watches `path`. The callback receives the new value after every write
    /// that changes it; the current value is not replayed.
    fn subscribe(&self, path: &str, callback: WatchCallback) -> Result<WatchHandle, StoreError>;

    /// Returns false when the handle was not registered.
    fn unsubscribe(&self, handle: WatchHandle) -> bool;

    /// Store clock in milliseconds since the epoch, never decreasing.
    fn server_time(&self) -> i64;
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for deterministic timestamps.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Reads and deserializes the value at `path`.
pub async fn get_typed<T: serde::de::DeserializeOwned>(
    store: &dyn Store,
    path: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}
