//! Session change fan-out.
//!
//! Each subscribed session holds three store watches: the session record,
//! the winner announcement and the lock signal. The narrower two fire only
//! when a new record appears, so a winner modal or input lock reacts without
//! waiting on (or being repeated by) general session churn.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use seals_core::{GameSession, LockSignal, SessionId, WinnerAnnouncement};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::common::{ProtocolError, paths};
use crate::store::{Store, WatchCallback, WatchHandle};

pub type SessionCallback = Arc<dyn Fn(Option<GameSession>) + Send + Sync>;
pub type WinnerCallback = Arc<dyn Fn(WinnerAnnouncement) + Send + Sync>;
pub type LockCallback = Arc<dyn Fn(LockSignal) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SessionHandlers {
    /// Every change of the session record; `None` once it is deleted.
    pub on_change: Option<SessionCallback>,
    pub on_winner: Option<WinnerCallback>,
    pub on_lock: Option<LockCallback>,
}

impl SessionHandlers {
    pub fn on_change(mut self, f: impl Fn(Option<GameSession>) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(f));
        self
    }

    pub fn on_winner(mut self, f: impl Fn(WinnerAnnouncement) + Send + Sync + 'static) -> Self {
        self.on_winner = Some(Arc::new(f));
        self
    }

    pub fn on_lock(mut self, f: impl Fn(LockSignal) + Send + Sync + 'static) -> Self {
        self.on_lock = Some(Arc::new(f));
        self
    }
}

pub struct SessionListener {
    store: Arc<dyn Store>,
    active: Mutex<HashMap<SessionId, Vec<WatchHandle>>>,
}

impl SessionListener {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches the three watches for `session_id`, replacing any previous
    /// subscription to the same session.
    pub fn subscribe(&self, session_id: &str, handlers: SessionHandlers) -> Result<(), ProtocolError> {
        self.unsubscribe(session_id);

        let on_change = handlers.on_change;
        let session_watch: WatchCallback = Arc::new(move |value: Option<&Value>| {
            let session = value.and_then(|v| decode::<GameSession>("session", v));
            if let Some(callback) = &on_change {
                callback(session);
            }
        });
        let watches = [
            (paths::game(session_id), session_watch),
            (
                paths::winner_announcement(session_id),
                appearing("winner announcement", handlers.on_winner),
            ),
            (
                paths::lock_signal(session_id),
                appearing("lock signal", handlers.on_lock),
            ),
        ];

        let mut handles = Vec::with_capacity(watches.len());
        for (path, callback) in watches {
            match self.store.subscribe(&path, callback) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        self.store.unsubscribe(handle);
                    }
                    return Err(err.into());
                }
            }
        }

        tracing::debug!(session_id = %session_id, watches = handles.len(), "Subscribed to session");
        self.active.lock().insert(session_id.to_string(), handles);
        Ok(())
    }

    /// Detaches every watch registered for `session_id`. Returns how many
    /// were removed.
    pub fn unsubscribe(&self, session_id: &str) -> usize {
        let Some(handles) = self.active.lock().remove(session_id) else {
            return 0;
        };
        let removed = handles
            .into_iter()
            .filter(|handle| self.store.unsubscribe(*handle))
            .count();
        tracing::debug!(session_id = %session_id, removed, "Unsubscribed from session");
        removed
    }

    pub fn unsubscribe_all(&self) {
        let drained: Vec<_> = self.active.lock().drain().collect();
        for (_, handles) in drained {
            for handle in handles {
                self.store.unsubscribe(handle);
            }
        }
    }

    /// Sessions with live watches.
    pub fn active_sessions(&self) -> usize {
        self.active.lock().len()
    }

    pub fn watch_count(&self) -> usize {
        self.active.lock().values().map(Vec::len).sum()
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// Fires only when a record appears or is replaced, never on removal.
fn appearing<T>(what: &'static str, callback: Option<Arc<dyn Fn(T) + Send + Sync>>) -> WatchCallback
where
    T: DeserializeOwned + 'static,
{
    Arc::new(move |value: Option<&Value>| {
        if let (Some(callback), Some(record)) = (&callback, value.and_then(|v| decode::<T>(what, v))) {
            callback(record);
        }
    })
}

fn decode<T: DeserializeOwned>(what: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::debug!(error = %err, "Ignoring malformed {what}");
            None
        }
    }
}
