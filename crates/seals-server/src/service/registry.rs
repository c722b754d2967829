//! Room code index: `roomCodes/{code} -> sessionId`.

use std::sync::Arc;

use seals_core::{GameSession, RoomCode, SessionId};
use serde_json::Value;

use crate::common::{ProtocolError, paths};
use crate::store::{Store, TxnDecision, get_typed};

pub type CodeGenerator = Arc<dyn Fn() -> RoomCode + Send + Sync>;

#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn Store>,
    max_attempts: u32,
    generate: CodeGenerator,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self::with_generator(
            store,
            max_attempts,
            Arc::new(|| RoomCode::generate(&mut rand::rng())),
        )
    }

    pub fn with_generator(store: Arc<dyn Store>, max_attempts: u32, generate: CodeGenerator) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            generate,
        }
    }

    /// Reserves a fresh code for `session_id`.
    ///
    /// A code already mapped to an active session is a collision and a new
    /// code is drawn. A mapping left behind by a finished or missing session
    /// is stale and may be taken over.
    pub async fn claim(&self, session_id: &str) -> Result<RoomCode, ProtocolError> {
        for attempt in 1..=self.max_attempts {
            let code = (self.generate)();
            let path = paths::room_code(code.as_str());

            let result = self
                .store
                .transaction(&path, &mut |current| match current {
                    None => TxnDecision::Commit(Value::from(session_id)),
                    Some(_) => TxnDecision::Abort,
                })
                .await?;
            if result.committed {
                return Ok(code);
            }

            let Some(holder) = result.snapshot.as_ref().and_then(Value::as_str) else {
                continue;
            };
            if self.is_active(holder).await? {
                tracing::debug!(code = %code, attempt, "Room code collision");
                continue;
            }

            let holder = holder.to_string();
            let takeover = self
                .store
                .transaction(&path, &mut |current| match current {
                    Some(Value::String(id)) if id == holder => {
                        TxnDecision::Commit(Value::from(session_id))
                    }
                    _ => TxnDecision::Abort,
                })
                .await?;
            if takeover.committed {
                tracing::debug!(code = %code, stale_session = %holder, "Reclaimed stale room code");
                return Ok(code);
            }
        }
        Err(ProtocolError::CodeExhausted(self.max_attempts))
    }

    /// Point lookup of the session a code maps to.
    pub async fn find(&self, code: &RoomCode) -> Result<Option<SessionId>, ProtocolError> {
        Ok(get_typed(self.store.as_ref(), &paths::room_code(code.as_str())).await?)
    }

    /// Drops the mapping if it still points at `session_id`.
    pub async fn release(&self, code: &RoomCode, session_id: &str) -> Result<bool, ProtocolError> {
        let result = self
            .store
            .transaction(&paths::room_code(code.as_str()), &mut |current| match current {
                Some(Value::String(id)) if id == session_id => TxnDecision::Commit(Value::Null),
                _ => TxnDecision::Abort,
            })
            .await?;
        Ok(result.committed)
    }

    async fn is_active(&self, session_id: &str) -> Result<bool, ProtocolError> {
        let session: Option<GameSession> =
            get_typed(self.store.as_ref(), &paths::game(session_id)).await?;
        Ok(session.is_some_and(|s| s.is_active()))
    }
}
