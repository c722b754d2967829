//! Store-backed session protocols.

use seals_core::GameSession;
use serde_json::Value;

use crate::common::{ProtocolError, paths};
use crate::store::{Store, StoreError, TxnDecision};

pub mod leaderboard;
pub mod progress;
pub mod registry;
pub mod session;
pub mod winner;

pub use leaderboard::Leaderboard;
pub use progress::{ProgressProtocol, ProgressReceipt, StoreProgress};
pub use registry::RoomRegistry;
pub use session::{CreateSession, JoinSession, Joined, SessionService, StartOutcome};
pub use winner::{WinnerDetection, WinnerOutcome, WinnerProtocol};

/// Runs `apply` against the session record as one atomic read-modify-write.
///
/// `apply` sees the current record and either mutates it (committed as a
/// whole) or returns an error (nothing is written). It may run more than once
/// if the store retries, so it must be free of outside effects.
pub(crate) async fn update_session<T, F>(
    store: &dyn Store,
    session_id: &str,
    mut apply: F,
) -> Result<T, ProtocolError>
where
    T: Send,
    F: FnMut(&mut GameSession) -> Result<T, ProtocolError> + Send,
{
    let mut outcome: Option<Result<T, ProtocolError>> = None;
    let mut txn = |current: Option<Value>| match decide(current, &mut apply) {
        Ok((value, next)) => {
            outcome = Some(Ok(value));
            TxnDecision::Commit(next)
        }
        Err(err) => {
            outcome = Some(Err(err));
            TxnDecision::Abort
        }
    };
    let result = store.transaction(&paths::game(session_id), &mut txn).await?;

    match outcome {
        Some(Ok(value)) if result.committed => Ok(value),
        Some(Err(err)) => Err(err),
        _ => Err(StoreError::Unavailable(format!("transaction on session {session_id} did not apply")).into()),
    }
}

fn decide<T, F>(current: Option<Value>, apply: &mut F) -> Result<(T, Value), ProtocolError>
where
    F: FnMut(&mut GameSession) -> Result<T, ProtocolError>,
{
    let current = current.ok_or(ProtocolError::SessionNotFound)?;
    let mut session: GameSession = serde_json::from_value(current).map_err(StoreError::from)?;
    let value = apply(&mut session)?;
    let next = serde_json::to_value(&session).map_err(StoreError::from)?;
    Ok((value, next))
}

pub(crate) async fn load_session(
    store: &dyn Store,
    session_id: &str,
) -> Result<GameSession, ProtocolError> {
    crate::store::get_typed(store, &paths::game(session_id))
        .await?
        .ok_or(ProtocolError::SessionNotFound)
}
