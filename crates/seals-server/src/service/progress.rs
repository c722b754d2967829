use std::sync::Arc;

use async_trait::async_trait;
use seals_core::{GameSession, MergeSummary, ProgressDelta, SessionStatus, Team, TeamStatus};

use super::{WinnerOutcome, update_session};
use crate::common::ProtocolError;
use crate::store::Store;

/// Result of one committed progress report.
#[derive(Debug, Clone)]
pub struct ProgressReceipt {
    /// Session as committed by this report.
    pub session: GameSession,
    pub team: Team,
    pub summary: MergeSummary,
    /// The team shows every seal of the puzzle set.
    pub completed: bool,
    /// Set when winner detection ran for this report.
    pub winner: Option<WinnerOutcome>,
}

impl ProgressReceipt {
    /// A complete team without a final standing yet.
    pub fn needs_standing(&self) -> bool {
        self.completed && !self.team.has_finished()
    }
}

#[async_trait]
pub trait ProgressProtocol: Send + Sync {
    async fn commit(
        &self,
        session_id: &str,
        team_id: &str,
        delta: &ProgressDelta,
    ) -> Result<ProgressReceipt, ProtocolError>;
}

/// Merges progress deltas into `games/{id}/teams/{team}/progress` as one
/// atomic read-modify-write on the session record.
pub struct StoreProgress {
    store: Arc<dyn Store>,
}

impl StoreProgress {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProgressProtocol for StoreProgress {
    async fn commit(
        &self,
        session_id: &str,
        team_id: &str,
        delta: &ProgressDelta,
    ) -> Result<ProgressReceipt, ProtocolError> {
        let receipt = update_session(self.store.as_ref(), session_id, |session| {
            merge(session, team_id, delta)
        })
        .await?;

        if receipt.summary.is_noop() {
            tracing::debug!(session_id = %session_id, team_id = %team_id, "Progress already recorded");
        } else {
            tracing::info!(
                session_id = %session_id,
                team_id = %team_id,
                seals = receipt.team.progress.seals_completed.len(),
                newly_completed = receipt.summary.newly_completed,
                hints = receipt.team.progress.hints_used,
                "Progress committed"
            );
        }
        Ok(receipt)
    }
}

fn merge(
    session: &mut GameSession,
    team_id: &str,
    delta: &ProgressDelta,
) -> Result<ProgressReceipt, ProtocolError> {
    let puzzle_count = session.puzzle_count();
    let status = session.status;
    let locked = session.locked;

    let team = session.team_mut(team_id).ok_or(ProtocolError::TeamNotFound)?;
    if matches!(status, SessionStatus::Waiting | SessionStatus::Paused) {
        return Err(ProtocolError::InvalidTransition {
            action: "report progress",
            status,
        });
    }
    delta.validate(puzzle_count)?;

    let was_complete = team.progress.is_complete(puzzle_count);
    let mut merged = team.progress.clone();
    let summary = merged.apply(delta);
    let completes = !was_complete && merged.is_complete(puzzle_count);

    // A locked session still accepts exact replays and the report that
    // completes a late finisher's set.
    if (locked || status == SessionStatus::Finished) && !summary.is_noop() && !completes {
        return Err(ProtocolError::SessionLocked);
    }

    team.progress = merged;
    if team.status == TeamStatus::Disconnected && status == SessionStatus::Playing {
        team.status = TeamStatus::Playing;
    }
    let team = team.clone();

    Ok(ProgressReceipt {
        completed: team.progress.is_complete(puzzle_count),
        session: session.clone(),
        team,
        summary,
        winner: None,
    })
}
