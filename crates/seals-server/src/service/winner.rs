//! Winner determination and game lock.
//!
//! The first team whose transaction flips a playing session to finished wins.
//! Every later finisher runs the same transaction, sees the winner already
//! recorded and is ranked `Completed` instead. Completion timestamps play no
//! part in arbitration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use seals_core::{
    AnnouncedWinner, EndReason, GameMode, GameSession, ProgressDelta, SessionStatus, TeamStatus,
    WinnerAnnouncement, WinnerRecord, format_elapsed, score,
};
use serde_json::Value;

use super::{Leaderboard, ProgressProtocol, ProgressReceipt, RoomRegistry, update_session};
use crate::common::{ProtocolError, paths};
use crate::config::GameConfig;
use crate::store::{Store, TxnDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinnerOutcome {
    /// This team flipped the session to finished.
    Won(WinnerRecord),
    /// Another team already won; this one is ranked `Completed`.
    RaceLost { winner: WinnerRecord },
    /// The host ended the game without a winner; ranked `Completed`.
    NoContest,
    /// Session is paused. Nothing recorded until the next report.
    Deferred,
    AlreadyRecorded,
    Incomplete,
}

impl WinnerOutcome {
    pub fn is_winner(&self) -> bool {
        matches!(self, WinnerOutcome::Won(_))
    }

    fn ranks_team(&self) -> bool {
        matches!(
            self,
            WinnerOutcome::Won(_) | WinnerOutcome::RaceLost { .. } | WinnerOutcome::NoContest
        )
    }
}

#[derive(Clone)]
pub struct WinnerProtocol {
    store: Arc<dyn Store>,
    registry: RoomRegistry,
    leaderboard: Leaderboard,
    announcement_window: Duration,
}

impl WinnerProtocol {
    pub fn new(
        store: Arc<dyn Store>,
        registry: RoomRegistry,
        leaderboard: Leaderboard,
        config: &GameConfig,
    ) -> Self {
        Self {
            store,
            registry,
            leaderboard,
            announcement_window: config.announcement_window,
        }
    }

    /// Decides the standing of a team that has completed every seal.
    ///
    /// The status check, the winner write, the lock and the announcement are
    /// one transaction on the session record. Follow-up bookkeeping (room code
    /// release, leaderboard, announcement expiry) is best effort and never
    /// fails the call.
    pub async fn determine(
        &self,
        session_id: &str,
        team_id: &str,
    ) -> Result<(WinnerOutcome, GameSession), ProtocolError> {
        let now = self.store.server_time();
        let window_ms = i64::try_from(self.announcement_window.as_millis()).unwrap_or(i64::MAX);

        let (outcome, session) = update_session(self.store.as_ref(), session_id, |session| {
            let outcome = decide(session, team_id, now, window_ms)?;
            Ok((outcome, session.clone()))
        })
        .await?;

        match &outcome {
            WinnerOutcome::Won(record) => {
                tracing::info!(
                    session_id = %session_id,
                    team_id = %record.team_id,
                    team_name = %record.team_name,
                    completion_time_ms = record.completion_time_ms,
                    score = record.score,
                    "Winner declared, session locked"
                );
                if let Some(announcement) = &session.winner_announcement {
                    self.schedule_announcement_cleanup(session_id, announcement.timestamp);
                }
                if let Err(err) = self.registry.release(&session.room_code, session_id).await {
                    tracing::warn!(session_id = %session_id, error = %err, "Failed to release room code");
                }
            }
            WinnerOutcome::RaceLost { winner } => {
                tracing::info!(
                    session_id = %session_id,
                    team_id = %team_id,
                    winner = %winner.team_name,
                    "Team completed after the winner"
                );
            }
            other => {
                tracing::debug!(session_id = %session_id, team_id = %team_id, outcome = ?other, "No standing recorded");
            }
        }

        if outcome.ranks_team()
            && let Some(team) = session.team(team_id)
            && let Err(err) = self.leaderboard.record(team, GameMode::Multiplayer).await
        {
            tracing::warn!(session_id = %session_id, team_id = %team_id, error = %err, "Failed to record leaderboard entry");
        }

        Ok((outcome, session))
    }

    /// Removes the announcement once its display window has passed, unless a
    /// newer one replaced it.
    fn schedule_announcement_cleanup(&self, session_id: &str, timestamp: i64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let window = self.announcement_window;
        let path = paths::winner_announcement(session_id);

        runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let result = store
                .transaction(&path, &mut |current| match current {
                    Some(current)
                        if current.get("timestamp").and_then(Value::as_i64) == Some(timestamp) =>
                    {
                        TxnDecision::Commit(Value::Null)
                    }
                    _ => TxnDecision::Abort,
                })
                .await;
            match result {
                Ok(result) if result.committed => tracing::debug!(path = %path, "Winner announcement expired"),
                Ok(_) => {}
                Err(err) => tracing::warn!(path = %path, error = %err, "Failed to expire winner announcement"),
            }
        });
    }
}

fn decide(
    session: &mut GameSession,
    team_id: &str,
    now: i64,
    window_ms: i64,
) -> Result<WinnerOutcome, ProtocolError> {
    let puzzle_count = session.puzzle_count();
    let status = session.status;
    let current_winner = session.winner.clone();

    let team = session.team_mut(team_id).ok_or(ProtocolError::TeamNotFound)?;
    if !team.progress.is_complete(puzzle_count) {
        return Ok(WinnerOutcome::Incomplete);
    }
    if team.has_finished() {
        return Ok(WinnerOutcome::AlreadyRecorded);
    }
    if matches!(status, SessionStatus::Waiting | SessionStatus::Paused) {
        return Ok(WinnerOutcome::Deferred);
    }

    let elapsed = team.progress.elapsed_ms(now);
    team.progress.completion_time = Some(elapsed);
    team.score = score(&team.progress, elapsed);

    let outcome = match (status, current_winner) {
        (SessionStatus::Playing, None) => {
            team.status = TeamStatus::Winner;
            WinnerOutcome::Won(WinnerRecord {
                team_id: team.id.clone(),
                team_name: team.name.clone(),
                completion_time_ms: elapsed,
                score: team.score,
            })
        }
        (_, Some(winner)) => {
            team.status = TeamStatus::Completed;
            WinnerOutcome::RaceLost { winner }
        }
        (_, None) => {
            team.status = TeamStatus::Completed;
            WinnerOutcome::NoContest
        }
    };

    if let WinnerOutcome::Won(record) = &outcome {
        let time_formatted = format_elapsed(elapsed);
        session.status = SessionStatus::Finished;
        session.ended_at = Some(now);
        session.end_reason = Some(EndReason::Winner);
        session.winner = Some(record.clone());
        session.lock(
            now,
            format!("{} broke all the seals. The game is over.", record.team_name),
        );
        session.winner_announcement = Some(WinnerAnnouncement {
            message: format!("{} wins in {time_formatted}!", record.team_name),
            winner: AnnouncedWinner {
                name: record.team_name.clone(),
                completion_time: elapsed,
                time_formatted,
            },
            timestamp: now,
            expires_at: now.saturating_add(window_ms),
        });
    }
    Ok(outcome)
}

/// Runs winner determination after every report that completes a team's
/// puzzle set.
pub struct WinnerDetection<P> {
    inner: P,
    winner: WinnerProtocol,
}

impl<P: ProgressProtocol> WinnerDetection<P> {
    pub fn new(inner: P, winner: WinnerProtocol) -> Self {
        Self { inner, winner }
    }
}

#[async_trait]
impl<P: ProgressProtocol> ProgressProtocol for WinnerDetection<P> {
    async fn commit(
        &self,
        session_id: &str,
        team_id: &str,
        delta: &ProgressDelta,
    ) -> Result<ProgressReceipt, ProtocolError> {
        let mut receipt = self.inner.commit(session_id, team_id, delta).await?;
        if !receipt.needs_standing() {
            return Ok(receipt);
        }

        // The progress itself is committed at this point; a failure here
        // must not turn the report into an error.
        match self.winner.determine(session_id, team_id).await {
            Ok((outcome, session)) => {
                if let Some(team) = session.team(team_id) {
                    receipt.team = team.clone();
                }
                receipt.session = session;
                receipt.winner = Some(outcome);
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    team_id = %team_id,
                    error = %err,
                    "Winner determination failed"
                );
            }
        }
        Ok(receipt)
    }
}
