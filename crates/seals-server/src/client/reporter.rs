use std::sync::Arc;

use parking_lot::Mutex;
use seals_core::{ProgressDelta, TeamProgress};
use uuid::Uuid;

use super::notifier::{Notifier, Severity};
use super::optimistic::{OptimisticProgress, WriteId, WriteState};
use crate::common::ProtocolError;
use crate::config::GameConfig;
use crate::service::{ProgressProtocol, ProgressReceipt};

pub const UNSAVED_WARNING: &str =
    "Your progress may not be saved. Check your connection; it stays on this device.";

#[derive(Debug)]
pub enum ReportOutcome {
    Confirmed(Box<ProgressReceipt>),
    /// Every attempt hit a transient store failure. The delta stays in the
    /// local view.
    Abandoned { attempts: u32, error: ProtocolError },
}

/// Reports one team's progress: optimistic local apply, then commit with
/// bounded linear backoff on transient failures.
pub struct ProgressReporter {
    protocol: Arc<dyn ProgressProtocol>,
    notifier: Arc<dyn Notifier>,
    session_id: String,
    team_id: String,
    config: GameConfig,
    local: Mutex<OptimisticProgress>,
}

impl ProgressReporter {
    pub fn new(
        protocol: Arc<dyn ProgressProtocol>,
        notifier: Arc<dyn Notifier>,
        config: &GameConfig,
        session_id: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            notifier,
            session_id: session_id.into(),
            team_id: team_id.into(),
            config: config.clone(),
            local: Mutex::new(OptimisticProgress::default()),
        }
    }

    /// What the player sees right now.
    pub fn view(&self) -> TeamProgress {
        self.local.lock().view()
    }

    pub fn write_state(&self, id: WriteId) -> Option<WriteState> {
        self.local.lock().state(id)
    }

    /// Folds in a snapshot pushed by the session listener.
    pub fn reconcile(&self, authoritative: &TeamProgress) {
        self.local.lock().reconcile(authoritative);
    }

    /// Applies `delta` locally and commits it. The delta is stamped with a
    /// write id so retries and resends never count its hints twice.
    pub async fn report(&self, mut delta: ProgressDelta) -> Result<ReportOutcome, ProtocolError> {
        delta
            .write_id
            .get_or_insert_with(|| Uuid::new_v4().to_string());
        let id = self.local.lock().begin(delta.clone());
        self.deliver(id, &delta).await
    }

    /// Resends abandoned writes one by one under their original write ids.
    /// Stops at the first write that is abandoned again.
    pub async fn resend_unsynced(&self) -> Result<Option<ReportOutcome>, ProtocolError> {
        let unsynced = self.local.lock().unsynced();
        let mut last = None;
        for (id, delta) in unsynced {
            let resumed = self.local.lock().resume(id);
            if !resumed {
                continue;
            }
            let outcome = self.deliver(id, &delta).await?;
            let abandoned = matches!(outcome, ReportOutcome::Abandoned { .. });
            last = Some(outcome);
            if abandoned {
                break;
            }
        }
        Ok(last)
    }

    async fn deliver(&self, id: WriteId, delta: &ProgressDelta) -> Result<ReportOutcome, ProtocolError> {
        let mut attempt = 0;
        loop {
            match self
                .protocol
                .commit(&self.session_id, &self.team_id, delta)
                .await
            {
                Ok(receipt) => {
                    self.local.lock().confirm(id, &receipt.team.progress);
                    if attempt > 0 {
                        tracing::info!(team_id = %self.team_id, attempt, "Progress saved after retry");
                    }
                    return Ok(ReportOutcome::Confirmed(Box::new(receipt)));
                }
                Err(err) if err.is_transient() && attempt < self.config.progress_retries => {
                    attempt += 1;
                    self.local.lock().retrying(id, attempt);
                    let delay = self.config.retry_delay(attempt);
                    tracing::warn!(
                        team_id = %self.team_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Progress write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    self.local.lock().abandon(id);
                    tracing::warn!(team_id = %self.team_id, error = %err, "Giving up on progress write");
                    self.notifier.notify(UNSAVED_WARNING, Severity::Warning);
                    return Ok(ReportOutcome::Abandoned {
                        attempts: attempt + 1,
                        error: err,
                    });
                }
                Err(err) => {
                    self.local.lock().reject(id);
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use seals_core::{
        GameSession, PuzzleProvider, RoomCode, SealPuzzleProvider, SessionStatus, Team, TeamStatus,
    };

    use super::*;
    use crate::client::notifier::testing::RecordingNotifier;
    use crate::common::paths;
    use crate::service::StoreProgress;
    use crate::store::testing::FlakyStore;
    use crate::store::{MemoryStore, Store};

    async fn seeded() -> Arc<FlakyStore> {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let mut session = GameSession::new(
            "game-1".into(),
            RoomCode::parse("ABC234").unwrap(),
            "Friday".into(),
            2,
            0,
        );
        let mut team = Team::new_host("eagles".into(), "Eagles".into(), 3, String::new(), 0);
        team.status = TeamStatus::Playing;
        session.teams.insert(team.id.clone(), team);
        session.status = SessionStatus::Playing;
        session.puzzle_set = Some(SealPuzzleProvider::default().generate("game-1"));
        store
            .inner
            .set(&paths::game("game-1"), serde_json::to_value(&session).unwrap())
            .await
            .unwrap();
        store
    }

    fn reporter(store: Arc<FlakyStore>, notifier: Arc<RecordingNotifier>) -> ProgressReporter {
        let config = GameConfig {
            retry_base_delay: Duration::from_millis(5),
            ..GameConfig::default()
        };
        ProgressReporter::new(
            Arc::new(StoreProgress::new(store)),
            notifier,
            &config,
            "game-1",
            "eagles",
        )
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt_without_duplicates() {
        let store = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = reporter(store.clone(), notifier.clone());

        store.fail_next_writes(2);
        let outcome = reporter
            .report(ProgressDelta::seals([0, 1]))
            .await
            .unwrap();

        let ReportOutcome::Confirmed(receipt) = outcome else {
            panic!("expected the third attempt to succeed");
        };
        assert_eq!(store.write_attempts(), 3);
        assert_eq!(receipt.team.progress.seals_completed.len(), 2);
        assert_eq!(notifier.count(Severity::Warning), 0);

        let session: GameSession = serde_json::from_value(
            store.inner.get(&paths::game("game-1")).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(
            session.teams["eagles"].progress.seals_completed,
            BTreeSet::from([0, 1])
        );
        assert_eq!(reporter.view(), session.teams["eagles"].progress);
    }

    #[tokio::test]
    async fn test_abandons_after_retries_and_warns() {
        let store = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = reporter(store.clone(), notifier.clone());

        store.fail_next_writes(10);
        let outcome = reporter.report(ProgressDelta::seals([4])).await.unwrap();

        assert!(matches!(outcome, ReportOutcome::Abandoned { attempts: 4, .. }));
        assert_eq!(store.write_attempts(), 4);
        assert_eq!(notifier.count(Severity::Warning), 1);
        assert_eq!(notifier.messages()[0].1, UNSAVED_WARNING);
        // Still visible locally.
        assert!(reporter.view().seals_completed.contains(&4));
        assert_eq!(reporter.write_state(0), Some(WriteState::Abandoned));

        store.fail_next_writes(0);
        let resent = reporter.resend_unsynced().await.unwrap();
        assert!(matches!(resent, Some(ReportOutcome::Confirmed(_))));
        assert_eq!(reporter.write_state(0), Some(WriteState::Confirmed));
        assert!(reporter.resend_unsynced().await.unwrap().is_none());
    }

    async fn stored_progress(store: &FlakyStore) -> TeamProgress {
        let session: GameSession = serde_json::from_value(
            store.inner.get(&paths::game("game-1")).await.unwrap().unwrap(),
        )
        .unwrap();
        session.teams["eagles"].progress.clone()
    }

    #[tokio::test]
    async fn test_resent_hints_are_counted_once() {
        let store = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = reporter(store.clone(), notifier);

        store.fail_next_writes(10);
        let outcome = reporter
            .report(ProgressDelta::seals([0]).with_hints(1))
            .await
            .unwrap();
        assert!(matches!(outcome, ReportOutcome::Abandoned { .. }));

        store.fail_next_writes(0);
        let first = reporter.resend_unsynced().await.unwrap();
        assert!(matches!(first, Some(ReportOutcome::Confirmed(_))));
        assert!(reporter.resend_unsynced().await.unwrap().is_none());

        assert_eq!(stored_progress(&store).await.hints_used, 1);
        assert_eq!(reporter.view().hints_used, 1);
        assert_eq!(reporter.write_state(0), Some(WriteState::Confirmed));
    }

    #[tokio::test]
    async fn test_retry_after_lost_ack_keeps_hints_intact() {
        let store = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = reporter(store.clone(), notifier);

        store.lose_next_acks(1);
        let outcome = reporter
            .report(ProgressDelta::seals([3]).with_hints(1))
            .await
            .unwrap();

        assert!(matches!(outcome, ReportOutcome::Confirmed(_)));
        assert_eq!(store.write_attempts(), 2);
        assert_eq!(stored_progress(&store).await.hints_used, 1);
        assert_eq!(reporter.view().hints_used, 1);
    }

    #[tokio::test]
    async fn test_resend_stops_when_store_is_still_down() {
        let store = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = reporter(store.clone(), notifier.clone());

        store.fail_next_writes(100);
        reporter.report(ProgressDelta::seals([1]).with_hints(2)).await.unwrap();
        reporter.report(ProgressDelta::seals([2])).await.unwrap();

        let resent = reporter.resend_unsynced().await.unwrap();
        assert!(matches!(resent, Some(ReportOutcome::Abandoned { .. })));
        // Only the oldest write was retried.
        assert_eq!(store.write_attempts(), 12);
        assert_eq!(reporter.write_state(1), Some(WriteState::Abandoned));
        assert_eq!(notifier.count(Severity::Warning), 3);
        assert_eq!(reporter.view().hints_used, 2);

        store.fail_next_writes(0);
        reporter.resend_unsynced().await.unwrap();
        let stored = stored_progress(&store).await;
        assert_eq!(stored.hints_used, 2);
        assert_eq!(stored.seals_completed, BTreeSet::from([1, 2]));
        assert_eq!(reporter.view(), stored);
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_retried() {
        let store = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = reporter(store.clone(), notifier);

        let err = reporter.report(ProgressDelta::seals([42])).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidProgress(_)));
        assert!(reporter.view().seals_completed.is_empty());
        assert_eq!(store.write_attempts(), 1);
    }
}
