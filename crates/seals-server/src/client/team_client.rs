use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use seals_core::{GameSession, ProgressDelta, SessionStatus, TeamProgress};

use super::listener::{SessionHandlers, SessionListener};
use super::notifier::{Notifier, Severity};
use super::reporter::{ProgressReporter, ReportOutcome};
use crate::common::ProtocolError;
use crate::config::GameConfig;
use crate::service::ProgressProtocol;
use crate::store::Store;

/// One team's view of a running session.
///
/// Wires the listener to the reporter: pushed snapshots reconcile the local
/// progress view, a winner announcement is shown once, and the lock signal
/// stops further reports before they reach the store.
pub struct TeamClient {
    session_id: String,
    team_id: String,
    reporter: Arc<ProgressReporter>,
    listener: SessionListener,
    locked: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<GameSession>>>,
}

impl TeamClient {
    pub fn connect(
        store: Arc<dyn Store>,
        protocol: Arc<dyn ProgressProtocol>,
        notifier: Arc<dyn Notifier>,
        config: &GameConfig,
        session_id: &str,
        team_id: &str,
    ) -> Result<Self, ProtocolError> {
        let reporter = Arc::new(ProgressReporter::new(
            protocol,
            Arc::clone(&notifier),
            config,
            session_id,
            team_id,
        ));
        let locked = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(None));

        let handlers = {
            let (reporter, latest, locked) = (reporter.clone(), latest.clone(), locked.clone());
            let owner = team_id.to_string();
            let winner_notifier = Arc::clone(&notifier);
            let lock_notifier = Arc::clone(&notifier);
            let lock_flag = Arc::clone(&locked);

            SessionHandlers::default()
                .on_change(move |session: Option<GameSession>| {
                    if let Some(session) = &session {
                        if let Some(team) = session.team(&owner) {
                            reporter.reconcile(&team.progress);
                        }
                        if session.locked {
                            locked.store(true, Ordering::SeqCst);
                        }
                    }
                    *latest.lock() = session;
                })
                .on_winner(move |announcement| {
                    winner_notifier.notify(&announcement.message, Severity::Success);
                })
                .on_lock(move |signal| {
                    lock_flag.store(true, Ordering::SeqCst);
                    lock_notifier.notify(&signal.message, Severity::Info);
                })
        };

        let listener = SessionListener::new(store);
        listener.subscribe(session_id, handlers)?;

        Ok(Self {
            session_id: session_id.to_string(),
            team_id: team_id.to_string(),
            reporter,
            listener,
            locked,
            latest,
        })
    }

    /// Reports solved seals. Once the session is locked nothing is sent.
    pub async fn report(&self, delta: ProgressDelta) -> Result<ReportOutcome, ProtocolError> {
        if self.is_locked() {
            tracing::debug!(session_id = %self.session_id, team_id = %self.team_id, "Report dropped, session locked");
            return Err(ProtocolError::SessionLocked);
        }
        self.reporter.report(delta).await
    }

    pub fn progress(&self) -> TeamProgress {
        self.reporter.view()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Last session snapshot pushed by the store.
    pub fn session(&self) -> Option<GameSession> {
        self.latest.lock().clone()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.latest.lock().as_ref().map(|s| s.status)
    }

    pub fn disconnect(&self) {
        self.listener.unsubscribe(&self.session_id);
    }
}
