//! Session lifecycle: create, join, start, pause, resume, end, leave.

use std::sync::Arc;

use seals_core::{
    EndReason, GameSession, PuzzleProvider, PuzzleSet, RoomCode, SessionStatus, Team, TeamStatus,
};
use serde::Deserialize;

use super::{RoomRegistry, load_session, update_session};
use crate::common::{ProtocolError, paths};
use crate::config::GameConfig;
use crate::store::Store;
use crate::util::{clamp, required_str};

pub const DEFAULT_TITLE: &str = "Scroll of Seven Seals";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    #[serde(default)]
    pub title: String,
    pub max_teams: u32,
    pub team_name: String,
    pub team_size: u32,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSession {
    pub room_code: String,
    pub team_name: String,
    pub team_size: u32,
    #[serde(default)]
    pub user_id: String,
}

/// A session together with the caller's own team.
#[derive(Debug, Clone)]
pub struct Joined {
    pub session: GameSession,
    pub team: Team,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub session: GameSession,
    /// False when the session had already been started.
    pub newly_started: bool,
}

pub struct SessionService {
    store: Arc<dyn Store>,
    registry: RoomRegistry,
    puzzles: Arc<dyn PuzzleProvider>,
    config: GameConfig,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn Store>,
        registry: RoomRegistry,
        puzzles: Arc<dyn PuzzleProvider>,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            registry,
            puzzles,
            config,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Creates a lobby with the caller as host team.
    ///
    /// The room code is reserved first; the session record, host team
    /// included, is then written in a single set. If that write fails the
    /// code is released so no hostless session or dangling code remains.
    pub async fn create_session(&self, req: CreateSession) -> Result<Joined, ProtocolError> {
        let title = match req.title.trim() {
            "" => DEFAULT_TITLE.to_string(),
            _ => required_str(&req.title, "Title", self.config.max_name_len * 2)?,
        };
        let team_name = required_str(&req.team_name, "Team name", self.config.max_name_len)?;
        let max_teams = clamp(req.max_teams, &self.config.max_teams);
        let team_size = clamp(req.team_size, &self.config.team_size);

        let session_id = uuid::Uuid::new_v4().to_string();
        let room_code = match self.registry.claim(&session_id).await {
            Ok(code) => code,
            Err(ProtocolError::Store(err)) => return Err(ProtocolError::SessionCreateFailed(err)),
            Err(err) => return Err(err),
        };

        let now = self.store.server_time();
        let host = Team::new_host(
            uuid::Uuid::new_v4().to_string(),
            team_name,
            team_size,
            req.user_id,
            now,
        );
        let mut session = GameSession::new(session_id.clone(), room_code.clone(), title, max_teams, now);
        session.host_team_id = Some(host.id.clone());
        session.teams.insert(host.id.clone(), host.clone());

        let record = serde_json::to_value(&session).map_err(|e| ProtocolError::SessionCreateFailed(e.into()))?;
        if let Err(err) = self.store.set(&paths::game(&session_id), record).await {
            if let Err(release_err) = self.registry.release(&room_code, &session_id).await {
                tracing::warn!(
                    session_id = %session_id,
                    room_code = %room_code,
                    error = %release_err,
                    "Failed to release room code after create failure"
                );
            }
            return Err(ProtocolError::SessionCreateFailed(err));
        }

        tracing::info!(session_id = %session_id, room_code = %room_code, max_teams, "Session created");
        Ok(Joined {
            session,
            team: host,
        })
    }

    /// Attaches a new team to a waiting session.
    ///
    /// The status and capacity checks run inside the same transaction as the
    /// insert, so concurrent joins can never exceed `max_teams`. Joining again
    /// with the same non-empty `user_id` returns the existing team.
    pub async fn join_session(&self, req: JoinSession) -> Result<Joined, ProtocolError> {
        let code = RoomCode::parse(&req.room_code)?;
        let team_name = required_str(&req.team_name, "Team name", self.config.max_name_len)?;
        let team_size = clamp(req.team_size, &self.config.team_size);

        let Some(session_id) = self.registry.find(&code).await? else {
            return Err(ProtocolError::SessionNotFound);
        };

        let team_id = uuid::Uuid::new_v4().to_string();
        let now = self.store.server_time();
        let user_id = req.user_id;

        let (session, team) = update_session(self.store.as_ref(), &session_id, |session| {
            if !user_id.is_empty()
                && let Some(existing) = session.teams.values().find(|t| t.user_id == user_id)
            {
                return Ok((session.clone(), existing.clone()));
            }
            if session.status != SessionStatus::Waiting {
                return Err(ProtocolError::SessionNotJoinable);
            }
            if session.is_full() {
                return Err(ProtocolError::SessionFull);
            }
            if session
                .teams
                .values()
                .any(|t| t.name.eq_ignore_ascii_case(&team_name))
            {
                return Err(ProtocolError::InvalidInput(format!(
                    "Team name '{team_name}' is already taken"
                )));
            }

            let team = Team::new(team_id.clone(), team_name.clone(), team_size, user_id.clone(), now);
            session.teams.insert(team.id.clone(), team.clone());
            Ok((session.clone(), team))
        })
        .await?;

        tracing::info!(session_id = %session_id, team_id = %team.id, team_name = %team.name, "Team joined session");
        Ok(Joined { session, team })
    }

    /// Host-only transition from Waiting to Playing.
    ///
    /// The puzzle set is generated and attached exactly once; calling this on
    /// a session that already started changes nothing.
    pub async fn start_session(
        &self,
        session_id: &str,
        team_id: &str,
    ) -> Result<StartOutcome, ProtocolError> {
        let now = self.store.server_time();
        let mut generated: Option<PuzzleSet> = None;
        let puzzles = Arc::clone(&self.puzzles);

        let outcome = update_session(self.store.as_ref(), session_id, |session| {
            if !session.is_host(team_id) {
                return Err(ProtocolError::NotHost("start_session"));
            }
            match session.status {
                SessionStatus::Playing | SessionStatus::Paused => {
                    return Ok(StartOutcome {
                        session: session.clone(),
                        newly_started: false,
                    });
                }
                SessionStatus::Finished => {
                    return Err(ProtocolError::InvalidTransition {
                        action: "start",
                        status: session.status,
                    });
                }
                SessionStatus::Waiting => {}
            }

            let set = generated
                .get_or_insert_with(|| puzzles.generate(session_id))
                .clone();
            session.puzzle_set = Some(set);
            session.status = SessionStatus::Playing;
            session.started_at = Some(now);
            for team in session.teams.values_mut() {
                team.status = TeamStatus::Playing;
                team.progress.start_time = Some(now);
            }
            Ok(StartOutcome {
                session: session.clone(),
                newly_started: true,
            })
        })
        .await?;

        if outcome.newly_started {
            tracing::info!(
                session_id = %session_id,
                teams = outcome.session.teams.len(),
                puzzles = outcome.session.puzzle_count(),
                "Session started"
            );
        } else {
            tracing::debug!(session_id = %session_id, "Session already started");
        }
        Ok(outcome)
    }

    pub async fn pause_session(
        &self,
        session_id: &str,
        team_id: &str,
    ) -> Result<GameSession, ProtocolError> {
        let session = update_session(self.store.as_ref(), session_id, |session| {
            if !session.is_host(team_id) {
                return Err(ProtocolError::NotHost("pause_session"));
            }
            match session.status {
                SessionStatus::Playing => session.status = SessionStatus::Paused,
                SessionStatus::Paused => {}
                status => {
                    return Err(ProtocolError::InvalidTransition {
                        action: "pause",
                        status,
                    });
                }
            }
            Ok(session.clone())
        })
        .await?;
        tracing::info!(session_id = %session_id, "Session paused");
        Ok(session)
    }

    pub async fn resume_session(
        &self,
        session_id: &str,
        team_id: &str,
    ) -> Result<GameSession, ProtocolError> {
        let session = update_session(self.store.as_ref(), session_id, |session| {
            if !session.is_host(team_id) {
                return Err(ProtocolError::NotHost("resume_session"));
            }
            match session.status {
                SessionStatus::Paused => session.status = SessionStatus::Playing,
                SessionStatus::Playing => {}
                status => {
                    return Err(ProtocolError::InvalidTransition {
                        action: "resume",
                        status,
                    });
                }
            }
            Ok(session.clone())
        })
        .await?;
        tracing::info!(session_id = %session_id, "Session resumed");
        Ok(session)
    }

    /// Administrative end by the host: Finished without a winner.
    pub async fn end_session(
        &self,
        session_id: &str,
        team_id: &str,
    ) -> Result<GameSession, ProtocolError> {
        let now = self.store.server_time();
        let session = update_session(self.store.as_ref(), session_id, |session| {
            if !session.is_host(team_id) {
                return Err(ProtocolError::NotHost("end_session"));
            }
            if session.status != SessionStatus::Finished {
                finish_by_host(session, now);
            }
            Ok(session.clone())
        })
        .await?;

        self.release_code(&session).await;
        tracing::info!(session_id = %session_id, "Session ended by host");
        Ok(session)
    }

    /// Removes a team from a lobby, or marks it disconnected mid-game.
    /// A host leaving the lobby ends the session.
    pub async fn leave_session(
        &self,
        session_id: &str,
        team_id: &str,
    ) -> Result<GameSession, ProtocolError> {
        let now = self.store.server_time();
        let session = update_session(self.store.as_ref(), session_id, |session| {
            if session.team(team_id).is_none() {
                return Err(ProtocolError::TeamNotFound);
            }
            let is_host = session.is_host(team_id);
            match session.status {
                SessionStatus::Waiting if is_host => {
                    finish_by_host(session, now);
                    if let Some(team) = session.team_mut(team_id) {
                        team.status = TeamStatus::Disconnected;
                    }
                }
                SessionStatus::Waiting => {
                    session.teams.remove(team_id);
                }
                SessionStatus::Playing | SessionStatus::Paused => {
                    if let Some(team) = session.team_mut(team_id)
                        && !team.has_finished()
                    {
                        team.status = TeamStatus::Disconnected;
                    }
                }
                SessionStatus::Finished => {}
            }
            Ok(session.clone())
        })
        .await?;

        if session.end_reason == Some(EndReason::Host) {
            self.release_code(&session).await;
        }
        tracing::info!(session_id = %session_id, team_id = %team_id, "Team left session");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<GameSession, ProtocolError> {
        load_session(self.store.as_ref(), session_id).await
    }

    pub async fn find_session_by_room_code(&self, code: &str) -> Result<GameSession, ProtocolError> {
        let code = RoomCode::parse(code)?;
        let session_id = self
            .registry
            .find(&code)
            .await?
            .ok_or(ProtocolError::SessionNotFound)?;
        self.get_session(&session_id).await
    }

    async fn release_code(&self, session: &GameSession) {
        if let Err(err) = self.registry.release(&session.room_code, &session.id).await {
            tracing::warn!(session_id = %session.id, error = %err, "Failed to release room code");
        }
    }
}

fn finish_by_host(session: &mut GameSession, now: i64) {
    session.status = SessionStatus::Finished;
    session.ended_at = Some(now);
    session.end_reason = Some(EndReason::Host);
    session.lock(now, "The host has ended the game".to_string());
}

#[cfg(test)]
mod tests {
    use seals_core::SealPuzzleProvider;

    use super::*;
    use crate::store::MemoryStore;
    use crate::store::testing::FlakyStore;

    fn service_with(store: Arc<dyn Store>) -> SessionService {
        let config = GameConfig::default();
        let registry = RoomRegistry::new(Arc::clone(&store), config.room_code_attempts);
        SessionService::new(store, registry, Arc::new(SealPuzzleProvider::default()), config)
    }

    fn service() -> SessionService {
        service_with(Arc::new(MemoryStore::new()))
    }

    fn create(max_teams: u32) -> CreateSession {
        CreateSession {
            title: "Friday".into(),
            max_teams,
            team_name: "Eagles".into(),
            team_size: 3,
            user_id: "host-user".into(),
        }
    }

    fn join(code: &RoomCode, name: &str) -> JoinSession {
        JoinSession {
            room_code: code.to_string(),
            team_name: name.into(),
            team_size: 2,
            user_id: format!("user-{name}"),
        }
    }

    #[tokio::test]
    async fn test_create_session() {
        let service = service();
        let Joined { session, team } = service.create_session(create(4)).await.unwrap();

        assert_eq!(session.status, SessionStatus::Waiting);
        assert!(team.is_host);
        assert_eq!(session.host_team_id.as_deref(), Some(team.id.as_str()));

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored, session);
        let by_code = service
            .find_session_by_room_code(&session.room_code.to_string().to_lowercase())
            .await
            .unwrap();
        assert_eq!(by_code.id, session.id);
    }

    #[tokio::test]
    async fn test_create_clamps_and_validates() {
        let service = service();
        let joined = service.create_session(create(99)).await.unwrap();
        assert_eq!(joined.session.max_teams, 16);

        let err = service
            .create_session(CreateSession {
                team_name: "  ".into(),
                ..create(2)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidInput(_)));

        let untitled = service
            .create_session(CreateSession {
                title: String::new(),
                ..create(2)
            })
            .await
            .unwrap();
        assert_eq!(untitled.session.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_create_failure_releases_room_code() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
        // Codes go through the healthy store, the session write through the flaky one.
        let service = SessionService::new(
            flaky.clone(),
            RoomRegistry::new(Arc::new(flaky.inner.clone()), 10),
            Arc::new(SealPuzzleProvider::default()),
            GameConfig::default(),
        );

        flaky.fail_next_writes(1);
        let err = service.create_session(create(2)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::SessionCreateFailed(_)));
        assert!(err.is_transient());

        assert!(flaky.inner.get(paths::ROOM_CODES).await.unwrap().is_none());
        assert!(flaky.inner.get(paths::GAMES).await.unwrap().is_none());

        // Nothing is left half-created and the next attempt succeeds.
        assert!(service.create_session(create(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_session() {
        let service = service();
        let host = service.create_session(create(3)).await.unwrap();
        let joined = service
            .join_session(join(&host.session.room_code, "Lions"))
            .await
            .unwrap();

        assert!(!joined.team.is_host);
        assert_eq!(joined.team.status, TeamStatus::Waiting);
        assert!(joined.team.progress.seals_completed.is_empty());
        assert_eq!(joined.session.teams.len(), 2);
    }

    #[tokio::test]
    async fn test_rejoin_with_same_user_is_idempotent() {
        let service = service();
        let host = service.create_session(create(3)).await.unwrap();
        let first = service
            .join_session(join(&host.session.room_code, "Lions"))
            .await
            .unwrap();
        let again = service
            .join_session(join(&host.session.room_code, "Lions"))
            .await
            .unwrap();
        assert_eq!(first.team.id, again.team.id);
        assert_eq!(again.session.teams.len(), 2);
    }

    #[tokio::test]
    async fn test_join_rejects_duplicate_team_name() {
        let service = service();
        let host = service.create_session(create(3)).await.unwrap();
        let mut req = join(&host.session.room_code, "EAGLES");
        req.user_id = "someone-else".into();
        assert!(matches!(
            service.join_session(req).await,
            Err(ProtocolError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_join_unknown_room_performs_no_writes() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
        let service = service_with(flaky.clone());

        let err = service
            .join_session(JoinSession {
                room_code: "ZZZ999".into(),
                team_name: "Lions".into(),
                team_size: 2,
                user_id: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProtocolError::SessionNotFound));
        assert_eq!(flaky.write_attempts(), 0);
    }

    #[tokio::test]
    async fn test_join_rejects_malformed_code_before_lookup() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
        let service = service_with(flaky.clone());
        let err = service
            .join_session(JoinSession {
                room_code: "O0".into(),
                team_name: "Lions".into(),
                team_size: 2,
                user_id: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRoomCode(_)));
        assert_eq!(flaky.write_attempts(), 0);
    }

    #[tokio::test]
    async fn test_join_full_session() {
        let service = service();
        let host = service.create_session(create(2)).await.unwrap();
        service
            .join_session(join(&host.session.room_code, "Lions"))
            .await
            .unwrap();

        let err = service
            .join_session(join(&host.session.room_code, "Bears"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SessionFull));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_never_exceed_capacity() {
        let service = Arc::new(service());
        let host = service.create_session(create(4)).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..12 {
            let service = Arc::clone(&service);
            let code = host.session.room_code.clone();
            tasks.push(tokio::spawn(async move {
                service.join_session(join(&code, &format!("Team{i}"))).await
            }));
        }

        let mut joined = 0;
        let mut full = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => joined += 1,
                Err(ProtocolError::SessionFull) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(joined, 3);
        assert_eq!(full, 9);
        let session = service.get_session(&host.session.id).await.unwrap();
        assert_eq!(session.teams.len(), 4);
    }

    #[tokio::test]
    async fn test_start_session() {
        let service = service();
        let host = service.create_session(create(2)).await.unwrap();
        let lions = service
            .join_session(join(&host.session.room_code, "Lions"))
            .await
            .unwrap();

        assert!(matches!(
            service.start_session(&host.session.id, &lions.team.id).await,
            Err(ProtocolError::NotHost(_))
        ));

        let outcome = service
            .start_session(&host.session.id, &host.team.id)
            .await
            .unwrap();
        assert!(outcome.newly_started);
        assert_eq!(outcome.session.status, SessionStatus::Playing);
        assert_eq!(outcome.session.puzzle_count(), 7);
        assert!(outcome.session.started_at.is_some());
        for team in outcome.session.teams.values() {
            assert_eq!(team.status, TeamStatus::Playing);
            assert_eq!(team.progress.start_time, outcome.session.started_at);
        }

        // Nobody can join once the game is running.
        let mut late = join(&host.session.room_code, "Bears");
        late.user_id = "late".into();
        assert!(matches!(
            service.join_session(late).await,
            Err(ProtocolError::SessionNotJoinable | ProtocolError::SessionFull)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_keeps_puzzle_set() {
        let service = service();
        let host = service.create_session(create(2)).await.unwrap();

        let first = service
            .start_session(&host.session.id, &host.team.id)
            .await
            .unwrap();
        let second = service
            .start_session(&host.session.id, &host.team.id)
            .await
            .unwrap();

        assert!(first.newly_started);
        assert!(!second.newly_started);
        assert_eq!(first.session.puzzle_set, second.session.puzzle_set);
        assert_eq!(first.session.started_at, second.session.started_at);
    }

    #[tokio::test]
    async fn test_pause_resume() {
        let service = service();
        let host = service.create_session(create(2)).await.unwrap();
        let id = &host.session.id;

        assert!(matches!(
            service.pause_session(id, &host.team.id).await,
            Err(ProtocolError::InvalidTransition { .. })
        ));
        service.start_session(id, &host.team.id).await.unwrap();

        let paused = service.pause_session(id, &host.team.id).await.unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);
        let resumed = service.resume_session(id, &host.team.id).await.unwrap();
        assert_eq!(resumed.status, SessionStatus::Playing);
        assert!(resumed.winner.is_none());
    }

    #[tokio::test]
    async fn test_end_session_without_winner() {
        let service = service();
        let host = service.create_session(create(2)).await.unwrap();
        service
            .start_session(&host.session.id, &host.team.id)
            .await
            .unwrap();

        let ended = service
            .end_session(&host.session.id, &host.team.id)
            .await
            .unwrap();
        assert_eq!(ended.status, SessionStatus::Finished);
        assert_eq!(ended.end_reason, Some(EndReason::Host));
        assert!(ended.winner.is_none());
        assert!(ended.locked);
        assert!(ended.lock_signal.is_some());

        // The room code no longer resolves.
        assert!(matches!(
            service
                .find_session_by_room_code(ended.room_code.as_str())
                .await,
            Err(ProtocolError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_leave_session() {
        let service = service();
        let host = service.create_session(create(3)).await.unwrap();
        let lions = service
            .join_session(join(&host.session.room_code, "Lions"))
            .await
            .unwrap();

        let after = service
            .leave_session(&host.session.id, &lions.team.id)
            .await
            .unwrap();
        assert!(after.team(&lions.team.id).is_none());

        let bears = service
            .join_session(join(&host.session.room_code, "Bears"))
            .await
            .unwrap();
        service
            .start_session(&host.session.id, &host.team.id)
            .await
            .unwrap();
        let after = service
            .leave_session(&host.session.id, &bears.team.id)
            .await
            .unwrap();
        assert_eq!(
            after.team(&bears.team.id).map(|t| t.status),
            Some(TeamStatus::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_host_leaving_lobby_ends_session() {
        let service = service();
        let host = service.create_session(create(3)).await.unwrap();
        let after = service
            .leave_session(&host.session.id, &host.team.id)
            .await
            .unwrap();
        assert_eq!(after.status, SessionStatus::Finished);
        assert_eq!(after.end_reason, Some(EndReason::Host));
        assert!(after.winner.is_none());
    }
}
