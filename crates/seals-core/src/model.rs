//! Game session record and the teams it owns.
//!
//! Field names serialize in camelCase so the JSON tree matches the store key
//! layout (`games/{sessionId}`, `games/{sessionId}/teams/{teamId}`, ...).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::puzzle::PuzzleSet;
use crate::room_code::RoomCode;

pub type SessionId = String;
pub type TeamId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatus {
    Waiting,
    Playing,
    Completed,
    Winner,
    Disconnected,
}

/// Why a session reached `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// A team completed every seal first.
    Winner,
    /// The host ended the match (or left the lobby).
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Written by the single-player game into the same global board.
    Single,
    Multiplayer,
}

/// Per-team progress subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProgress {
    /// Completed seal indices. A set, so duplicate reports never inflate it.
    #[serde(default)]
    pub seals_completed: BTreeSet<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<i64>,
    #[serde(default)]
    pub hints_used: u32,
    /// Ids of the writes whose hints are already counted in `hints_used`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub hint_writes: BTreeSet<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_seal: Option<u32>,
}

impl TeamProgress {
    /// True once every seal of a `puzzle_count`-sized set is completed.
    pub fn is_complete(&self, puzzle_count: usize) -> bool {
        puzzle_count > 0 && self.seals_completed.len() >= puzzle_count
    }

    /// Milliseconds since the team started, clamped at zero.
    pub fn elapsed_ms(&self, now: i64) -> i64 {
        self.start_time.map_or(0, |start| (now - start).max(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub size: u32,
    pub is_host: bool,
    /// Opaque identity of the browser session that owns this team.
    #[serde(default)]
    pub user_id: String,
    pub joined_at: i64,
    pub status: TeamStatus,
    #[serde(default)]
    pub progress: TeamProgress,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub locked: bool,
}

impl Team {
    pub fn new(id: TeamId, name: String, size: u32, user_id: String, joined_at: i64) -> Self {
        Self {
            id,
            name,
            size,
            is_host: false,
            user_id,
            joined_at,
            status: TeamStatus::Waiting,
            progress: TeamProgress::default(),
            score: 0,
            locked: false,
        }
    }

    pub fn new_host(id: TeamId, name: String, size: u32, user_id: String, joined_at: i64) -> Self {
        Self {
            is_host: true,
            ..Self::new(id, name, size, user_id, joined_at)
        }
    }

    /// Whether this team has already been given a final standing.
    pub fn has_finished(&self) -> bool {
        matches!(self.status, TeamStatus::Completed | TeamStatus::Winner)
    }
}

/// Set once per session, never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRecord {
    pub team_id: TeamId,
    pub team_name: String,
    pub completion_time_ms: i64,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncedWinner {
    pub name: String,
    pub completion_time: i64,
    pub time_formatted: String,
}

/// Display-ready broadcast written next to the session when a team wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerAnnouncement {
    pub winner: AnnouncedWinner,
    pub message: String,
    pub timestamp: i64,
    pub expires_at: i64,
}

/// Marker watched by every client to disable input once the game is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSignal {
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: SessionId,
    pub room_code: RoomCode,
    pub title: String,
    pub max_teams: u32,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_team_id: Option<TeamId>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    #[serde(default)]
    pub teams: BTreeMap<TeamId, Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerRecord>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puzzle_set: Option<PuzzleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_announcement: Option<WinnerAnnouncement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_signal: Option<LockSignal>,
}

impl GameSession {
    pub fn new(
        id: SessionId,
        room_code: RoomCode,
        title: String,
        max_teams: u32,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            room_code,
            title,
            max_teams,
            status: SessionStatus::Waiting,
            host_team_id: None,
            created_at,
            started_at: None,
            ended_at: None,
            end_reason: None,
            teams: BTreeMap::new(),
            winner: None,
            locked: false,
            puzzle_set: None,
            winner_announcement: None,
            lock_signal: None,
        }
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.get(team_id)
    }

    pub fn team_mut(&mut self, team_id: &str) -> Option<&mut Team> {
        self.teams.get_mut(team_id)
    }

    pub fn count_teams(&self) -> u32 {
        u32::try_from(self.teams.len()).unwrap_or(u32::MAX)
    }

    pub fn is_full(&self) -> bool {
        self.count_teams() >= self.max_teams
    }

    pub fn is_host(&self, team_id: &str) -> bool {
        self.host_team_id.as_deref() == Some(team_id)
    }

    /// Number of seals in the shared puzzle set, zero before the game starts.
    pub fn puzzle_count(&self) -> usize {
        self.puzzle_set.as_ref().map_or(0, PuzzleSet::len)
    }

    /// A session stops being active once it is finished.
    pub fn is_active(&self) -> bool {
        self.status != SessionStatus::Finished
    }

    pub fn winner_count(&self) -> usize {
        self.teams
            .values()
            .filter(|team| team.status == TeamStatus::Winner)
            .count()
    }

    /// Locks the session and every team in it.
    pub fn lock(&mut self, timestamp: i64, message: String) {
        self.locked = true;
        for team in self.teams.values_mut() {
            team.locked = true;
        }
        self.lock_signal = Some(LockSignal { timestamp, message });
    }
}

/// One row of `globalLeaderboard/{autoId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub team_name: String,
    pub completion_time: i64,
    pub completed_at: i64,
    pub score: i64,
    pub seals_completed: u32,
    pub game_mode: GameMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> GameSession {
        let code = RoomCode::parse("ABC234").unwrap();
        GameSession::new("game-1".to_string(), code, "Friday".to_string(), 2, 100)
    }

    #[test]
    fn test_session_serializes_store_layout() {
        let mut session = sample_session();
        let host = Team::new_host("t1".into(), "Eagles".into(), 3, "user-1".into(), 100);
        session.host_team_id = Some(host.id.clone());
        session.teams.insert(host.id.clone(), host);

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["roomCode"], "ABC234");
        assert_eq!(value["maxTeams"], 2);
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["hostTeamId"], "t1");
        assert_eq!(value["teams"]["t1"]["isHost"], true);
        assert_eq!(value["teams"]["t1"]["progress"]["sealsCompleted"], serde_json::json!([]));
        assert!(value.get("winner").is_none());
        assert_eq!(value["locked"], false);
    }

    #[test]
    fn test_session_deserializes_without_optional_subtrees() {
        // The store drops empty maps, so a fresh lobby may have no `teams` key.
        let value = serde_json::json!({
            "id": "game-1",
            "roomCode": "ABC234",
            "title": "Friday",
            "maxTeams": 4,
            "status": "waiting",
            "createdAt": 5,
        });
        let session: GameSession = serde_json::from_value(value).unwrap();
        assert!(session.teams.is_empty());
        assert!(!session.locked);
        assert_eq!(session.puzzle_count(), 0);
    }

    #[test]
    fn test_capacity() {
        let mut session = sample_session();
        assert!(!session.is_full());
        for i in 0..2 {
            let team = Team::new(format!("t{i}"), format!("Team {i}"), 1, String::new(), 0);
            session.teams.insert(team.id.clone(), team);
        }
        assert!(session.is_full());
    }

    #[test]
    fn test_lock_marks_every_team() {
        let mut session = sample_session();
        let team = Team::new("t1".into(), "Lions".into(), 2, String::new(), 0);
        session.teams.insert(team.id.clone(), team);

        session.lock(42, "Game over".into());

        assert!(session.locked);
        assert!(session.teams.values().all(|t| t.locked));
        assert_eq!(session.lock_signal.as_ref().unwrap().timestamp, 42);
    }

    #[test]
    fn test_progress_completion() {
        let mut progress = TeamProgress::default();
        assert!(!progress.is_complete(0));
        progress.seals_completed.extend(0..6);
        assert!(!progress.is_complete(7));
        progress.seals_completed.insert(6);
        assert!(progress.is_complete(7));
    }
}
