//! Store key layout.
//!
//! ```text
//! games/{sessionId}
//! games/{sessionId}/teams/{teamId}
//! games/{sessionId}/winnerAnnouncement
//! games/{sessionId}/lockSignal
//! roomCodes/{code}
//! globalLeaderboard/{autoId}
//! ```

pub const GAMES: &str = "games";
pub const ROOM_CODES: &str = "roomCodes";
pub const GLOBAL_LEADERBOARD: &str = "globalLeaderboard";

pub fn game(session_id: &str) -> String {
    format!("{GAMES}/{session_id}")
}

pub fn team(session_id: &str, team_id: &str) -> String {
    format!("{GAMES}/{session_id}/teams/{team_id}")
}

pub fn winner_announcement(session_id: &str) -> String {
    format!("{GAMES}/{session_id}/winnerAnnouncement")
}

pub fn lock_signal(session_id: &str) -> String {
    format!("{GAMES}/{session_id}/lockSignal")
}

pub fn room_code(code: &str) -> String {
    format!("{ROOM_CODES}/{code}")
}
