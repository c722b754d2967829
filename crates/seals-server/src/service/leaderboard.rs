//! Cross-session leaderboard under `globalLeaderboard/{autoId}`.

use std::cmp::Reverse;
use std::sync::Arc;

use seals_core::{GameMode, LeaderboardEntry, Team};
use serde_json::Value;

use crate::common::{ProtocolError, paths};
use crate::store::{ServerValue, Store, StoreError};

#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn Store>,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Appends a finished team's result. `completedAt` is stamped by the store.
    pub async fn record(&self, team: &Team, mode: GameMode) -> Result<String, ProtocolError> {
        let entry = LeaderboardEntry {
            team_name: team.name.clone(),
            completion_time: team.progress.completion_time.unwrap_or_default(),
            completed_at: 0,
            score: team.score,
            seals_completed: u32::try_from(team.progress.seals_completed.len()).unwrap_or(u32::MAX),
            game_mode: mode,
        };
        let mut value = serde_json::to_value(&entry).map_err(StoreError::from)?;
        if let Value::Object(fields) = &mut value {
            fields.insert("completedAt".into(), ServerValue::timestamp());
        }

        let key = self.store.push(paths::GLOBAL_LEADERBOARD, value).await?;
        tracing::info!(team_name = %entry.team_name, score = entry.score, key = %key, "Leaderboard entry recorded");
        Ok(key)
    }

    /// Best `limit` entries: highest score first, faster completion breaking ties.
    pub async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ProtocolError> {
        let Some(Value::Object(rows)) = self.store.get(paths::GLOBAL_LEADERBOARD).await? else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<LeaderboardEntry> = rows
            .into_iter()
            .filter_map(|(key, row)| match serde_json::from_value(row) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(key = %key, error = %err, "Skipping malformed leaderboard row");
                    None
                }
            })
            .collect();
        entries.sort_by_key(|e| (Reverse(e.score), e.completion_time));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};

    fn finished_team(name: &str, completion_time: i64, score: i64) -> Team {
        let mut team = Team::new(name.to_lowercase(), name.into(), 2, String::new(), 0);
        team.progress.seals_completed = (0..7).collect();
        team.progress.completion_time = Some(completion_time);
        team.score = score;
        team
    }

    #[tokio::test]
    async fn test_record_stamps_server_time() {
        let clock = Arc::new(ManualClock::new(5_000));
        let store = Arc::new(MemoryStore::with_clock(clock));
        let leaderboard = Leaderboard::new(store);

        leaderboard
            .record(&finished_team("Eagles", 60_000, 4540), GameMode::Multiplayer)
            .await
            .unwrap();

        let top = leaderboard.top(10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].completed_at, 5_000);
        assert_eq!(top[0].seals_completed, 7);
        assert_eq!(top[0].game_mode, GameMode::Multiplayer);
    }

    #[tokio::test]
    async fn test_top_orders_by_score_then_time() {
        let leaderboard = Leaderboard::new(Arc::new(MemoryStore::new()));
        for (name, time, score) in [
            ("Slow", 900_000, 3700),
            ("Fast", 100_000, 4500),
            ("Tied", 120_000, 4500),
            ("Last", 3_000_000, 1600),
        ] {
            leaderboard
                .record(&finished_team(name, time, score), GameMode::Multiplayer)
                .await
                .unwrap();
        }

        let names: Vec<_> = leaderboard
            .top(3)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.team_name)
            .collect();
        assert_eq!(names, ["Fast", "Tied", "Slow"]);
    }

    #[tokio::test]
    async fn test_single_player_rows_share_the_board() {
        let store = Arc::new(MemoryStore::new());
        store
            .push(
                paths::GLOBAL_LEADERBOARD,
                serde_json::json!({
                    "teamName": "Solo",
                    "completionTime": 80_000,
                    "completedAt": 10,
                    "score": 4520,
                    "sealsCompleted": 7,
                    "gameMode": "single"
                }),
            )
            .await
            .unwrap();
        store
            .push(paths::GLOBAL_LEADERBOARD, serde_json::json!({ "teamName": "Broken" }))
            .await
            .unwrap();
        let leaderboard = Leaderboard::new(store);
        leaderboard
            .record(&finished_team("Eagles", 60_000, 4540), GameMode::Multiplayer)
            .await
            .unwrap();

        let modes: Vec<_> = leaderboard
            .top(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.game_mode)
            .collect();
        assert_eq!(modes, [GameMode::Multiplayer, GameMode::Single]);
    }

    #[tokio::test]
    async fn test_empty_leaderboard() {
        let leaderboard = Leaderboard::new(Arc::new(MemoryStore::new()));
        assert!(leaderboard.top(10).await.unwrap().is_empty());
    }
}
