//! Leaderboard scoring.
//!
//! Scores only rank the global leaderboard. The session winner is always the
//! first team to complete every seal, never the highest score.

use crate::model::TeamProgress;

pub const BASE_SCORE: i64 = 1000;
/// Finishing inside this window earns a time bonus.
pub const TIME_BONUS_WINDOW_MS: i64 = 3_600_000;
pub const HINT_PENALTY: i64 = 50;

/// `1000 + max(0, 3_600_000 - t) / 1000 - hints * 50`
pub fn score(progress: &TeamProgress, completion_time_ms: i64) -> i64 {
    let time_bonus = (TIME_BONUS_WINDOW_MS - completion_time_ms).max(0) / 1000;
    let hint_penalty = i64::from(progress.hints_used) * HINT_PENALTY;
    BASE_SCORE + time_bonus - hint_penalty
}

/// Formats elapsed milliseconds as `MM:SS`, or `H:MM:SS` past one hour.
pub fn format_elapsed(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
