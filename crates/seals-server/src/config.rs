//! Runtime configuration.
//!
//! Defaults match the live game; every field can be overridden through a
//! `SEALS_*` environment variable.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use seals_core::DEFAULT_PUZZLE_COUNT;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Seals in a generated puzzle set.
    pub puzzle_count: u32,
    pub max_teams: RangeInclusive<u32>,
    pub team_size: RangeInclusive<u32>,
    pub max_name_len: usize,
    pub room_code_attempts: u32,
    /// Retries after the first failed progress write.
    pub progress_retries: u32,
    /// Retry `n` waits `n * retry_base_delay`.
    pub retry_base_delay: Duration,
    pub announcement_window: Duration,
    pub leaderboard_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            puzzle_count: DEFAULT_PUZZLE_COUNT,
            max_teams: 2..=16,
            team_size: 1..=10,
            max_name_len: 32,
            room_code_attempts: 10,
            progress_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            announcement_window: Duration::from_secs(30),
            leaderboard_limit: 10,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            puzzle_count: env_or("SEALS_PUZZLE_COUNT", defaults.puzzle_count)?,
            room_code_attempts: env_or("SEALS_ROOM_CODE_ATTEMPTS", defaults.room_code_attempts)?,
            progress_retries: env_or("SEALS_PROGRESS_RETRIES", defaults.progress_retries)?,
            retry_base_delay: Duration::from_millis(env_or(
                "SEALS_RETRY_BASE_MS",
                duration_ms(defaults.retry_base_delay),
            )?),
            announcement_window: Duration::from_secs(env_or(
                "SEALS_ANNOUNCEMENT_SECS",
                defaults.announcement_window.as_secs(),
            )?),
            ..defaults
        })
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            addr: env_or("SEALS_ADDR", Self::default().addr)?,
            game: GameConfig::from_env()?,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.puzzle_count, 7);
        assert_eq!(config.progress_retries, 3);
        assert_eq!(config.announcement_window, Duration::from_secs(30));
        assert_eq!(ServerConfig::default().addr.port(), 3000);
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let config = GameConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let value: u32 = env_or("SEALS_TEST_SURELY_UNSET_KEY", 9).unwrap();
        assert_eq!(value, 9);
    }
}
