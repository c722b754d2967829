//! Scroll of Seven Seals Core Library
//!
//! Shared session model for multiplayer matches: the game session record,
//! teams and their progress, the scoring function, room codes and the
//! puzzle-set contract. Everything here is pure data and pure functions;
//! the store-backed protocols live in `seals-server`.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod model;
pub mod progress;
pub mod puzzle;
pub mod room_code;
pub mod scoring;

pub use model::{
    AnnouncedWinner, EndReason, GameMode, GameSession, LeaderboardEntry, LockSignal, SessionId,
    SessionStatus, Team, TeamId, TeamProgress, TeamStatus, WinnerAnnouncement, WinnerRecord,
};
pub use progress::{DeltaError, MergeSummary, ProgressDelta};
pub use puzzle::{DEFAULT_PUZZLE_COUNT, PuzzleDescriptor, PuzzleProvider, PuzzleSet, SealPuzzleProvider};
pub use room_code::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode, RoomCodeError};
pub use scoring::{format_elapsed, score};
