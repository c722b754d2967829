//! Composition root: wires the store, protocols and collaborators together.

use std::sync::Arc;

use seals_core::{PuzzleProvider, SealPuzzleProvider};

use crate::config::GameConfig;
use crate::service::{
    Leaderboard, ProgressProtocol, RoomRegistry, SessionService, StoreProgress, WinnerDetection,
    WinnerProtocol,
};
use crate::store::{MemoryStore, Store};

#[derive(Clone)]
pub struct App {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionService>,
    /// Progress commits with winner detection layered on top.
    pub progress: Arc<dyn ProgressProtocol>,
    pub leaderboard: Leaderboard,
    pub config: GameConfig,
}

impl App {
    pub fn new(store: Arc<dyn Store>, puzzles: Arc<dyn PuzzleProvider>, config: GameConfig) -> Self {
        let registry = RoomRegistry::new(Arc::clone(&store), config.room_code_attempts);
        let leaderboard = Leaderboard::new(Arc::clone(&store));
        let winner = WinnerProtocol::new(
            Arc::clone(&store),
            registry.clone(),
            leaderboard.clone(),
            &config,
        );
        let progress = WinnerDetection::new(StoreProgress::new(Arc::clone(&store)), winner);
        let sessions = SessionService::new(Arc::clone(&store), registry, puzzles, config.clone());

        Self {
            store,
            sessions: Arc::new(sessions),
            progress: Arc::new(progress),
            leaderboard,
            config,
        }
    }

    pub fn in_memory(config: GameConfig) -> Self {
        let puzzles = SealPuzzleProvider::new(config.puzzle_count);
        Self::new(Arc::new(MemoryStore::new()), Arc::new(puzzles), config)
    }
}
