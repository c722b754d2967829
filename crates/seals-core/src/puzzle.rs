//! Shared puzzle sets.
//!
//! The session core never looks inside a descriptor. It only needs the set's
//! length (how many seals make a full completion) and the guarantee that the
//! set is generated once per session and shared read-only by every team.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PUZZLE_COUNT: u32 = 7;

const SEAL_KINDS: [&str; 7] = [
    "riddle", "cipher", "sequence", "anagram", "logic", "pattern", "memory",
];

/// Opaque description of one seal's challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleDescriptor {
    pub index: u32,
    pub kind: String,
    pub seed: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PuzzleSet(Vec<PuzzleDescriptor>);

impl PuzzleSet {
    pub fn new(puzzles: Vec<PuzzleDescriptor>) -> Self {
        Self(puzzles)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PuzzleDescriptor> {
        self.0.iter()
    }
}

/// Content collaborator that builds a session's puzzle set at game start.
pub trait PuzzleProvider: Send + Sync {
    fn generate(&self, session_id: &str) -> PuzzleSet;
}

/// Default provider: one seal per kind, ordered and seeded from the session
/// id so every client derives the same content from the same descriptor.
#[derive(Debug, Clone)]
pub struct SealPuzzleProvider {
    count: u32,
}

impl Default for SealPuzzleProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PUZZLE_COUNT)
    }
}

impl SealPuzzleProvider {
    pub fn new(count: u32) -> Self {
        Self {
            count: count.max(1),
        }
    }
}

impl PuzzleProvider for SealPuzzleProvider {
    fn generate(&self, session_id: &str) -> PuzzleSet {
        let mut rng = ChaCha8Rng::seed_from_u64(fnv1a(session_id.as_bytes()));
        let mut kinds = SEAL_KINDS;
        kinds.shuffle(&mut rng);

        let puzzles = (0..self.count)
            .map(|index| PuzzleDescriptor {
                index,
                kind: kinds[index as usize % kinds.len()].to_string(),
                seed: rng.random(),
                payload: serde_json::json!({ "difficulty": 1 + index / 3 }),
            })
            .collect();
        PuzzleSet(puzzles)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}
