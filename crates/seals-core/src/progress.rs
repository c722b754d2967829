//! Progress deltas and the merge rules applied to a team's progress subtree.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TeamProgress;

/// A partial progress report from one team's client.
///
/// Merging is additive: seals are set-unioned, `hints_delta` is added to the
/// counter, unseen keywords are appended. Nothing in a delta can remove
/// previously recorded progress.
///
/// A delta carrying a `write_id` has its hints counted at most once, so a
/// write that is replayed after an ambiguous failure cannot inflate
/// `hints_used`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_id: Option<String>,
    #[serde(default)]
    pub seals_completed: BTreeSet<u32>,
    #[serde(default)]
    pub hints_delta: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_seal: Option<u32>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("Seal index {index} is outside the puzzle set of {puzzle_count}")]
    SealOutOfRange { index: u32, puzzle_count: usize },
}

/// What a merge actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub newly_completed: usize,
    pub hints_added: u32,
    pub keywords_added: usize,
}

impl MergeSummary {
    pub fn is_noop(&self) -> bool {
        self.newly_completed == 0 && self.hints_added == 0 && self.keywords_added == 0
    }
}

impl ProgressDelta {
    /// A delta that only reports completed seals.
    pub fn seals(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            seals_completed: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_hints(mut self, hints: u32) -> Self {
        self.hints_delta = hints;
        self
    }

    #[must_use]
    pub fn with_write_id(mut self, id: impl Into<String>) -> Self {
        self.write_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    #[must_use]
    pub fn with_current_seal(mut self, seal: u32) -> Self {
        self.current_seal = Some(seal);
        self
    }

    /// Rejects seal indices that do not exist in the shared puzzle set.
    pub fn validate(&self, puzzle_count: usize) -> Result<(), DeltaError> {
        let out_of_range = self
            .seals_completed
            .iter()
            .chain(self.current_seal.iter())
            .find(|&&index| index as usize >= puzzle_count);
        match out_of_range {
            Some(&index) => Err(DeltaError::SealOutOfRange {
                index,
                puzzle_count,
            }),
            None => Ok(()),
        }
    }
}

impl TeamProgress {
    /// Applies a delta to this progress record.
    pub fn apply(&mut self, delta: &ProgressDelta) -> MergeSummary {
        let before = self.seals_completed.len();
        self.seals_completed
            .extend(delta.seals_completed.iter().copied());

        let mut keywords_added = 0;
        for keyword in &delta.keywords {
            if !self.keywords.contains(keyword) {
                self.keywords.push(keyword.clone());
                keywords_added += 1;
            }
        }

        let hints_added = match &delta.write_id {
            Some(id) if delta.hints_delta > 0 => {
                if self.hint_writes.insert(id.clone()) {
                    delta.hints_delta
                } else {
                    0
                }
            }
            _ => delta.hints_delta,
        };
        self.hints_used = self.hints_used.saturating_add(hints_added);
        if delta.current_seal.is_some() {
            self.current_seal = delta.current_seal;
        }

        MergeSummary {
            newly_completed: self.seals_completed.len() - before,
            hints_added,
            keywords_added,
        }
    }

    /// Whether everything `delta` carries already shows up here.
    pub fn contains(&self, delta: &ProgressDelta) -> bool {
        let hints = delta.hints_delta == 0
            || delta
                .write_id
                .as_ref()
                .is_some_and(|id| self.hint_writes.contains(id));
        hints
            && delta.seals_completed.is_subset(&self.seals_completed)
            && delta.keywords.iter().all(|k| self.keywords.contains(k))
    }
}
