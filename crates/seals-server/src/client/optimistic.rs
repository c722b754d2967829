//! Local progress view ahead of store confirmation.
//!
//! Every in-flight write moves through a small state machine:
//!
//! ```text
//! Pending -> Retrying{1} -> .. -> Retrying{n} -> Abandoned
//!  ^ \            \                                 |  |
//!  |  +------------+-------> Confirmed <------------+  |  (via reconcile)
//!  +---------------------------------------------------+  (resend)
//! ```
//!
//! The visible view is the confirmed progress with every unconfirmed delta
//! applied on top, so the player never sees a solved seal disappear while a
//! write is retried or after it is given up.

use std::collections::BTreeMap;

use seals_core::{ProgressDelta, TeamProgress};

pub type WriteId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Pending,
    Retrying { attempt: u32 },
    Confirmed,
    /// Retries exhausted. The delta stays in the local view.
    Abandoned,
}

impl WriteState {
    fn in_flight(self) -> bool {
        matches!(self, WriteState::Pending | WriteState::Retrying { .. })
    }
}

#[derive(Debug, Clone)]
struct Write {
    delta: ProgressDelta,
    state: WriteState,
}

#[derive(Debug, Default, Clone)]
pub struct OptimisticProgress {
    confirmed: TeamProgress,
    writes: BTreeMap<WriteId, Write>,
    next_id: WriteId,
}

impl OptimisticProgress {
    pub fn new(confirmed: TeamProgress) -> Self {
        Self {
            confirmed,
            ..Self::default()
        }
    }

    /// Records a delta applied locally before the store has seen it.
    pub fn begin(&mut self, delta: ProgressDelta) -> WriteId {
        let id = self.next_id;
        self.next_id += 1;
        self.writes.insert(
            id,
            Write {
                delta,
                state: WriteState::Pending,
            },
        );
        id
    }

    pub fn retrying(&mut self, id: WriteId, attempt: u32) -> bool {
        self.transition(id, |state| {
            state
                .in_flight()
                .then_some(WriteState::Retrying { attempt })
        })
    }

    /// The store accepted the write and returned the authoritative progress.
    pub fn confirm(&mut self, id: WriteId, authoritative: &TeamProgress) -> bool {
        let confirmed = self.transition(id, |state| {
            (state != WriteState::Confirmed).then_some(WriteState::Confirmed)
        });
        if confirmed {
            self.reconcile(authoritative);
        }
        confirmed
    }

    pub fn abandon(&mut self, id: WriteId) -> bool {
        self.transition(id, |state| state.in_flight().then_some(WriteState::Abandoned))
    }

    /// Puts an abandoned write back in flight for a resend.
    pub fn resume(&mut self, id: WriteId) -> bool {
        self.transition(id, |state| {
            (state == WriteState::Abandoned).then_some(WriteState::Pending)
        })
    }

    /// The store refused the write outright; its delta is dropped.
    pub fn reject(&mut self, id: WriteId) -> bool {
        self.writes
            .remove(&id)
            .is_some_and(|write| write.state.in_flight())
    }

    pub fn state(&self, id: WriteId) -> Option<WriteState> {
        self.writes.get(&id).map(|write| write.state)
    }

    /// Writes not yet confirmed, abandoned ones included.
    pub fn unconfirmed(&self) -> usize {
        self.writes
            .values()
            .filter(|write| write.state != WriteState::Confirmed)
            .count()
    }

    /// Confirmed progress plus every unconfirmed delta.
    pub fn view(&self) -> TeamProgress {
        let mut view = self.confirmed.clone();
        for write in self.writes.values() {
            if write.state != WriteState::Confirmed {
                view.apply(&write.delta);
            }
        }
        view
    }

    /// Writes given up on, oldest first, each with its original delta.
    pub fn unsynced(&self) -> Vec<(WriteId, ProgressDelta)> {
        self.writes
            .iter()
            .filter(|(_, write)| write.state == WriteState::Abandoned)
            .map(|(&id, write)| (id, write.delta.clone()))
            .collect()
    }

    /// Takes in a snapshot pushed by the store. Abandoned writes whose
    /// content all shows up in it are considered delivered.
    pub fn reconcile(&mut self, authoritative: &TeamProgress) {
        self.absorb(authoritative);
        for write in self.writes.values_mut() {
            if write.state == WriteState::Abandoned && self.confirmed.contains(&write.delta) {
                write.state = WriteState::Confirmed;
            }
        }
    }

    fn absorb(&mut self, authoritative: &TeamProgress) {
        // A late snapshot must never take seals back out of the view.
        let seals = std::mem::take(&mut self.confirmed.seals_completed);
        self.confirmed = authoritative.clone();
        self.confirmed.seals_completed.extend(seals);
    }

    fn transition(
        &mut self,
        id: WriteId,
        next: impl FnOnce(WriteState) -> Option<WriteState>,
    ) -> bool {
        let Some(write) = self.writes.get_mut(&id) else {
            return false;
        };
        match next(write.state) {
            Some(state) => {
                write.state = state;
                true
            }
            None => false,
        }
    }
}
