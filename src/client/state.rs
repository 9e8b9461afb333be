//! Per-problem reconciliation state machine
//!
//! States: `Unknown → Loaded → OptimisticPending → Reconciled`, with
//! `Reconciled` feeding back into `Loaded` for the next cycle. Pure
//! synchronous logic; the async coordination lives in the reconciler.

/// Reconciliation phase for one problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePhase {
    /// No data fetched yet
    Unknown,
    /// Authoritative value obtained from the Vote API
    Loaded,
    /// A toggle is in flight; local state is a prediction
    OptimisticPending,
    /// The in-flight toggle resolved; value is authoritative again
    Reconciled,
}

/// What the UI renders for one problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteView {
    pub has_voted: bool,
    pub vote_count: u32,
}

/// Reconciliation state for one problem
#[derive(Debug)]
pub struct ProblemVoteState {
    phase: VotePhase,
    /// Last authoritative value (initial fetch or toggle response)
    loaded: Option<VoteView>,
    /// Last realtime-pushed count; carries no `has_voted` of its own
    pushed: Option<u32>,
    /// Local prediction while a toggle is in flight
    optimistic: Option<VoteView>,
    /// Pre-optimistic value to restore on rejection
    rollback: Option<VoteView>,
}

impl ProblemVoteState {
    pub fn new() -> Self {
        Self {
            phase: VotePhase::Unknown,
            loaded: None,
            pushed: None,
            optimistic: None,
            rollback: None,
        }
    }

    pub fn phase(&self) -> VotePhase {
        self.phase
    }

    /// Whether a toggle is currently in flight
    pub fn is_pending(&self) -> bool {
        self.phase == VotePhase::OptimisticPending
    }

    /// The value to render, by source priority:
    /// optimistic (if in flight) > pushed > loaded.
    pub fn view(&self) -> Option<VoteView> {
        if let Some(optimistic) = self.optimistic {
            return Some(optimistic);
        }
        match (self.pushed, self.loaded) {
            (Some(count), Some(loaded)) => Some(VoteView {
                has_voted: loaded.has_voted,
                vote_count: count,
            }),
            (Some(count), None) => Some(VoteView {
                has_voted: false,
                vote_count: count,
            }),
            (None, loaded) => loaded,
        }
    }

    /// Record an authoritative value.
    ///
    /// A load is the newest server truth, so any older pushed count is
    /// superseded; later push events are trusted again as they arrive.
    pub fn load(&mut self, view: VoteView) {
        self.loaded = Some(view);
        self.pushed = None;
        if self.phase != VotePhase::OptimisticPending {
            self.phase = VotePhase::Loaded;
        }
    }

    /// Record a realtime-pushed count
    pub fn apply_push(&mut self, vote_count: u32) {
        self.pushed = Some(vote_count);
    }

    /// Start an optimistic toggle: flip locally before server confirmation.
    ///
    /// Returns the predicted view, or `None` when a toggle is already in
    /// flight — the caller must ignore the request (not queue, not merge).
    pub fn begin_toggle(&mut self) -> Option<VoteView> {
        if self.is_pending() {
            return None;
        }
        let current = self.view().unwrap_or(VoteView {
            has_voted: false,
            vote_count: 0,
        });
        let predicted = VoteView {
            has_voted: !current.has_voted,
            vote_count: if current.has_voted {
                current.vote_count.saturating_sub(1)
            } else {
                current.vote_count + 1
            },
        };
        self.rollback = Some(current);
        self.optimistic = Some(predicted);
        self.phase = VotePhase::OptimisticPending;
        Some(predicted)
    }

    /// The in-flight toggle succeeded: adopt the authoritative response and
    /// clear the optimistic override so subsequent push events are trusted.
    pub fn resolve_toggle(&mut self, view: VoteView) {
        self.loaded = Some(view);
        self.pushed = None;
        self.optimistic = None;
        self.rollback = None;
        self.phase = VotePhase::Reconciled;
    }

    /// The in-flight toggle failed: roll back to the pre-optimistic value.
    ///
    /// Returns the restored view.
    pub fn fail_toggle(&mut self) -> Option<VoteView> {
        let restored = self.rollback.take();
        if let Some(view) = restored {
            self.loaded = Some(view);
        }
        self.optimistic = None;
        self.pushed = None;
        self.phase = if self.loaded.is_some() {
            VotePhase::Loaded
        } else {
            VotePhase::Unknown
        };
        restored
    }
}

impl Default for ProblemVoteState {
    fn default() -> Self {
        Self::new()
    }
}
