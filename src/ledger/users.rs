//! Best-effort per-user vote tallies
//!
//! `total_votes_cast` tracks the number of ledger rows a user owns. Unlike
//! the per-problem counter it carries no strict real-time guarantee: tallies
//! are updated after the ledger commit, outside its critical section.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::UserId;

/// Per-user vote tallies with concurrent access
pub struct UserTallies {
    tallies: DashMap<UserId, AtomicI64>,
}

impl UserTallies {
    pub fn new() -> Self {
        Self {
            tallies: DashMap::new(),
        }
    }

    /// Record a cast vote
    pub fn record_cast(&self, user: UserId) {
        self.tallies
            .entry(user)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retracted vote
    pub fn record_retract(&self, user: UserId) {
        self.tallies
            .entry(user)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_sub(1, Ordering::Relaxed);
    }

    /// Current tally for a user, clamped at zero for display
    pub fn total_votes_cast(&self, user: UserId) -> i64 {
        self.tallies
            .get(&user)
            .map(|t| t.load(Ordering::Relaxed).max(0))
            .unwrap_or(0)
    }
}

impl Default for UserTallies {
    fn default() -> Self {
        Self::new()
    }
}
