//! Vote ledger storage
//!
//! In-memory authoritative store for problems and their vote rows.
//!
//! ## Consistency model
//!
//! Every mutation runs inside a `DashMap::get_mut` critical section on the
//! problem entry, so the vote-row set and the denormalized `vote_count`
//! change as one unit of work. No reader can observe an inserted row with a
//! stale counter. Duplicate prevention is set membership *inside* that
//! critical section — a constraint, not a check-then-insert across lock
//! boundaries, so concurrent inserts for the same (user, problem) pair
//! resolve to exactly one success and one `DuplicateVote` error.
//!
//! The creation-time auto-vote takes a privileged path: the proposer's row is
//! written while the record is constructed, before the problem is insertable
//! into the shared map. The self-vote guard applies only to the public
//! `insert_vote` / `toggle_vote` path.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::problem::{NewProblem, Problem, ProblemStatus};
use super::users::UserTallies;
use crate::types::{AgoraError, ProblemId, Result, UserId};

/// A problem record together with its vote rows
struct ProblemEntry {
    problem: Problem,
    /// Vote rows keyed by voter, value is the row's creation time.
    /// One row per (user, problem) pair by construction.
    voters: HashMap<UserId, DateTime<Utc>>,
}

/// Authoritative post-mutation state returned by a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub has_voted: bool,
    pub new_vote_count: u32,
}

/// Read-only vote status for one (user, problem) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteStatus {
    pub has_voted: bool,
    pub vote_count: u32,
}

/// One counter correction made by the repair scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairedCount {
    pub problem_id: ProblemId,
    pub stored: u32,
    pub actual: u32,
}

/// Vote ledger with concurrent access
pub struct VoteLedger {
    problems: DashMap<ProblemId, ProblemEntry>,
    tallies: UserTallies,
}

impl VoteLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            problems: DashMap::new(),
            tallies: UserTallies::new(),
        }
    }

    /// Create a problem with the proposer's auto-vote.
    ///
    /// The row is written before the record becomes observable, so every
    /// problem is born with `vote_count == 1` and `has_voted == true` for
    /// its proposer.
    pub fn create_problem(&self, proposer: UserId, input: NewProblem) -> Problem {
        let mut problem = Problem::new(proposer, input);
        let mut voters = HashMap::new();
        voters.insert(proposer, problem.created_at);
        problem.vote_count = 1;

        let snapshot = problem.clone();
        let id = problem.id;
        self.problems.insert(id, ProblemEntry { problem, voters });
        self.tallies.record_cast(proposer);

        info!(problem = %id, proposer = %proposer, "Problem created with auto-vote");
        snapshot
    }

    /// Get a snapshot of a problem record
    pub fn get_problem(&self, id: ProblemId) -> Result<Problem> {
        self.problems
            .get(&id)
            .map(|entry| entry.problem.clone())
            .ok_or_else(|| AgoraError::NotFound(format!("problem {id}")))
    }

    /// Update a problem's lifecycle status (privileged operation)
    pub fn set_status(&self, id: ProblemId, status: ProblemStatus) -> Result<Problem> {
        let mut entry = self
            .problems
            .get_mut(&id)
            .ok_or_else(|| AgoraError::NotFound(format!("problem {id}")))?;
        entry.problem.status = status;
        entry.problem.updated_at = Utc::now();
        Ok(entry.problem.clone())
    }

    /// Check whether a vote row exists for (user, problem)
    pub fn vote_exists(&self, user: UserId, problem: ProblemId) -> Result<bool> {
        self.problems
            .get(&problem)
            .map(|entry| entry.voters.contains_key(&user))
            .ok_or_else(|| AgoraError::NotFound(format!("problem {problem}")))
    }

    /// Insert a vote row and bump the counter in the same unit of work.
    ///
    /// Returns the new authoritative count. Fails with `SelfVote` when the
    /// voter proposed the problem, `DuplicateVote` when a row already exists.
    pub fn insert_vote(&self, user: UserId, problem: ProblemId) -> Result<u32> {
        let new_count = {
            let mut entry = self
                .problems
                .get_mut(&problem)
                .ok_or_else(|| AgoraError::NotFound(format!("problem {problem}")))?;

            if entry.problem.proposer == user {
                return Err(AgoraError::SelfVote(problem));
            }
            if entry.voters.contains_key(&user) {
                return Err(AgoraError::DuplicateVote(problem));
            }

            entry.voters.insert(user, Utc::now());
            entry.problem.vote_count += 1;
            entry.problem.updated_at = Utc::now();
            entry.problem.vote_count
        };

        // Best-effort tally, outside the critical section
        self.tallies.record_cast(user);
        debug!(problem = %problem, user = %user, count = new_count, "Vote inserted");
        Ok(new_count)
    }

    /// Delete a vote row and decrement the counter in the same unit of work.
    ///
    /// Reports `NotFound` when the pair does not exist so callers can tell a
    /// benign no-op from a generic failure. The decrement is clamped at zero.
    pub fn delete_vote(&self, user: UserId, problem: ProblemId) -> Result<u32> {
        let new_count = {
            let mut entry = self
                .problems
                .get_mut(&problem)
                .ok_or_else(|| AgoraError::NotFound(format!("problem {problem}")))?;

            if entry.voters.remove(&user).is_none() {
                return Err(AgoraError::NotFound(format!(
                    "vote by {user} on problem {problem}"
                )));
            }

            entry.problem.vote_count = entry.problem.vote_count.saturating_sub(1);
            entry.problem.updated_at = Utc::now();
            entry.problem.vote_count
        };

        self.tallies.record_retract(user);
        debug!(problem = %problem, user = %user, count = new_count, "Vote deleted");
        Ok(new_count)
    }

    /// Toggle a user's vote on a problem.
    ///
    /// The read and the branch both happen inside one critical section, so a
    /// benign double-toggle race resolves to last-write-wins on intent and
    /// the ledger can never double-apply.
    pub fn toggle_vote(&self, user: UserId, problem: ProblemId) -> Result<ToggleOutcome> {
        self.toggle_vote_with(user, problem, |_| {})
    }

    /// Toggle with a commit hook that runs inside the critical section,
    /// after the mutation is applied but before the entry lock is released.
    ///
    /// Hooks observe outcomes in commit order — two concurrent toggles on the
    /// same problem can never invoke their hooks inverted. The hook must not
    /// block; the vote API uses it for the non-blocking broadcast publish.
    pub fn toggle_vote_with<F>(
        &self,
        user: UserId,
        problem: ProblemId,
        on_commit: F,
    ) -> Result<ToggleOutcome>
    where
        F: FnOnce(&ToggleOutcome),
    {
        let outcome = {
            let mut entry = self
                .problems
                .get_mut(&problem)
                .ok_or_else(|| AgoraError::NotFound(format!("problem {problem}")))?;

            let outcome = if entry.voters.contains_key(&user) {
                entry.voters.remove(&user);
                entry.problem.vote_count = entry.problem.vote_count.saturating_sub(1);
                entry.problem.updated_at = Utc::now();
                ToggleOutcome {
                    has_voted: false,
                    new_vote_count: entry.problem.vote_count,
                }
            } else {
                if entry.problem.proposer == user {
                    return Err(AgoraError::SelfVote(problem));
                }
                entry.voters.insert(user, Utc::now());
                entry.problem.vote_count += 1;
                entry.problem.updated_at = Utc::now();
                ToggleOutcome {
                    has_voted: true,
                    new_vote_count: entry.problem.vote_count,
                }
            };
            // Still inside the entry lock: hooks fire in commit order
            on_commit(&outcome);
            outcome
        };

        if outcome.has_voted {
            self.tallies.record_cast(user);
        } else {
            self.tallies.record_retract(user);
        }
        debug!(
            problem = %problem,
            user = %user,
            has_voted = outcome.has_voted,
            count = outcome.new_vote_count,
            "Vote toggled"
        );
        Ok(outcome)
    }

    /// Vote status for a caller.
    ///
    /// Unauthenticated callers get `has_voted = false` and the public counter.
    pub fn vote_status(&self, user: Option<UserId>, problem: ProblemId) -> Result<VoteStatus> {
        let entry = self
            .problems
            .get(&problem)
            .ok_or_else(|| AgoraError::NotFound(format!("problem {problem}")))?;
        let has_voted = user
            .map(|u| entry.voters.contains_key(&u))
            .unwrap_or(false);
        Ok(VoteStatus {
            has_voted,
            vote_count: entry.problem.vote_count,
        })
    }

    /// Best-effort count of ledger rows owned by a user
    pub fn total_votes_cast(&self, user: UserId) -> i64 {
        self.tallies.total_votes_cast(user)
    }

    /// Number of problems in the ledger
    pub fn problem_count(&self) -> usize {
        self.problems.len()
    }

    /// Repair scan: recompute every counter from its vote rows.
    ///
    /// This is a migration/repair tool, never request-path behavior — the
    /// request path trusts the denormalized counter exclusively. Under the
    /// consistency model the scan should find nothing; corrections are logged
    /// loudly because each one is a bug somewhere else.
    pub fn repair_counts(&self) -> Vec<RepairedCount> {
        let mut repaired = Vec::new();
        for mut entry in self.problems.iter_mut() {
            let actual = entry.voters.len() as u32;
            let stored = entry.problem.vote_count;
            if stored != actual {
                warn!(
                    problem = %entry.problem.id,
                    stored,
                    actual,
                    "Vote count drift repaired"
                );
                repaired.push(RepairedCount {
                    problem_id: entry.problem.id,
                    stored,
                    actual,
                });
                entry.problem.vote_count = actual;
                entry.problem.updated_at = Utc::now();
            }
        }
        repaired
    }
}

impl Default for VoteLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn seed_problem(ledger: &VoteLedger) -> (UserId, Problem) {
        let proposer = user();
        let problem = ledger.create_problem(
            proposer,
            NewProblem {
                title: "Fix the fountain".into(),
                description: "The piazza fountain has been dry for a year".into(),
                category: "public-spaces".into(),
            },
        );
        (proposer, problem)
    }

    #[test]
    fn create_starts_with_proposer_vote() {
        let ledger = VoteLedger::new();
        let (proposer, problem) = seed_problem(&ledger);

        assert_eq!(problem.vote_count, 1);
        let status = ledger.vote_status(Some(proposer), problem.id).unwrap();
        assert!(status.has_voted);
        assert_eq!(status.vote_count, 1);
        assert_eq!(ledger.total_votes_cast(proposer), 1);
    }

    #[test]
    fn insert_then_delete_keeps_counter_exact() {
        let ledger = VoteLedger::new();
        let (_, problem) = seed_problem(&ledger);
        let voter = user();

        assert_eq!(ledger.insert_vote(voter, problem.id).unwrap(), 2);
        assert!(ledger.vote_exists(voter, problem.id).unwrap());
        assert_eq!(ledger.delete_vote(voter, problem.id).unwrap(), 1);
        assert!(!ledger.vote_exists(voter, problem.id).unwrap());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let ledger = VoteLedger::new();
        let (_, problem) = seed_problem(&ledger);
        let voter = user();

        ledger.insert_vote(voter, problem.id).unwrap();
        match ledger.insert_vote(voter, problem.id) {
            Err(AgoraError::DuplicateVote(id)) => assert_eq!(id, problem.id),
            other => panic!("expected DuplicateVote, got {other:?}"),
        }
        assert_eq!(ledger.get_problem(problem.id).unwrap().vote_count, 2);
    }

    #[test]
    fn self_vote_is_rejected_and_counter_unchanged() {
        let ledger = VoteLedger::new();
        let (proposer, problem) = seed_problem(&ledger);

        match ledger.insert_vote(proposer, problem.id) {
            Err(AgoraError::SelfVote(id)) => assert_eq!(id, problem.id),
            other => panic!("expected SelfVote, got {other:?}"),
        }
        match ledger.toggle_vote(proposer, problem.id) {
            // toggle-off of the auto-vote is allowed; toggling back on is not
            Ok(outcome) => {
                assert!(!outcome.has_voted);
                assert_eq!(outcome.new_vote_count, 0);
                assert!(matches!(
                    ledger.toggle_vote(proposer, problem.id),
                    Err(AgoraError::SelfVote(_))
                ));
            }
            Err(e) => panic!("toggle-off of auto-vote should succeed, got {e:?}"),
        }
    }

    #[test]
    fn delete_missing_vote_reports_not_found() {
        let ledger = VoteLedger::new();
        let (_, problem) = seed_problem(&ledger);

        assert!(matches!(
            ledger.delete_vote(user(), problem.id),
            Err(AgoraError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_problem_reports_not_found() {
        let ledger = VoteLedger::new();
        assert!(matches!(
            ledger.toggle_vote(user(), ProblemId(Uuid::new_v4())),
            Err(AgoraError::NotFound(_))
        ));
    }

    #[test]
    fn toggle_twice_returns_to_original_pair() {
        let ledger = VoteLedger::new();
        let (_, problem) = seed_problem(&ledger);
        // Bring the counter to 5 like the reference scenario
        for _ in 0..4 {
            ledger.insert_vote(user(), problem.id).unwrap();
        }
        let voter = user();

        let first = ledger.toggle_vote(voter, problem.id).unwrap();
        assert!(first.has_voted);
        assert_eq!(first.new_vote_count, 6);

        let second = ledger.toggle_vote(voter, problem.id).unwrap();
        assert!(!second.has_voted);
        assert_eq!(second.new_vote_count, 5);
    }

    #[test]
    fn unauthenticated_status_is_public_view() {
        let ledger = VoteLedger::new();
        let (_, problem) = seed_problem(&ledger);

        let status = ledger.vote_status(None, problem.id).unwrap();
        assert!(!status.has_voted);
        assert_eq!(status.vote_count, 1);
    }

    #[test]
    fn repair_finds_nothing_after_normal_traffic() {
        let ledger = VoteLedger::new();
        let (_, problem) = seed_problem(&ledger);
        for _ in 0..10 {
            ledger.insert_vote(user(), problem.id).unwrap();
        }
        assert!(ledger.repair_counts().is_empty());
    }

    #[tokio::test]
    async fn concurrent_distinct_voters_all_land() {
        let ledger = Arc::new(VoteLedger::new());
        let (_, problem) = seed_problem(&ledger);
        let n: u32 = 64;

        let mut handles = Vec::new();
        for _ in 0..n {
            let ledger = Arc::clone(&ledger);
            let pid = problem.id;
            handles.push(tokio::spawn(async move {
                ledger.toggle_vote(user(), pid).unwrap()
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(outcome.has_voted);
        }

        let final_count = ledger.get_problem(problem.id).unwrap().vote_count;
        assert_eq!(final_count, 1 + n);
        assert!(ledger.repair_counts().is_empty());
    }

    #[tokio::test]
    async fn commit_hooks_fire_in_commit_order() {
        use std::sync::Mutex;

        let ledger = Arc::new(VoteLedger::new());
        let (_, problem) = seed_problem(&ledger);
        let published: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let n: u32 = 64;

        let mut handles = Vec::new();
        for _ in 0..n {
            let ledger = Arc::clone(&ledger);
            let published = Arc::clone(&published);
            let pid = problem.id;
            handles.push(tokio::spawn(async move {
                ledger
                    .toggle_vote_with(user(), pid, |outcome| {
                        published.lock().unwrap().push(outcome.new_vote_count);
                    })
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Toggle-ons by distinct users only increase the counter, so hooks
        // sequenced under the entry lock must record a strictly increasing
        // series; an inversion means a hook ran outside its commit's lock.
        let recorded = published.lock().unwrap();
        let expected: Vec<u32> = (2..=n + 1).collect();
        assert_eq!(*recorded, expected);
    }

    #[tokio::test]
    async fn concurrent_same_pair_inserts_one_success_one_duplicate() {
        let ledger = Arc::new(VoteLedger::new());
        let (_, problem) = seed_problem(&ledger);
        let voter = user();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = Arc::clone(&ledger);
            let pid = problem.id;
            handles.push(tokio::spawn(async move { ledger.insert_vote(voter, pid) }));
        }

        let mut ok = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AgoraError::DuplicateVote(_)) => duplicate += 1,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert_eq!((ok, duplicate), (1, 1));
        assert_eq!(ledger.get_problem(problem.id).unwrap().vote_count, 2);
    }
}
