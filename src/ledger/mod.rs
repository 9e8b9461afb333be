//! Vote ledger: durable, race-free storage of which user voted for which problem
//!
//! The storage engine behind the community platform's voting core. The ledger
//! owns the per-problem vote rows and the denormalized `vote_count`, and keeps
//! them equal inside a single critical section per mutation — the
//! application-level equivalent of database triggers.

pub mod problem;
pub mod store;
pub mod users;

pub use problem::{NewProblem, Problem, ProblemStatus};
pub use store::{RepairedCount, ToggleOutcome, VoteLedger, VoteStatus};
pub use users::UserTallies;
