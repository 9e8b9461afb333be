//! Problem records
//!
//! The public shape of a proposed problem. Vote rows live alongside the
//! record inside the ledger; this type is what API responses serialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ProblemId, UserId};

/// Lifecycle status of a problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemStatus {
    /// Newly proposed, collecting votes
    Proposed,
    /// Accepted and being worked on
    InDevelopment,
    /// Solution delivered
    Completed,
}

impl Default for ProblemStatus {
    fn default() -> Self {
        ProblemStatus::Proposed
    }
}

/// A proposed problem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Unique identifier
    pub id: ProblemId,

    /// Short title
    pub title: String,

    /// Full description
    pub description: String,

    /// Category reference (validated upstream; opaque here)
    pub category: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: ProblemStatus,

    /// Denormalized vote counter; always equals the number of vote rows
    pub vote_count: u32,

    /// User who proposed the problem
    pub proposer: UserId,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a problem
///
/// Field-level validation (lengths, allowed categories) is an external
/// collaborator's job; the ledger assumes inputs are already validated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProblem {
    pub title: String,
    pub description: String,
    pub category: String,
}

impl Problem {
    /// Create a fresh record for a proposer.
    ///
    /// Starts with `vote_count = 0`; the ledger's creation path bumps it to 1
    /// when it writes the proposer's auto-vote row.
    pub fn new(proposer: UserId, input: NewProblem) -> Self {
        let now = Utc::now();
        Self {
            id: ProblemId(Uuid::new_v4()),
            title: input.title,
            description: input.description,
            category: input.category,
            status: ProblemStatus::Proposed,
            vote_count: 0,
            proposer,
            created_at: now,
            updated_at: now,
        }
    }
}
