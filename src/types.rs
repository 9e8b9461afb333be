//! Shared types and error taxonomy for Agora
//!
//! Every storage-layer violation is translated into one of these variants at
//! the API boundary; raw internal messages never leak to clients.

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

/// Identifier of a proposed problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemId(pub Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ProblemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error types for Agora operations
#[derive(Debug, Error)]
pub enum AgoraError {
    /// Caller has no valid identity
    #[error("Authentication required")]
    Unauthenticated,

    /// Caller is authenticated but lacks the required privilege
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Referenced problem, user or vote row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A vote row already exists for this (user, problem) pair
    #[error("Already voted on problem {0}")]
    DuplicateVote(ProblemId),

    /// Proposer attempting to vote on their own problem
    #[error("Cannot vote on your own problem {0}")]
    SelfVote(ProblemId),

    /// Push channel failed to (re)connect after exhausting retries
    #[error("Realtime connection failed after {attempts} attempts: {reason}")]
    RealtimeConnection { attempts: u32, reason: String },

    /// Malformed request payload
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Client-side toggle did not resolve within the bounded window
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else; message is for logs, not clients
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgoraError {
    /// HTTP status this error maps to at the route boundary
    pub fn status(&self) -> StatusCode {
        match self {
            AgoraError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AgoraError::Forbidden(_) => StatusCode::FORBIDDEN,
            AgoraError::NotFound(_) => StatusCode::NOT_FOUND,
            AgoraError::DuplicateVote(_) | AgoraError::SelfVote(_) => StatusCode::CONFLICT,
            AgoraError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AgoraError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AgoraError::RealtimeConnection { .. }
            | AgoraError::Io(_)
            | AgoraError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AgoraError::Unauthenticated => "unauthenticated",
            AgoraError::Forbidden(_) => "forbidden",
            AgoraError::NotFound(_) => "not_found",
            AgoraError::DuplicateVote(_) => "duplicate_vote",
            AgoraError::SelfVote(_) => "self_vote",
            AgoraError::RealtimeConnection { .. } => "realtime_connection",
            AgoraError::BadRequest(_) => "bad_request",
            AgoraError::Timeout(_) => "timeout",
            AgoraError::Io(_) => "io",
            AgoraError::Internal(_) => "internal",
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AgoraError>;
