//! Problem lifecycle routes
//!
//! Creation (with the proposer's auto-vote), public reads, privileged status
//! transitions, and the per-user vote tally.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::votes::parse_problem_id;
use super::{error_response, json_response};
use crate::ledger::{NewProblem, ProblemStatus};
use crate::server::AppState;
use crate::types::{AgoraError, UserId};

/// Handle `POST /problems`
///
/// Creates a problem; the record is born with the proposer's auto-vote
/// already applied (`voteCount == 1`).
pub async fn handle_create_problem(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let identity = match state.auth.require(req.headers()) {
        Ok(identity) => identity,
        Err(e) => return error_response(&e),
    };

    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return error_response(&AgoraError::BadRequest(
                "Failed to read request body".into(),
            ))
        }
    };

    let input: NewProblem = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return error_response(&AgoraError::BadRequest(format!("Invalid JSON: {e}"))),
    };

    let problem = state.ledger.create_problem(identity.user_id, input);
    info!(problem = %problem.id, proposer = %identity.user_id, "Problem proposed");

    json_response(StatusCode::CREATED, &problem)
}

/// Handle `GET /problems/{id}`
pub async fn handle_get_problem(
    state: Arc<AppState>,
    id_segment: &str,
) -> Response<Full<Bytes>> {
    let result = parse_problem_id(id_segment).and_then(|id| state.ledger.get_problem(id));
    match result {
        Ok(problem) => json_response(StatusCode::OK, &problem),
        Err(e) => error_response(&e),
    }
}

/// Request body for `PATCH /problems/{id}/status`
#[derive(Debug, Deserialize)]
struct StatusChange {
    status: ProblemStatus,
}

/// Handle `PATCH /problems/{id}/status` (admin only)
pub async fn handle_set_status(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id_segment: &str,
) -> Response<Full<Bytes>> {
    let problem_id = match parse_problem_id(id_segment) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    if let Err(e) = state.auth.require_admin(req.headers()) {
        return error_response(&e);
    }

    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return error_response(&AgoraError::BadRequest(
                "Failed to read request body".into(),
            ))
        }
    };

    let change: StatusChange = match serde_json::from_slice(&body) {
        Ok(c) => c,
        Err(e) => return error_response(&AgoraError::BadRequest(format!("Invalid JSON: {e}"))),
    };

    match state.ledger.set_status(problem_id, change.status) {
        Ok(problem) => {
            info!(problem = %problem_id, status = ?change.status, "Problem status changed");
            json_response(StatusCode::OK, &problem)
        }
        Err(e) => error_response(&e),
    }
}

/// Handle `GET /users/{id}/votes`
///
/// Best-effort tally; not held to the strict consistency of per-problem
/// counters.
pub async fn handle_user_votes(
    state: Arc<AppState>,
    id_segment: &str,
) -> Response<Full<Bytes>> {
    let user_id = match Uuid::parse_str(id_segment) {
        Ok(id) => UserId(id),
        Err(_) => {
            return error_response(&AgoraError::BadRequest(format!(
                "Invalid user id: {id_segment}"
            )))
        }
    };

    let total = state.ledger.total_votes_cast(user_id);
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "userId": user_id,
            "totalVotesCast": total,
        }),
    )
}
