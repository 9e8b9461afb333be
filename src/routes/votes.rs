//! Vote API endpoint
//!
//! The single trusted mutation path for the vote ledger; clients never write
//! to it directly. `POST /problems/{id}/vote` toggles, `GET` reports status.
//!
//! The `vote_update` publish is issued by the toggle's commit hook, inside
//! the ledger's per-problem critical section, so publish order always equals
//! commit order. It is fire-and-forget and non-blocking — a fan-out failure
//! never fails the API call or leaves partial state.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{error_response, json_response};
use crate::server::AppState;
use crate::types::{AgoraError, ProblemId};

/// Response body for `POST /problems/{id}/vote`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub success: bool,
    pub has_voted: bool,
    pub new_vote_count: u32,
    pub message: &'static str,
}

/// Request body for `POST /realtime/votes` (decoupled broadcast trigger).
///
/// Publishers may send extra fields (e.g. `hasVoted`); only the problem id
/// and count matter to the fan-out, the rest is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub problem_id: ProblemId,
    pub new_vote_count: u32,
}

/// Parse a problem id path segment
pub(super) fn parse_problem_id(segment: &str) -> Result<ProblemId, AgoraError> {
    Uuid::parse_str(segment)
        .map(ProblemId)
        .map_err(|_| AgoraError::BadRequest(format!("Invalid problem id: {segment}")))
}

/// Handle `GET /problems/{id}/vote`
///
/// Anonymous callers get the public view: `hasVoted` is always false and
/// `voteCount` is the public counter. An invalid credential is still a 401.
pub async fn handle_vote_status(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id_segment: &str,
) -> Response<Full<Bytes>> {
    let result = (|| {
        let problem_id = parse_problem_id(id_segment)?;
        let identity = state.auth.identify(req.headers())?;
        state
            .ledger
            .vote_status(identity.map(|i| i.user_id), problem_id)
    })();

    match result {
        Ok(status) => json_response(StatusCode::OK, &status),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /problems/{id}/vote`
///
/// Toggles the caller's vote and returns authoritative post-mutation state —
/// never an echo of client-supplied state.
pub async fn handle_vote_toggle(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id_segment: &str,
) -> Response<Full<Bytes>> {
    let problem_id = match parse_problem_id(id_segment) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    let identity = match state.auth.require(req.headers()) {
        Ok(identity) => identity,
        Err(e) => return error_response(&e),
    };

    // Publish inside the commit hook so concurrent toggles on the same
    // problem broadcast in commit order
    let outcome = match state.ledger.toggle_vote_with(identity.user_id, problem_id, |o| {
        state.hub.publish(problem_id, o.new_vote_count);
    }) {
        Ok(outcome) => outcome,
        Err(e) => return error_response(&e),
    };

    info!(
        problem = %problem_id,
        user = %identity.user_id,
        has_voted = outcome.has_voted,
        count = outcome.new_vote_count,
        "Vote toggled via API"
    );

    json_response(
        StatusCode::OK,
        &ToggleResponse {
            success: true,
            has_voted: outcome.has_voted,
            new_vote_count: outcome.new_vote_count,
            message: if outcome.has_voted {
                "Vote recorded"
            } else {
                "Vote removed"
            },
        },
    )
}

/// Handle `POST /realtime/votes`
///
/// Broadcast trigger for deployments where the fan-out channel runs decoupled
/// from the mutation process. Restricted to admin identities so clients
/// cannot spoof counts.
pub async fn handle_realtime_publish(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
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

    let publish: PublishRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return error_response(&AgoraError::BadRequest(format!("Invalid JSON: {e}"))),
    };

    state
        .hub
        .publish(publish.problem_id, publish.new_vote_count);

    json_response(StatusCode::ACCEPTED, &serde_json::json!({ "success": true }))
}
