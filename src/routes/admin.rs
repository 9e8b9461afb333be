//! Admin maintenance routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, json_response};
use crate::server::AppState;

/// Handle `POST /admin/repair/vote-counts`
///
/// Full ledger scan recomputing every denormalized counter. A repair tool,
/// not request-path behavior: under the consistency model it should find
/// nothing, and every correction it reports is a bug elsewhere.
pub async fn handle_repair_vote_counts(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    if let Err(e) = state.auth.require_admin(req.headers()) {
        return error_response(&e);
    }

    let repaired = state.ledger.repair_counts();
    if repaired.is_empty() {
        info!("Vote count repair scan: no drift found");
    } else {
        warn!(corrections = repaired.len(), "Vote count repair scan corrected drift");
    }

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "scanned": state.ledger.problem_count(),
            "corrections": repaired.len(),
            "repaired": repaired,
        }),
    )
}
