//! HTTP routes for Agora

pub mod admin;
pub mod health;
pub mod problems;
pub mod votes;

pub use admin::handle_repair_vote_counts;
pub use health::{health_check, readiness_check, version_info};
pub use problems::{
    handle_create_problem, handle_get_problem, handle_set_status, handle_user_votes,
};
pub use votes::{handle_realtime_publish, handle_vote_status, handle_vote_toggle};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::AgoraError;

/// JSON response with permissive CORS, for browser clients
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"error": "Internal serialization error"}"#.to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Translate an error into its JSON representation at the route boundary.
///
/// Raw storage/internal messages are replaced with a generic message; the
/// taxonomy variants carry human-readable text that is safe to surface.
pub fn error_response(err: &AgoraError) -> Response<Full<Bytes>> {
    let status = err.status();
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "Internal error".to_string()
    } else {
        err.to_string()
    };
    let body = serde_json::json!({
        "success": false,
        "error": err.code(),
        "message": message,
    });
    json_response(status, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProblemId;
    use uuid::Uuid;

    #[test]
    fn test_error_response_hides_internal_detail() {
        let resp = error_response(&AgoraError::Internal("secret lock poisoned".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_surfaces_conflicts() {
        let resp = error_response(&AgoraError::DuplicateVote(ProblemId(Uuid::new_v4())));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
