//! HTTP transport for the vote API
//!
//! Thin reqwest binding for `VoteApi`; the reconciler owns all state, this
//! layer only translates requests and error bodies.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::reconciler::VoteApi;
use super::state::VoteView;
use crate::types::{AgoraError, ProblemId, Result};

/// `VoteApi` over HTTP, speaking to an Agora node
pub struct HttpVoteApi {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

/// Body of `GET /problems/{id}/vote`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    has_voted: bool,
    vote_count: u32,
}

/// Body of `POST /problems/{id}/vote`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleBody {
    has_voted: bool,
    new_vote_count: u32,
}

/// Error body shape shared by every endpoint
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

impl HttpVoteApi {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Translate a non-2xx response into the matching error variant
    async fn classify_error(problem: ProblemId, response: reqwest::Response) -> AgoraError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            error: String::new(),
            message: String::new(),
        });
        match (status, body.error.as_str()) {
            (_, "duplicate_vote") => AgoraError::DuplicateVote(problem),
            (_, "self_vote") => AgoraError::SelfVote(problem),
            (StatusCode::UNAUTHORIZED, _) => AgoraError::Unauthenticated,
            (StatusCode::FORBIDDEN, _) => AgoraError::Forbidden(body.message),
            (StatusCode::NOT_FOUND, _) => AgoraError::NotFound(format!("problem {problem}")),
            (StatusCode::BAD_REQUEST, _) => AgoraError::BadRequest(body.message),
            _ => AgoraError::Internal(format!("Unexpected status {status}: {}", body.message)),
        }
    }
}

#[async_trait]
impl VoteApi for HttpVoteApi {
    async fn fetch_status(&self, problem: ProblemId) -> Result<VoteView> {
        let response = self
            .request(reqwest::Method::GET, &format!("/problems/{problem}/vote"))
            .send()
            .await
            .map_err(|e| AgoraError::Internal(format!("Status request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::classify_error(problem, response).await);
        }
        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| AgoraError::Internal(format!("Malformed status body: {e}")))?;
        Ok(VoteView {
            has_voted: body.has_voted,
            vote_count: body.vote_count,
        })
    }

    async fn toggle(&self, problem: ProblemId) -> Result<VoteView> {
        let response = self
            .request(reqwest::Method::POST, &format!("/problems/{problem}/vote"))
            .send()
            .await
            .map_err(|e| AgoraError::Internal(format!("Toggle request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::classify_error(problem, response).await);
        }
        let body: ToggleBody = response
            .json()
            .await
            .map_err(|e| AgoraError::Internal(format!("Malformed toggle body: {e}")))?;
        Ok(VoteView {
            has_voted: body.has_voted,
            vote_count: body.new_vote_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let api = HttpVoteApi::new("http://localhost:8080/", None);
        assert_eq!(api.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_status_body_is_camel_case() {
        let body: StatusBody =
            serde_json::from_str(r#"{"hasVoted":true,"voteCount":7}"#).unwrap();
        assert!(body.has_voted);
        assert_eq!(body.vote_count, 7);
    }

    #[test]
    fn test_toggle_body_is_camel_case() {
        let body: ToggleBody =
            serde_json::from_str(r#"{"success":true,"hasVoted":false,"newVoteCount":4,"message":"Vote removed"}"#)
                .unwrap();
        assert!(!body.has_voted);
        assert_eq!(body.new_vote_count, 4);
    }
}
