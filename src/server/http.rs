//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; routing is a plain
//! match over (method, path).

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::TokenValidator;
use crate::config::Args;
use crate::ledger::VoteLedger;
use crate::realtime::{handle_realtime_ws, VoteHub};
use crate::routes;
use crate::types::AgoraError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Authoritative vote ledger (problems, vote rows, counters)
    pub ledger: Arc<VoteLedger>,
    /// Vote-update fan-out hub
    pub hub: Arc<VoteHub>,
    /// Bearer-token validation
    pub auth: TokenValidator,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create application state from configuration
    pub fn new(args: Args) -> Self {
        let auth = TokenValidator::new(&args.jwt_secret(), args.dev_mode);
        let hub = Arc::new(VoteHub::new(
            args.realtime_channel_capacity,
            args.realtime_max_clients,
        ));
        Self {
            args,
            ledger: Arc::new(VoteLedger::new()),
            hub,
            auth,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), AgoraError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Agora listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - X-Dev-User header accepted");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(Arc::clone(&state)))
        }

        // Readiness probe
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            to_boxed(routes::readiness_check(Arc::clone(&state)))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => to_boxed(routes::version_info()),

        // CORS preflight
        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        // ====================================================================
        // Realtime vote-update stream
        // ====================================================================

        // WebSocket upgrade: GET /realtime/votes?problemIds=a,b,c
        (Method::GET, "/realtime/votes") => {
            if hyper_tungstenite::is_upgrade_request(&req) {
                return Ok(to_boxed(handle_realtime_ws(state, req).await));
            }
            to_boxed(bad_request_response(
                "WebSocket upgrade required for /realtime/votes",
            ))
        }

        // Decoupled broadcast trigger
        (Method::POST, "/realtime/votes") => {
            to_boxed(routes::handle_realtime_publish(req, state).await)
        }

        // ====================================================================
        // Problems and votes
        // ====================================================================

        // Propose a problem (auto-votes for the proposer)
        (Method::POST, "/problems") => {
            to_boxed(routes::handle_create_problem(req, state).await)
        }

        // Vote status for the calling user
        (Method::GET, p) if p.starts_with("/problems/") && p.ends_with("/vote") => {
            let id = p
                .strip_prefix("/problems/")
                .and_then(|s| s.strip_suffix("/vote"))
                .unwrap_or("");
            to_boxed(routes::handle_vote_status(req, state, id).await)
        }

        // Toggle the calling user's vote
        (Method::POST, p) if p.starts_with("/problems/") && p.ends_with("/vote") => {
            let id = p
                .strip_prefix("/problems/")
                .and_then(|s| s.strip_suffix("/vote"))
                .unwrap_or("");
            to_boxed(routes::handle_vote_toggle(req, state, id).await)
        }

        // Status transition (admin)
        (Method::PATCH, p) if p.starts_with("/problems/") && p.ends_with("/status") => {
            let id = p
                .strip_prefix("/problems/")
                .and_then(|s| s.strip_suffix("/status"))
                .unwrap_or("");
            to_boxed(routes::handle_set_status(req, state, id).await)
        }

        // Public problem record
        (Method::GET, p) if p.starts_with("/problems/") => {
            let id = p.strip_prefix("/problems/").unwrap_or("");
            to_boxed(routes::handle_get_problem(state, id).await)
        }

        // Per-user vote tally (best-effort)
        (Method::GET, p) if p.starts_with("/users/") && p.ends_with("/votes") => {
            let id = p
                .strip_prefix("/users/")
                .and_then(|s| s.strip_suffix("/votes"))
                .unwrap_or("");
            to_boxed(routes::handle_user_votes(state, id).await)
        }

        // ====================================================================
        // Admin maintenance
        // ====================================================================

        // Counter repair scan (admin)
        (Method::POST, "/admin/repair/vote-counts") => {
            to_boxed(routes::handle_repair_vote_counts(req, state).await)
        }

        // Not found
        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PATCH, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Bad request response
fn bad_request_response(message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Bad Request",
        "message": message,
    });

    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
