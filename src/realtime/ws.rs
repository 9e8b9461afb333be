//! WebSocket transport for the vote-update stream
//!
//! ## Protocol
//!
//! Connect: `GET /realtime/votes?problemIds=<comma-separated>` with a
//! WebSocket upgrade. The query ids seed the connection's subscription set.
//!
//! Messages (server → client):
//! - `connected` - handshake acknowledgment
//! - `initial_vote_count` - current-value snapshot per subscribed id,
//!   sent on connect and whenever an id is added to the set
//! - `vote_update` - a committed vote-count change
//! - `ping` - periodic heartbeat
//!
//! Messages (client → server):
//! - `subscribe` / `unsubscribe` - adjust the subscription set
//! - `ping` - keep-alive
//!
//! The subscription set is in-memory per connection and dies with it; the
//! server does not buffer events for disconnected clients. Reconnecting
//! clients simply resume with the next live event plus fresh snapshots.

use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::hub::{ClientMessage, ServerMessage};
use crate::server::AppState;
use crate::types::ProblemId;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Handle WebSocket upgrade for the vote-update stream
pub async fn handle_realtime_ws(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if state.hub.is_at_capacity() {
        return Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(
                r#"{"error": "Realtime service at capacity"}"#,
            )))
            .unwrap();
    }

    if !hyper_tungstenite::is_upgrade_request(&req) {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(
                r#"{"error": "WebSocket upgrade required"}"#,
            )))
            .unwrap();
    }

    let initial_ids = parse_problem_ids(req.uri().query());

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            warn!("Realtime WebSocket upgrade failed: {}", e);
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from("WebSocket upgrade failed")))
                .unwrap();
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                let ws: HyperWebSocket = ws;
                if let Err(e) = handle_realtime_connection(ws, state, initial_ids).await {
                    warn!("Realtime WebSocket error: {}", e);
                }
            }
            Err(e) => {
                warn!("Realtime WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

/// Parse `problemIds=<comma-separated uuids>` from a query string.
///
/// Unparseable ids are dropped rather than failing the connection.
pub fn parse_problem_ids(query: Option<&str>) -> HashSet<ProblemId> {
    let Some(query) = query else {
        return HashSet::new();
    };
    query
        .split('&')
        .find_map(|p| p.strip_prefix("problemIds="))
        .map(|ids| {
            ids.split(',')
                .filter_map(|s| Uuid::parse_str(s.trim()).ok())
                .map(ProblemId)
                .collect()
        })
        .unwrap_or_default()
}

/// Handle an individual realtime connection
async fn handle_realtime_connection(
    ws: HyperWebSocket,
    state: Arc<AppState>,
    initial_ids: HashSet<ProblemId>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _guard = state.hub.register_connection();
    let (mut sender, mut receiver) = ws.split();
    let max_subscriptions = state.args.realtime_max_subscriptions;

    info!(
        subscriptions = initial_ids.len(),
        connections = state.hub.connection_count(),
        "Realtime client connected"
    );

    let mut subscribed = initial_ids;
    subscribed = truncate_to(subscribed, max_subscriptions);

    let connected = ServerMessage::Connected {
        timestamp: now_iso(),
    };
    sender
        .send(WsMessage::Text(serde_json::to_string(&connected)?))
        .await?;

    // Current-value snapshot for every subscribed id the ledger knows about
    for id in &subscribed {
        if let Some(msg) = snapshot_message(&state, *id) {
            sender
                .send(WsMessage::Text(serde_json::to_string(&msg)?))
                .await?;
        }
    }

    let mut rx = state.hub.subscribe();
    let mut ping_ticker = interval(Duration::from_secs(state.args.realtime_ping_secs));
    ping_ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            // Committed vote update from the hub
            event = rx.recv() => {
                match event {
                    Ok(event) if subscribed.contains(&event.problem_id) => {
                        let msg = ServerMessage::from_event(&event);
                        if sender
                            .send(WsMessage::Text(serde_json::to_string(&msg)?))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(_) => {} // not subscribed to this problem
                    Err(broadcast::error::RecvError::Closed) => break,
                    // At-most-once delivery: dropped events are acceptable
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Realtime subscriber lagged, events dropped");
                        continue;
                    }
                }
            }

            // Heartbeat
            _ = ping_ticker.tick() => {
                let ping = ServerMessage::Ping { timestamp: now_iso() };
                if sender
                    .send(WsMessage::Text(serde_json::to_string(&ping)?))
                    .await
                    .is_err()
                {
                    break;
                }
            }

            // Message from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) {
                            match client_msg {
                                ClientMessage::Subscribe { problem_ids } => {
                                    for id in problem_ids {
                                        if subscribed.len() >= max_subscriptions {
                                            warn!(
                                                max = max_subscriptions,
                                                "Subscription cap reached, ignoring new ids"
                                            );
                                            break;
                                        }
                                        if subscribed.insert(id) {
                                            if let Some(msg) = snapshot_message(&state, id) {
                                                let _ = sender
                                                    .send(WsMessage::Text(
                                                        serde_json::to_string(&msg)?,
                                                    ))
                                                    .await;
                                            }
                                        }
                                    }
                                }
                                ClientMessage::Unsubscribe { problem_ids } => {
                                    for id in problem_ids {
                                        subscribed.remove(&id);
                                    }
                                }
                                ClientMessage::Ping => {
                                    let pong = ServerMessage::Ping { timestamp: now_iso() };
                                    let _ = sender
                                        .send(WsMessage::Text(serde_json::to_string(&pong)?))
                                        .await;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Realtime client disconnected");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("Realtime WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    info!("Realtime connection closed");
    Ok(())
}

/// Build an `initial_vote_count` snapshot, or None for an unknown problem
fn snapshot_message(state: &AppState, id: ProblemId) -> Option<ServerMessage> {
    state
        .ledger
        .get_problem(id)
        .ok()
        .map(|p| ServerMessage::InitialVoteCount {
            problem_id: p.id,
            vote_count: p.vote_count,
            timestamp: now_iso(),
        })
}

fn truncate_to(set: HashSet<ProblemId>, max: usize) -> HashSet<ProblemId> {
    if set.len() <= max {
        return set;
    }
    set.into_iter().take(max).collect()
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_problem_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let query = format!("problemIds={a},{b}&other=1");
        let ids = parse_problem_ids(Some(&query));
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&ProblemId(a)));
        assert!(ids.contains(&ProblemId(b)));
    }

    #[test]
    fn test_parse_problem_ids_drops_garbage() {
        let a = Uuid::new_v4();
        let query = format!("problemIds=not-a-uuid,{a}");
        let ids = parse_problem_ids(Some(&query));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_parse_problem_ids_missing_param() {
        assert!(parse_problem_ids(None).is_empty());
        assert!(parse_problem_ids(Some("foo=bar")).is_empty());
    }

    #[test]
    fn test_snapshot_matches_authoritative_count() {
        use crate::config::Args;
        use crate::ledger::NewProblem;
        use crate::types::UserId;
        use clap::Parser;

        let state = AppState::new(Args::parse_from(["agora", "--dev-mode"]));
        let problem = state.ledger.create_problem(
            UserId(Uuid::new_v4()),
            NewProblem {
                title: "Community garden plots".into(),
                description: "Turn the empty lot into allotments".into(),
                category: "green-spaces".into(),
            },
        );
        state
            .ledger
            .insert_vote(UserId(Uuid::new_v4()), problem.id)
            .unwrap();

        // A (re)connecting client's snapshot carries the current count
        match snapshot_message(&state, problem.id) {
            Some(ServerMessage::InitialVoteCount {
                problem_id,
                vote_count,
                ..
            }) => {
                assert_eq!(problem_id, problem.id);
                assert_eq!(vote_count, 2);
            }
            other => panic!("expected InitialVoteCount, got {other:?}"),
        }

        // Unknown ids produce no snapshot rather than an error frame
        assert!(snapshot_message(&state, ProblemId(Uuid::new_v4())).is_none());
    }
}
