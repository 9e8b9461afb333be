//! Vote update hub
//!
//! Broker between the Vote API (publisher) and realtime transports
//! (subscribers). Backed by a tokio broadcast channel; a publish with no
//! subscribers is a silent no-op, and a publish never blocks or fails the
//! mutation that triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::ProblemId;

/// Default capacity of the broadcast channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A committed vote-count change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteEvent {
    pub problem_id: ProblemId,
    pub new_vote_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Message sent from server to realtime clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Handshake acknowledgment after (re)connect
    Connected { timestamp: String },
    /// Current-value snapshot for a subscribed problem
    InitialVoteCount {
        problem_id: ProblemId,
        vote_count: u32,
        timestamp: String,
    },
    /// A committed vote-count change
    VoteUpdate {
        problem_id: ProblemId,
        new_vote_count: u32,
        timestamp: String,
    },
    /// Keep-alive heartbeat
    Ping { timestamp: String },
}

impl ServerMessage {
    pub fn from_event(event: &VoteEvent) -> Self {
        ServerMessage::VoteUpdate {
            problem_id: event.problem_id,
            new_vote_count: event.new_vote_count,
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Message received from realtime clients
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Add problem ids to this connection's subscription set
    Subscribe {
        #[serde(default)]
        problem_ids: Vec<ProblemId>,
    },
    /// Remove problem ids from the subscription set
    Unsubscribe {
        #[serde(default)]
        problem_ids: Vec<ProblemId>,
    },
    /// Keep-alive ping
    Ping,
}

/// Hub for broadcasting vote updates to connected clients
pub struct VoteHub {
    sender: broadcast::Sender<VoteEvent>,
    /// Current realtime connection count
    connections: AtomicUsize,
    /// Maximum allowed realtime connections
    max_connections: usize,
}

impl VoteHub {
    /// Create a new hub with the given channel capacity and connection cap
    pub fn new(capacity: usize, max_connections: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            connections: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Subscribe to the vote-update stream
    pub fn subscribe(&self) -> broadcast::Receiver<VoteEvent> {
        self.sender.subscribe()
    }

    /// Publish a committed vote-count change.
    ///
    /// Fire-and-forget: a send error only means there are no subscribers.
    pub fn publish(&self, problem_id: ProblemId, new_vote_count: u32) {
        let event = VoteEvent {
            problem_id,
            new_vote_count,
            timestamp: Utc::now(),
        };
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(
            problem = %problem_id,
            count = new_vote_count,
            subscribers = delivered,
            "Vote update published"
        );
    }

    /// Check if the hub is at its connection cap
    pub fn is_at_capacity(&self) -> bool {
        self.connections.load(Ordering::Relaxed) >= self.max_connections
    }

    /// Current realtime connection count
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Register a connection; the returned guard deregisters on drop
    pub fn register_connection(&self) -> ConnectionGuard<'_> {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard { hub: self }
    }
}

impl Default for VoteHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY, 4096)
    }
}

/// Decrements the hub's connection count when a connection ends
pub struct ConnectionGuard<'a> {
    hub: &'a VoteHub,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.hub.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pid() -> ProblemId {
        ProblemId(Uuid::new_v4())
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = VoteHub::default();
        let mut rx = hub.subscribe();
        let problem = pid();

        hub.publish(problem, 6);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.problem_id, problem);
        assert_eq!(event.new_vote_count, 6);
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let hub = VoteHub::default();
        let mut rx = hub.subscribe();
        let problem = pid();

        hub.publish(problem, 5);
        hub.publish(problem, 6);
        hub.publish(problem, 7);

        assert_eq!(rx.recv().await.unwrap().new_vote_count, 5);
        assert_eq!(rx.recv().await.unwrap().new_vote_count, 6);
        assert_eq!(rx.recv().await.unwrap().new_vote_count, 7);
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let hub = VoteHub::default();
        hub.publish(pid(), 1);
    }

    #[test]
    fn connection_guard_tracks_count() {
        let hub = VoteHub::new(DEFAULT_CHANNEL_CAPACITY, 2);
        assert!(!hub.is_at_capacity());
        let g1 = hub.register_connection();
        let g2 = hub.register_connection();
        assert!(hub.is_at_capacity());
        drop(g1);
        assert!(!hub.is_at_capacity());
        drop(g2);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn server_message_envelope_shape() {
        let msg = ServerMessage::VoteUpdate {
            problem_id: pid(),
            new_vote_count: 6,
            timestamp: "2025-01-15T10:30:00Z".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"vote_update\""));
        assert!(json.contains("\"newVoteCount\":6"));
        assert!(json.contains("\"problemId\""));
    }

    #[test]
    fn client_message_parses_subscribe() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"type":"subscribe","problemIds":["{id}"]}}"#);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::Subscribe { problem_ids } => {
                assert_eq!(problem_ids, vec![ProblemId(id)]);
            }
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }
}
