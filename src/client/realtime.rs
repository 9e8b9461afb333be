//! Realtime subscriber
//!
//! Client side of `GET /realtime/votes`: connects, feeds pushed vote counts
//! into a `PushSink`, and reconnects with jittered exponential backoff. The
//! push channel is an accelerator — the caller falls back to polled reads
//! when it gives up.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::realtime::ServerMessage;
use crate::types::{AgoraError, ProblemId, Result};

/// Receives pushed vote-count updates; implemented by `VoteReconciler`
pub trait PushSink: Send + Sync {
    fn apply_update(&self, problem: ProblemId, vote_count: u32);
}

/// Jittered exponential backoff between reconnect attempts
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 8,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt (1-based), with up to 25% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        base.mul_f64(1.0 + jitter).min(self.max_delay)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Delay before the given connection attempt (1-based): the first
    /// attempt connects immediately, the first retry waits the base delay,
    /// and each further retry doubles.
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt > 1).then(|| self.delay_for(attempt - 1))
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8080/realtime/votes`
    pub url: String,
    /// Problems to subscribe to at connect time
    pub problem_ids: Vec<ProblemId>,
    pub backoff: BackoffPolicy,
}

impl RealtimeConfig {
    /// Endpoint URL with the subscription list in the query string
    fn connect_url(&self) -> String {
        if self.problem_ids.is_empty() {
            return self.url.clone();
        }
        let ids: Vec<String> = self.problem_ids.iter().map(|p| p.to_string()).collect();
        format!("{}?problemIds={}", self.url, ids.join(","))
    }
}

/// Apply one server message to the sink; returns false for ignored frames
fn handle_server_message<S: PushSink>(sink: &S, message: &ServerMessage) -> bool {
    match message {
        ServerMessage::InitialVoteCount {
            problem_id,
            vote_count,
            ..
        } => {
            sink.apply_update(*problem_id, *vote_count);
            true
        }
        ServerMessage::VoteUpdate {
            problem_id,
            new_vote_count,
            ..
        } => {
            sink.apply_update(*problem_id, *new_vote_count);
            true
        }
        ServerMessage::Connected { .. } | ServerMessage::Ping { .. } => false,
    }
}

/// Run the subscriber loop until the caller drops the task or retries run out.
///
/// Each successful connection resets the attempt counter, so a long-lived
/// session that drops once starts over with a short delay.
pub async fn run_subscriber<S: PushSink>(config: RealtimeConfig, sink: &S) -> Result<()> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if let Some(delay) = config.backoff.retry_delay(attempt) {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Realtime backoff");
            tokio::time::sleep(delay).await;
        }

        let url = config.connect_url();
        let (mut stream, _) = match connect_async(&url).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(attempt, error = %e, "Realtime connect failed");
                if config.backoff.exhausted(attempt) {
                    return Err(AgoraError::RealtimeConnection {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                continue;
            }
        };
        info!(url = %config.url, "Realtime channel connected");
        attempt = 0;

        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => {
                        handle_server_message(sink, &message);
                    }
                    Err(e) => debug!(error = %e, "Ignoring unparseable realtime frame"),
                },
                Ok(Message::Ping(payload)) => {
                    if stream.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Realtime channel closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Realtime channel error");
                    break;
                }
            }
        }
        // Fell out of the read loop: reconnect with backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use uuid::Uuid;

    struct RecordingSink {
        updates: DashMap<ProblemId, u32>,
    }

    impl PushSink for RecordingSink {
        fn apply_update(&self, problem: ProblemId, vote_count: u32) {
            self.updates.insert(problem, vote_count);
        }
    }

    fn pid() -> ProblemId {
        ProblemId(Uuid::new_v4())
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 8,
        };
        assert!(policy.delay_for(1) >= Duration::from_millis(100));
        assert!(policy.delay_for(1) <= Duration::from_millis(125));
        assert!(policy.delay_for(4) >= Duration::from_millis(800));
        // Capped regardless of attempt number
        assert_eq!(policy.delay_for(30), Duration::from_secs(5));
    }

    #[test]
    fn first_retry_waits_the_base_delay() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 8,
        };
        // Attempt 1 connects immediately
        assert_eq!(policy.retry_delay(1), None);
        // First retry starts at the base delay, not double it
        let first = policy.retry_delay(2).unwrap();
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(125));
        // Second retry doubles
        let second = policy.retry_delay(3).unwrap();
        assert!(second >= Duration::from_millis(200));
    }

    #[test]
    fn backoff_exhaustion_threshold() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            ..BackoffPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }

    #[test]
    fn connect_url_carries_subscription_list() {
        let a = pid();
        let b = pid();
        let config = RealtimeConfig {
            url: "ws://localhost:8080/realtime/votes".into(),
            problem_ids: vec![a, b],
            backoff: BackoffPolicy::default(),
        };
        let url = config.connect_url();
        assert!(url.starts_with("ws://localhost:8080/realtime/votes?problemIds="));
        assert!(url.contains(&a.to_string()));
        assert!(url.contains(&b.to_string()));
    }

    #[test]
    fn vote_update_and_snapshot_reach_the_sink() {
        let sink = RecordingSink {
            updates: DashMap::new(),
        };
        let problem = pid();

        assert!(handle_server_message(
            &sink,
            &ServerMessage::InitialVoteCount {
                problem_id: problem,
                vote_count: 5,
                timestamp: "2025-01-15T10:30:00Z".into(),
            }
        ));
        assert_eq!(*sink.updates.get(&problem).unwrap(), 5);

        assert!(handle_server_message(
            &sink,
            &ServerMessage::VoteUpdate {
                problem_id: problem,
                new_vote_count: 6,
                timestamp: "2025-01-15T10:30:01Z".into(),
            }
        ));
        assert_eq!(*sink.updates.get(&problem).unwrap(), 6);
    }

    #[test]
    fn heartbeats_do_not_touch_the_sink() {
        let sink = RecordingSink {
            updates: DashMap::new(),
        };
        assert!(!handle_server_message(
            &sink,
            &ServerMessage::Ping {
                timestamp: "2025-01-15T10:30:00Z".into()
            }
        ));
        assert!(sink.updates.is_empty());
    }
}
