//! Vote reconciler
//!
//! Owns one `ProblemVoteState` per problem and coordinates the async edges:
//! toggles with a bounded resolution window, status fetches with a timeout
//! fallback to the last-known value, and realtime push merging.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::realtime::PushSink;
use super::state::{ProblemVoteState, VotePhase, VoteView};
use crate::types::{AgoraError, ProblemId, Result};

/// Server operations the reconciler needs; seam for tests and transports
#[async_trait]
pub trait VoteApi: Send + Sync {
    /// `GET /problems/{id}/vote`
    async fn fetch_status(&self, problem: ProblemId) -> Result<VoteView>;
    /// `POST /problems/{id}/vote`
    async fn toggle(&self, problem: ProblemId) -> Result<VoteView>;
}

/// Timeouts for the reconciler's async edges
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Window for the initial status fetch before falling back to the
    /// last-known/default value
    pub status_timeout: Duration,
    /// Window for a toggle to resolve before a forced rollback; keeps
    /// `OptimisticPending` from being stuck indefinitely
    pub toggle_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            status_timeout: Duration::from_secs(5),
            toggle_timeout: Duration::from_secs(10),
        }
    }
}

/// Coordinates per-problem vote state against a `VoteApi`
pub struct VoteReconciler<A: VoteApi> {
    api: A,
    config: ReconcilerConfig,
    states: DashMap<ProblemId, ProblemVoteState>,
}

impl<A: VoteApi> VoteReconciler<A> {
    pub fn new(api: A, config: ReconcilerConfig) -> Self {
        Self {
            api,
            config,
            states: DashMap::new(),
        }
    }

    /// Current view for a problem, by source priority
    pub fn view(&self, problem: ProblemId) -> Option<VoteView> {
        self.states.get(&problem).and_then(|s| s.view())
    }

    /// Current reconciliation phase for a problem
    pub fn phase(&self, problem: ProblemId) -> VotePhase {
        self.states
            .get(&problem)
            .map(|s| s.phase())
            .unwrap_or(VotePhase::Unknown)
    }

    /// Fetch the authoritative status with a bounded timeout.
    ///
    /// On timeout or failure the last-known value stays in place and the
    /// error is returned for the caller to surface (or ignore).
    pub async fn load_status(&self, problem: ProblemId) -> Result<VoteView> {
        match timeout(self.config.status_timeout, self.api.fetch_status(problem)).await {
            Ok(Ok(view)) => {
                self.states.entry(problem).or_default().load(view);
                Ok(view)
            }
            Ok(Err(e)) => {
                debug!(problem = %problem, error = %e, "Status fetch failed, keeping last-known value");
                Err(e)
            }
            Err(_) => {
                debug!(problem = %problem, "Status fetch timed out, keeping last-known value");
                Err(AgoraError::Timeout(
                    self.config.status_timeout.as_millis() as u64
                ))
            }
        }
    }

    /// Toggle the user's vote on a problem.
    ///
    /// Flips local state immediately and reconciles with the server
    /// response. A toggle already in flight for the same problem makes this
    /// call a no-op returning the current (optimistic) view — rapid
    /// double-clicks never issue two requests. On rejection or timeout the
    /// pre-toggle value is restored and the error returned.
    pub async fn toggle(&self, problem: ProblemId) -> Result<VoteView> {
        // Lock scope: predict under the entry lock, never across an await
        let predicted = {
            let mut state = self.states.entry(problem).or_default();
            match state.begin_toggle() {
                Some(view) => view,
                None => {
                    debug!(problem = %problem, "Toggle ignored, one already in flight");
                    // Pending state always carries an optimistic view
                    return Ok(state.view().unwrap_or(VoteView {
                        has_voted: false,
                        vote_count: 0,
                    }));
                }
            }
        };
        debug!(problem = %problem, predicted = ?predicted, "Optimistic toggle");

        match timeout(self.config.toggle_timeout, self.api.toggle(problem)).await {
            Ok(Ok(view)) => {
                self.states.entry(problem).or_default().resolve_toggle(view);
                Ok(view)
            }
            Ok(Err(e)) => {
                warn!(problem = %problem, error = %e, "Toggle rejected, rolling back");
                self.states.entry(problem).or_default().fail_toggle();
                Err(e)
            }
            Err(_) => {
                warn!(problem = %problem, "Toggle timed out, forcing rollback");
                self.states.entry(problem).or_default().fail_toggle();
                Err(AgoraError::Timeout(
                    self.config.toggle_timeout.as_millis() as u64
                ))
            }
        }
    }
}

impl<A: VoteApi> PushSink for VoteReconciler<A> {
    /// Merge a realtime-pushed count. Lower priority than an in-flight
    /// optimistic prediction, higher than the last loaded value.
    fn apply_update(&self, problem: ProblemId, vote_count: u32) {
        self.states
            .entry(problem)
            .or_default()
            .apply_push(vote_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Scriptable fake server
    struct FakeApi {
        toggle_calls: AtomicUsize,
        responses: Mutex<Vec<Result<VoteView>>>,
        delay: Duration,
    }

    impl FakeApi {
        fn with_responses(responses: Vec<Result<VoteView>>) -> Self {
            Self {
                toggle_calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl VoteApi for FakeApi {
        async fn fetch_status(&self, _problem: ProblemId) -> Result<VoteView> {
            tokio::time::sleep(self.delay).await;
            Ok(VoteView {
                has_voted: false,
                vote_count: 5,
            })
        }

        async fn toggle(&self, _problem: ProblemId) -> Result<VoteView> {
            self.toggle_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn pid() -> ProblemId {
        ProblemId(Uuid::new_v4())
    }

    fn view(has_voted: bool, vote_count: u32) -> VoteView {
        VoteView {
            has_voted,
            vote_count,
        }
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_original_pair() {
        let api = FakeApi::with_responses(vec![Ok(view(true, 6)), Ok(view(false, 5))]);
        let reconciler = VoteReconciler::new(api, ReconcilerConfig::default());
        let problem = pid();
        reconciler.load_status(problem).await.unwrap();

        let first = reconciler.toggle(problem).await.unwrap();
        assert_eq!(first, view(true, 6));
        let second = reconciler.toggle(problem).await.unwrap();
        assert_eq!(second, view(false, 5));
        assert_eq!(reconciler.view(problem), Some(view(false, 5)));
    }

    #[tokio::test]
    async fn rejection_rolls_back_within_one_cycle() {
        let api = FakeApi::with_responses(vec![Err(AgoraError::SelfVote(pid()))]);
        let reconciler = VoteReconciler::new(api, ReconcilerConfig::default());
        let problem = pid();
        reconciler.load_status(problem).await.unwrap();

        let err = reconciler.toggle(problem).await.unwrap_err();
        assert!(matches!(err, AgoraError::SelfVote(_)));
        // Displayed state equals the pre-toggle values
        assert_eq!(reconciler.view(problem), Some(view(false, 5)));
        assert_eq!(reconciler.phase(problem), VotePhase::Loaded);
    }

    #[tokio::test]
    async fn in_flight_toggle_swallows_double_click() {
        let mut api = FakeApi::with_responses(vec![Ok(view(true, 6))]);
        api.delay = Duration::from_millis(50);
        let reconciler = Arc::new(VoteReconciler::new(api, ReconcilerConfig::default()));
        let problem = pid();
        reconciler.load_status(problem).await.unwrap();

        let first = {
            let r = Arc::clone(&reconciler);
            tokio::spawn(async move { r.toggle(problem).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Second click while the first is in flight: ignored, no new request
        let second = reconciler.toggle(problem).await.unwrap();
        assert_eq!(second, view(true, 6)); // the optimistic prediction

        first.await.unwrap().unwrap();
        assert_eq!(
            reconciler
                .api
                .toggle_calls
                .load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn toggle_timeout_forces_rollback() {
        let mut api = FakeApi::with_responses(vec![Ok(view(true, 6))]);
        api.delay = Duration::from_secs(60);
        let reconciler = VoteReconciler::new(
            api,
            ReconcilerConfig {
                status_timeout: Duration::from_secs(5),
                toggle_timeout: Duration::from_millis(20),
            },
        );
        let problem = pid();

        let err = reconciler.toggle(problem).await.unwrap_err();
        assert!(matches!(err, AgoraError::Timeout(_)));
        // OptimisticPending is never stuck
        assert_ne!(reconciler.phase(problem), VotePhase::OptimisticPending);
    }

    #[tokio::test]
    async fn status_timeout_keeps_last_known_value() {
        let mut api = FakeApi::with_responses(vec![]);
        api.delay = Duration::from_secs(60);
        let reconciler = VoteReconciler::new(
            api,
            ReconcilerConfig {
                status_timeout: Duration::from_millis(20),
                toggle_timeout: Duration::from_secs(5),
            },
        );
        let problem = pid();

        reconciler.apply_update(problem, 4); // last-known via push
        let err = reconciler.load_status(problem).await.unwrap_err();
        assert!(matches!(err, AgoraError::Timeout(_)));
        assert_eq!(reconciler.view(problem).unwrap().vote_count, 4);
    }

    #[tokio::test]
    async fn push_updates_flow_through_view() {
        let api = FakeApi::with_responses(vec![]);
        let reconciler = VoteReconciler::new(api, ReconcilerConfig::default());
        let problem = pid();
        reconciler.load_status(problem).await.unwrap();

        reconciler.apply_update(problem, 11);
        assert_eq!(reconciler.view(problem).unwrap().vote_count, 11);
    }
}
