//! Embedded vote client
//!
//! Presents a single coherent "current count / have I voted" value per
//! problem despite three asynchronous, possibly-conflicting sources:
//!
//! - the last authoritative value from the Vote API (initial fetch or a
//!   toggle response),
//! - the local optimistic prediction while a toggle is in flight,
//! - vote counts pushed over the realtime channel.
//!
//! Read priority when sources disagree: optimistic (while in flight) over
//! pushed over loaded. All UI surfaces read through one `VoteReconciler`
//! so list views, detail views and widgets cannot drift apart.

pub mod http;
pub mod realtime;
pub mod reconciler;
pub mod state;

pub use http::HttpVoteApi;
pub use realtime::{run_subscriber, BackoffPolicy, PushSink, RealtimeConfig};
pub use reconciler::{ReconcilerConfig, VoteApi, VoteReconciler};
pub use state::{ProblemVoteState, VotePhase, VoteView};
