//! Agora - community voting core
//!
//! Keeps one durable vote ledger, one trusted mutation path, and fans every
//! committed change out to connected clients so displayed counts converge on
//! the authoritative value.
//!
//! ## Components
//!
//! - **Ledger**: in-memory vote rows with a denormalized per-problem counter,
//!   mutated atomically so the two can never drift
//! - **Vote API**: the single toggle endpoint plus problem lifecycle routes
//! - **Realtime**: WebSocket fan-out of committed vote-count changes
//! - **Client**: embeddable reconciler merging loaded, optimistic and pushed
//!   state into one coherent view per problem

pub mod auth;
pub mod client;
pub mod config;
pub mod ledger;
pub mod realtime;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AgoraError, ProblemId, Result, UserId};
