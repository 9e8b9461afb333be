//! Real-time vote fan-out
//!
//! Publish/subscribe delivery of vote-count changes to connected clients.
//!
//! The broker (`VoteHub`) is transport-independent: the Vote API publishes
//! committed counts into it, and any transport can subscribe. The shipped
//! transport is a WebSocket stream at `GET /realtime/votes?problemIds=...`.
//!
//! Delivery is at-most-once — missed events are tolerable because clients can
//! always fall back to polling the authoritative endpoint. Per-problem
//! ordering follows commit order: each publish is issued by the committing
//! call and the broadcast channel preserves send order.

pub mod hub;
pub mod ws;

pub use hub::{ServerMessage, VoteEvent, VoteHub, DEFAULT_CHANNEL_CAPACITY};
pub use ws::handle_realtime_ws;
