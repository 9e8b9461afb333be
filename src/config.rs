//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Agora - real-time voting gateway for the community platform
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "Real-time voting gateway for the Agora community platform")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (accepts X-Dev-User header instead of JWT)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for token validation (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum concurrent realtime subscriber connections
    #[arg(long, env = "REALTIME_MAX_CLIENTS", default_value = "4096")]
    pub realtime_max_clients: usize,

    /// Interval between realtime heartbeat pings, in seconds
    #[arg(long, env = "REALTIME_PING_SECS", default_value = "30")]
    pub realtime_ping_secs: u64,

    /// Capacity of the vote-update broadcast channel
    #[arg(long, env = "REALTIME_CHANNEL_CAPACITY", default_value = "256")]
    pub realtime_channel_capacity: usize,

    /// Maximum problem ids a single realtime connection may subscribe to
    #[arg(long, env = "REALTIME_MAX_SUBSCRIPTIONS", default_value = "200")]
    pub realtime_max_subscriptions: usize,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> String {
        if self.dev_mode {
            self.jwt_secret
                .clone()
                .unwrap_or_else(|| "dev-only-insecure-secret".to_string())
        } else {
            self.jwt_secret
                .clone()
                .expect("JWT_SECRET is required in production mode")
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.realtime_ping_secs == 0 {
            return Err("REALTIME_PING_SECS must be greater than zero".to_string());
        }

        if self.realtime_channel_capacity == 0 {
            return Err("REALTIME_CHANNEL_CAPACITY must be greater than zero".to_string());
        }

        Ok(())
    }
}
