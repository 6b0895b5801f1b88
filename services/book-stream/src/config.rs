//! Distributor configuration and flow control policy
//!
//! Each subscriber reads from a bounded broadcast queue. A subscriber that
//! falls more than `channel_capacity` frames behind is handled by its
//! `LagPolicy`; the replay loop itself never waits on a subscriber.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distributor::StreamError;

/// What to do with a subscriber that overflowed its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagPolicy {
    /// Disconnect the lagging subscriber.
    #[default]
    Disconnect,
    /// Skip the oldest frames, count them, keep the connection.
    DropOldest,
}

impl FromStr for LagPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disconnect" => Ok(LagPolicy::Disconnect),
            "drop_oldest" => Ok(LagPolicy::DropOldest),
            other => Err(format!("unknown lag policy: {}", other)),
        }
    }
}

/// Streaming distributor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Listening endpoint for subscribers.
    pub bind_addr: SocketAddr,
    /// Events per second; 0 disables rate limiting.
    pub target_rate: u64,
    /// Events per rate-limited batch.
    pub batch_size: usize,
    /// Per-subscriber queue capacity in frames.
    pub channel_capacity: usize,
    /// Upper bound on a single subscriber write.
    pub write_timeout: Duration,
    pub lag_policy: LagPolicy,
    /// Text of the welcome frame.
    pub welcome_message: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9999)),
            target_rate: 100_000,
            batch_size: 100,
            channel_capacity: 10_000,
            write_timeout: Duration::from_secs(5),
            lag_policy: LagPolicy::Disconnect,
            welcome_message: "MBO Stream Server".to_string(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.batch_size == 0 {
            return Err(StreamError::Config("batch_size must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(StreamError::Config("channel_capacity must be positive".into()));
        }
        if self.write_timeout.is_zero() {
            return Err(StreamError::Config("write_timeout must be positive".into()));
        }
        Ok(())
    }

    /// Offset from replay start at which `events_done` events are due, or
    /// None when unlimited. Pacing against this cumulative schedule lets a
    /// late batch be made up by the next one.
    pub fn pace_offset(&self, events_done: usize) -> Option<Duration> {
        if self.target_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(events_done as f64 / self.target_rate as f64))
    }
}
