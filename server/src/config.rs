//! Server tuning knobs.
//!
//! Defaults match the protocol the client expects; the binary only overrides
//! the deployment-specific fields (address, capacity, storage location).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub bind_addr: String,
    /// Maximum number of simultaneous connections
    pub max_clients: usize,
    /// Root directory for persisted player profiles
    pub data_dir: PathBuf,
    /// Number of shard directories profiles are partitioned across
    pub shards: u32,
    pub tick_duration: Duration,
    pub heartbeat_check_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub matchmaking_interval: Duration,
    /// How long the longest-waiting player waits before facing the AI
    pub ai_fallback_after: Duration,
    pub rate_limit_window: Duration,
    /// Spawn-class commands allowed per connection inside one window
    pub rate_limit_max: usize,
    /// Largest trophy gap two humans can be paired across
    pub max_trophy_gap: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            max_clients: 64,
            data_dir: PathBuf::from("data"),
            shards: 200,
            tick_duration: Duration::from_millis(50),
            heartbeat_check_interval: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(5),
            matchmaking_interval: Duration::from_secs(1),
            ai_fallback_after: Duration::from_secs(5),
            rate_limit_window: Duration::from_secs(5),
            rate_limit_max: 50,
            max_trophy_gap: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_periods() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration, Duration::from_millis(50));
        assert!(config.heartbeat_check_interval < config.heartbeat_timeout);
        assert!(config.matchmaking_interval < config.ai_fallback_after);
        assert_eq!(config.rate_limit_max, 50);
    }
}
