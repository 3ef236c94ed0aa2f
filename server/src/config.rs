//! Runtime configuration for the game server

use shared::{RESOLUTION_DELAY, VALUE_UNIVERSE};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub bind_addr: String,
    /// Maximum number of concurrent connections
    pub max_clients: usize,
    /// Silence after which a client counts as disconnected
    pub client_timeout: Duration,
    /// Pause between a second flip and its resolution
    pub resolution_delay: Duration,
    /// Card values are drawn from `1..=value_universe`
    pub value_universe: u8,
    /// Fixed seed for reproducible boards
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_clients: 32,
            client_timeout: Duration::from_secs(5),
            resolution_delay: RESOLUTION_DELAY,
            value_universe: VALUE_UNIVERSE,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn with_resolution_delay(mut self, delay: Duration) -> Self {
        self.resolution_delay = delay;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
