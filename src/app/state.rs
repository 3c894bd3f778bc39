//! Application state shared across routes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::game::{MapLayout, MatchRegistry};
use crate::util::rate_limit::{create_limiter, Limiter, CREATE_MATCH_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub match_registry: MatchRegistry,
    pub create_match_limiter: Arc<Limiter>,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: Config, map: MapLayout) -> Self {
        let config = Arc::new(config);
        let match_registry = MatchRegistry::new(config.rules.clone(), Arc::new(map));

        Self {
            config,
            match_registry,
            create_match_limiter: create_limiter(CREATE_MATCH_RATE_LIMIT),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open WebSocket connections
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Count a socket for as long as the guard lives
    pub fn track_connection(&self) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard(self.connections.clone())
    }
}

pub struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchRules;

    #[test]
    fn connection_guard_counts_open_sockets() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            log_json: false,
            client_origin: "*".to_string(),
            map_path: None,
            rules: MatchRules::default(),
        };
        let state = AppState::new(config, MapLayout::default());

        let first = state.track_connection();
        let second = state.track_connection();
        assert_eq!(state.connections(), 2);
        drop(first);
        assert_eq!(state.connections(), 1);
        drop(second);
        assert_eq!(state.connections(), 0);
    }
}
