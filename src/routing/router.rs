//! WebSocket endpoint registry.
//!
//! # Design Decisions
//! - Keyed by routing key: the request path relative to the context path
//! - Exact match only; a trailing slash is ignored
//! - Concurrent lookups never block each other (sharded map)
//! - Registration is allowed while serving; entries are shared by `Arc`

use std::sync::Arc;

use dashmap::DashMap;

use crate::http::websocket::{UpgradeRequest, WsEndpoint, WsRegistry};

/// Registry mapping routing keys to long-lived endpoints.
#[derive(Default)]
pub struct WsRouter {
    entries: DashMap<String, Arc<dyn WsEndpoint>>,
}

impl WsRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` under `path`, replacing any previous entry.
    pub fn add(&self, path: &str, endpoint: impl WsEndpoint) -> &Self {
        self.add_shared(path, Arc::new(endpoint))
    }

    /// Register an endpoint that is already shared, e.g. under several paths.
    pub fn add_shared(&self, path: &str, endpoint: Arc<dyn WsEndpoint>) -> &Self {
        let key = normalize(path);
        tracing::debug!(routing_key = %key, "WebSocket endpoint registered");
        self.entries.insert(key, endpoint);
        self
    }

    /// Remove the endpoint under `path`. Open connections keep their handle.
    pub fn remove(&self, path: &str) -> Option<Arc<dyn WsEndpoint>> {
        self.entries.remove(&normalize(path)).map(|(_, endpoint)| endpoint)
    }

    /// Look up by routing key directly.
    pub fn get(&self, routing_key: &str) -> Option<Arc<dyn WsEndpoint>> {
        self.entries
            .get(&normalize(routing_key))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WsRegistry for WsRouter {
    fn find_entry(&self, request: &UpgradeRequest<'_>) -> Option<Arc<dyn WsEndpoint>> {
        self.get(request.routing_key())
    }
}

impl std::fmt::Debug for WsRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        f.debug_struct("WsRouter").field("routing_keys", &keys).finish()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
