//! WebSocket pipeline adapter.
//!
//! # Responsibilities
//! - Look up a long-lived endpoint for each in-scope handshake
//! - Reject unknown routing keys with 404 before any upgrade
//! - Complete the upgrade and move the socket into the endpoint
//! - Keep the connection's lease until the endpoint returns, and close the
//!   socket when the listener shuts down
//!
//! # Data Flow
//! ```text
//! Handshake ─→ registry.find_entry(routing key)
//!                 ├─ None  → 404 "WebSocket handler not found"
//!                 └─ Some  → upgrade → endpoint.on_connect(WsConnection)
//! ```
//!
//! # Design Decisions
//! - Endpoints are shared across all their connections and outlive each one
//! - The adapter keeps no reference to a connection once handed off

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::http::chain::Stage;
use crate::http::exchange::{Exchange, ExchangeState, Flow};
use crate::http::request::Protocol;
use crate::http::response;
use crate::net::ConnectionLease;
use crate::observability::metrics;
use crate::routing::ContextPath;

/// A WebSocket connection handed to an endpoint.
pub struct WsConnection {
    /// Unique per connection.
    pub id: Uuid,
    /// Path relative to the context path that selected the endpoint.
    pub routing_key: String,
    pub peer_addr: Option<SocketAddr>,
    /// Handshake request headers.
    pub headers: HeaderMap,
    pub socket: WebSocket,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("routing_key", &self.routing_key)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// Long-lived handler serving every connection routed to it.
///
/// One instance handles many concurrent connections; any state it keeps
/// must be internally synchronized.
#[async_trait]
pub trait WsEndpoint: Send + Sync + 'static {
    /// Serve one connection until it closes.
    async fn on_connect(&self, connection: WsConnection);
}

/// Endpoint backed by a closure.
#[derive(Clone)]
pub struct EndpointFn<F>(F);

/// Wrap an async closure as a [`WsEndpoint`].
pub fn endpoint_fn<F, Fut>(f: F) -> EndpointFn<F>
where
    F: Fn(WsConnection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    EndpointFn(f)
}

#[async_trait]
impl<F, Fut> WsEndpoint for EndpointFn<F>
where
    F: Fn(WsConnection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_connect(&self, connection: WsConnection) {
        (self.0)(connection).await
    }
}

/// The handshake as presented to a registry.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeRequest<'a> {
    routing_key: &'a str,
    parts: &'a Parts,
}

impl<'a> UpgradeRequest<'a> {
    pub fn new(routing_key: &'a str, parts: &'a Parts) -> Self {
        Self { routing_key, parts }
    }

    pub fn routing_key(&self) -> &'a str {
        self.routing_key
    }

    pub fn uri(&self) -> &'a Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &'a HeaderMap {
        &self.parts.headers
    }
}

/// Lookup from handshake to endpoint. Called concurrently; must not block.
pub trait WsRegistry: Send + Sync + 'static {
    fn find_entry(&self, request: &UpgradeRequest<'_>) -> Option<Arc<dyn WsEndpoint>>;
}

impl<R: WsRegistry + ?Sized> WsRegistry for Arc<R> {
    fn find_entry(&self, request: &UpgradeRequest<'_>) -> Option<Arc<dyn WsEndpoint>> {
        (**self).find_entry(request)
    }
}

/// Stage that owns every in-scope WebSocket handshake.
pub struct WsAdapter {
    registry: Arc<dyn WsRegistry>,
    context_path: ContextPath,
}

impl WsAdapter {
    pub fn new(registry: Arc<dyn WsRegistry>, context_path: ContextPath) -> Self {
        Self {
            registry,
            context_path,
        }
    }
}

#[async_trait]
impl Stage for WsAdapter {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn handle(&self, mut exchange: Exchange) -> Flow {
        if exchange.protocol() != Some(Protocol::WebSocket) {
            return exchange.next();
        }
        let Some(routing_key) = self
            .context_path
            .target(exchange.request().uri().path())
            .map(str::to_owned)
        else {
            return exchange.next();
        };

        exchange.enter(ExchangeState::InWebSocketPipeline);
        let (request, claim) = exchange.into_parts();
        let peer_addr = claim.peer_addr();
        let (mut parts, _body) = request.into_parts();

        let entry = self
            .registry
            .find_entry(&UpgradeRequest::new(&routing_key, &parts));
        metrics::record_ws_lookup(entry.is_some());

        let Some(endpoint) = entry else {
            tracing::debug!(routing_key = %routing_key, "No WebSocket handler for routing key");
            return claim.respond(response::ws_handler_not_found());
        };

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::debug!(
                    routing_key = %routing_key,
                    status = %rejection.status(),
                    reason = %rejection.body_text(),
                    "WebSocket handshake rejected"
                );
                return claim.respond(rejection.into_response());
            }
        };

        let headers = std::mem::take(&mut parts.headers);
        let lease = parts.extensions.remove::<ConnectionLease>();
        let upgraded = upgrade
            .on_failed_upgrade(|error| {
                tracing::warn!(error = %error, "WebSocket upgrade failed");
            })
            .on_upgrade(move |socket| async move {
                let connection = WsConnection {
                    id: Uuid::new_v4(),
                    routing_key,
                    peer_addr,
                    headers,
                    socket,
                };
                let ws_id = connection.id;
                tracing::debug!(
                    ws_id = %ws_id,
                    routing_key = %connection.routing_key,
                    "WebSocket connected"
                );
                serve_endpoint(endpoint, connection, lease).await;
                tracing::debug!(ws_id = %ws_id, "WebSocket finished");
            });

        claim.respond(upgraded)
    }
}

/// Run the endpoint for one connection. With a lease, the connection keeps
/// its slot until the endpoint returns and is dropped on shutdown.
async fn serve_endpoint(
    endpoint: Arc<dyn WsEndpoint>,
    connection: WsConnection,
    lease: Option<ConnectionLease>,
) {
    let Some(lease) = lease else {
        endpoint.on_connect(connection).await;
        return;
    };
    let mut stop = lease.shutdown_signal();
    tokio::select! {
        _ = endpoint.on_connect(connection) => {}
        _ = stop.recv() => {
            tracing::debug!(connection_id = %lease.id(), "Closing WebSocket for shutdown");
        }
    }
}
