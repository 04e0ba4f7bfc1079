//! Listener bootstrap.
//!
//! # Responsibilities
//! - Compose the dispatch chain (user stages, classifier, adapters, fallback)
//! - Bind the requested port or reuse acceptors supplied by the caller
//! - Run one accept loop per acceptor and one task per connection
//! - Report the bound port and stop gracefully on request

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ListenerConfig;
use crate::http::chain::{HandlerChain, Stage};
use crate::http::exchange::Exchange;
use crate::http::pipeline::{HttpAdapter, HttpPipeline};
use crate::http::request::Classifier;
use crate::http::response::Fallback;
use crate::http::websocket::{WsAdapter, WsRegistry};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{ConnectionLease, ConnectionTracker, Listener, ListenerError};
use crate::routing::{ContextPath, InvalidContextPath};

/// Pause after a failed accept so descriptor exhaustion does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The requested port is in use or otherwise unavailable.
    #[error("failed to bind {addr}: {source}")]
    PortBinding {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InvalidContextPath(#[from] InvalidContextPath),

    #[error("invalid listener host '{0}'")]
    InvalidHost(String),

    /// A caller-supplied acceptor could not report its address.
    #[error("unusable acceptor: {0}")]
    Acceptor(#[source] std::io::Error),
}

impl From<ListenerError> for ServerError {
    fn from(error: ListenerError) -> Self {
        match error {
            ListenerError::Bind { addr, source } => ServerError::PortBinding { addr, source },
            ListenerError::Accept(source) => ServerError::Acceptor(source),
            ListenerError::Closed => ServerError::Acceptor(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "listener closed",
            )),
        }
    }
}

/// A server before it starts: where to listen and which user stages run first.
pub struct Server {
    host: IpAddr,
    max_connections: usize,
    drain_timeout: Duration,
    acceptors: Vec<TcpListener>,
    stages: Vec<Arc<dyn Stage>>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_connections: 10_000,
            drain_timeout: Duration::from_secs(10),
            acceptors: Vec::new(),
            stages: Vec::new(),
        }
    }
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take host, connection limit and drain timeout from configuration.
    pub fn from_config(config: &ListenerConfig) -> Result<Self, ServerError> {
        let host = config
            .host
            .parse()
            .map_err(|_| ServerError::InvalidHost(config.host.clone()))?;
        Ok(Self::new()
            .host(host)
            .max_connections(config.max_connections)
            .drain_timeout(Duration::from_secs(config.drain_timeout_secs)))
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Serve on an already-bound socket. When any acceptor is supplied the
    /// port passed to [`initialize`] is not bound.
    pub fn acceptor(mut self, listener: TcpListener) -> Self {
        self.acceptors.push(listener);
        self
    }

    /// Add a stage that sees every request before the built-in stages.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }
}

/// Start serving and return once every acceptor is live.
///
/// The chain runs user stages first, then the classifier, the HTTP adapter,
/// the WebSocket adapter, and finally the below-context-path fallback.
pub async fn initialize(
    server: Server,
    port: u16,
    context_path: &str,
    pipeline: Arc<dyn HttpPipeline>,
    ws_registry: Arc<dyn WsRegistry>,
) -> Result<BoundListener, ServerError> {
    let context_path = ContextPath::new(context_path)?;
    let Server {
        host,
        max_connections,
        drain_timeout,
        acceptors,
        stages,
    } = server;

    let chain = HandlerChain::builder()
        .stages(stages)
        .stage(Classifier)
        .stage(HttpAdapter::new(pipeline, context_path.clone()))
        .stage(WsAdapter::new(ws_registry, context_path.clone()))
        .build(Fallback::new(context_path.clone()));
    tracing::debug!(stages = ?chain.stage_names(), "Dispatch chain built");

    let listeners = if acceptors.is_empty() {
        vec![Listener::bind(SocketAddr::new(host, port), max_connections).await?]
    } else {
        tracing::debug!(count = acceptors.len(), "Reusing supplied acceptors");
        acceptors
            .into_iter()
            .map(|acceptor| Listener::from_tcp(acceptor, max_connections))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ServerError::Acceptor)?
    };

    let local_addrs: Vec<SocketAddr> = listeners.iter().map(Listener::local_addr).collect();
    let bound_port = local_addrs.first().map_or(port, SocketAddr::port);

    let router = build_router(chain);
    let shutdown = Shutdown::new();
    let tracker = ConnectionTracker::new();

    let accept_loops = listeners
        .into_iter()
        .map(|listener| {
            let stop = shutdown.subscribe();
            tokio::spawn(accept_loop(
                listener,
                router.clone(),
                tracker.clone(),
                shutdown.clone(),
                stop,
            ))
        })
        .collect();

    let bound = BoundListener {
        port: bound_port,
        local_addrs,
        context_path,
        shutdown,
        tracker,
        accept_loops,
        drain_timeout,
    };

    tracing::info!(
        context_path = %bound.context_path,
        "Listening on: {}",
        bound.urls().join(", ")
    );

    Ok(bound)
}

/// Wrap the chain as the service every connection runs.
fn build_router(chain: HandlerChain) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(chain)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(chain): State<HandlerChain>, request: Request) -> Response {
    chain.dispatch(Exchange::new(request)).await
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
    mut stop: ShutdownSignal,
) {
    let local_addr = listener.local_addr();
    loop {
        tokio::select! {
            biased;
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr, permit)) => {
                    let lease = ConnectionLease::new(permit, tracker.track(), shutdown.clone());
                    let span = tracing::debug_span!(
                        "connection",
                        id = %lease.id(),
                        peer = %peer_addr
                    );
                    tokio::spawn(
                        serve_connection(stream, peer_addr, router.clone(), lease)
                            .instrument(span),
                    );
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(address = %local_addr, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
    tracing::debug!(address = %local_addr, "Accept loop stopped");
}

/// Serve one connection until the peer leaves or shutdown drains it.
///
/// Every request carries a clone of the lease, so a socket upgraded out of
/// this connection keeps its slot after the HTTP side returns.
async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: Router,
    lease: ConnectionLease,
) {
    let mut stop = lease.shutdown_signal();
    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer_addr));
        request.extensions_mut().insert(lease.clone());
        router.clone().oneshot(request)
    });

    let builder = ConnectionBuilder::new(TokioExecutor::new());
    let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Connection closed with error");
                }
                break;
            }
            _ = stop.recv(), if !draining => {
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// A live listener. Dropping it leaves the listener running; call
/// [`BoundListener::shutdown`] to stop it.
#[derive(Debug)]
pub struct BoundListener {
    port: u16,
    local_addrs: Vec<SocketAddr>,
    context_path: ContextPath,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_loops: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl BoundListener {
    /// The port actually bound (resolved when `0` was requested).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn context_path(&self) -> &ContextPath {
        &self.context_path
    }

    /// Externally reachable base URLs, one per acceptor.
    pub fn urls(&self) -> Vec<String> {
        self.local_addrs
            .iter()
            .map(|addr| format!("http://localhost:{}", addr.port()))
            .collect()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Stop accepting, ask open connections to finish, and wait for them
    /// up to the drain timeout. Upgraded WebSocket connections are closed.
    pub async fn shutdown(self) {
        self.shutdown.trigger();

        for handle in self.accept_loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Accept loop terminated abnormally");
            }
        }

        if tokio::time::timeout(self.drain_timeout, self.tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }

        tracing::info!(port = self.port, "Listener stopped");
    }
}
