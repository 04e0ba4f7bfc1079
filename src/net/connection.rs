//! Connection identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live connections so shutdown can drain them
//! - Publish the live count as a gauge
//! - Keep a connection's slot alive for as long as any socket derived from it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::listener::ConnectionPermit;
use crate::observability::metrics;

/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks live connections for graceful shutdown.
///
/// The count lives in a watch channel so waiters wake on every change
/// instead of polling.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    count: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { count: Arc::new(tx) }
    }

    /// Record a new live connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.count.send_modify(|n| *n += 1);
        metrics::set_active_connections(self.active_count());
        ConnectionGuard {
            count: Arc::clone(&self.count),
            id: ConnectionId::new(),
        }
    }

    /// Current live connection count.
    pub fn active_count(&self) -> u64 {
        *self.count.borrow()
    }

    /// Resolve once no connection is live.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    count: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
        metrics::set_active_connections(*self.count.borrow());
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// What a live connection holds while it is open: its slot under
/// `max_connections`, its entry in the tracker and the shutdown signal.
///
/// Clones share one lease. The slot and the tracker entry are released when
/// the last clone drops, so a socket upgraded out of an HTTP connection keeps
/// them after the HTTP side has finished.
#[derive(Debug, Clone)]
pub struct ConnectionLease {
    inner: Arc<LeaseInner>,
}

#[derive(Debug)]
struct LeaseInner {
    guard: ConnectionGuard,
    shutdown: Shutdown,
    _permit: ConnectionPermit,
}

impl ConnectionLease {
    pub fn new(permit: ConnectionPermit, guard: ConnectionGuard, shutdown: Shutdown) -> Self {
        Self {
            inner: Arc::new(LeaseInner {
                guard,
                shutdown,
                _permit: permit,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.guard.id()
    }

    /// Signal that resolves once the listener is shutting down.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.inner.shutdown.subscribe()
    }
}
