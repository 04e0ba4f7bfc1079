//! Single-port HTTP + WebSocket listener with an ordered dispatch chain.
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                      switchyard                       │
//!  connection ─────▶│ net::listener ─▶ http::server ─▶ http::chain          │
//!                   │                                    │                  │
//!                   │        ┌──────────── user stages ◀─┘                  │
//!                   │        ▼                                              │
//!                   │   classifier ─▶ HTTP adapter ─▶ routing engine        │
//!                   │        │                                              │
//!                   │        └──────▶ WS adapter ─▶ endpoint registry       │
//!                   │                                                       │
//!                   │   (unclaimed) ─▶ fallback 404 below context-path      │
//!                   └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::AppConfig;
pub use http::{initialize, BoundListener, Server, ServerError};
pub use lifecycle::Shutdown;
pub use routing::{ContextPath, WsRouter};
