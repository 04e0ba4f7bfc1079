//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → matcher.rs (inside the context path? → raw target)
//!     → router.rs (WebSocket handshakes: routing key → endpoint)
//! ```
//!
//! # Design Decisions
//! - HTTP route resolution belongs to the pluggable pipeline, not here
//! - Deterministic: same path always yields the same target and endpoint

pub mod matcher;
pub mod router;

pub use matcher::{ContextPath, InvalidContextPath};
pub use router::WsRouter;
