//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (http::server::initialize):
//!     Build chain → Bind acceptors → Spawn accept loops → Report port
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a bind error aborts startup
//! - Shutdown has a deadline: connections still open after it are dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
