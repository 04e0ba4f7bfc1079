//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, one task each)
//!     → chain.rs (ordered stages, first claim wins)
//!         → [user stages]
//!         → request.rs (classifier: HTTP or WebSocket handshake)
//!         → pipeline.rs (HTTP adapter → routing engine, failure boundary)
//!         → websocket.rs (WebSocket adapter → endpoint registry)
//!         → response.rs (fallback: below context-path 404)
//!     → Send to client
//! ```

pub mod chain;
pub mod exchange;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use chain::{ChainBuilder, HandlerChain, Stage};
pub use exchange::{Claim, Claimed, Exchange, ExchangeState, Flow};
pub use pipeline::{pipeline_fn, HttpAdapter, HttpPipeline, PipelineError, RouterPipeline};
pub use request::{is_websocket_upgrade, Classifier, Protocol, RawTarget, TransportRequest};
pub use response::Fallback;
pub use server::{initialize, BoundListener, Server, ServerError};
pub use websocket::{endpoint_fn, UpgradeRequest, WsAdapter, WsConnection, WsEndpoint, WsRegistry};
