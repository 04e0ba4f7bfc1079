//! Per-request exchange flowing through the dispatch chain.
//!
//! An exchange is claimed by value. `Exchange::claim` and `Claim::respond`
//! consume their receiver, so a request can be answered at most once, and the
//! chain's terminal stage returns `Claimed` directly, so it is answered at
//! least once.
//!
//! ```text
//! Received → Classified → InHttpPipeline      → Handled
//!                       → InWebSocketPipeline → Handled
//!                       → (unclaimed)         → FallbackHandled
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use crate::http::request::Protocol;

/// Where an exchange is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Received,
    Classified(Protocol),
    InHttpPipeline,
    InWebSocketPipeline,
    Handled,
    FallbackHandled,
}

impl ExchangeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Handled | ExchangeState::FallbackHandled)
    }
}

/// A request that no stage has claimed yet.
#[derive(Debug)]
pub struct Exchange {
    request: Request<Body>,
    meta: ExchangeMeta,
}

#[derive(Debug, Clone, Copy)]
struct ExchangeMeta {
    state: ExchangeState,
    protocol: Option<Protocol>,
    peer_addr: Option<SocketAddr>,
    received_at: Instant,
}

impl Exchange {
    /// Start an exchange. The peer address is read from `ConnectInfo` when present.
    pub fn new(request: Request<Body>) -> Self {
        let peer_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        Self {
            request,
            meta: ExchangeMeta {
                state: ExchangeState::Received,
                protocol: None,
                peer_addr,
                received_at: Instant::now(),
            },
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn state(&self) -> ExchangeState {
        self.meta.state
    }

    /// Protocol assigned by the classifier, if it has run.
    pub fn protocol(&self) -> Option<Protocol> {
        self.meta.protocol
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.meta.peer_addr
    }

    pub(crate) fn classify(&mut self, protocol: Protocol) {
        self.meta.protocol = Some(protocol);
        self.meta.state = ExchangeState::Classified(protocol);
    }

    pub(crate) fn enter(&mut self, state: ExchangeState) {
        debug_assert!(!state.is_terminal());
        self.meta.state = state;
    }

    /// Leave the exchange for the next stage.
    pub fn next(self) -> Flow {
        Flow::Next(self)
    }

    /// Answer the exchange, ending its traversal of the chain.
    pub fn claim(self, response: impl IntoResponse) -> Flow {
        Flow::Claimed(Claimed::new(self.meta, response.into_response(), ExchangeState::Handled))
    }

    /// Take the request out, keeping the right to answer it as a `Claim`.
    ///
    /// Used by stages that must hand the request itself to a collaborator.
    pub fn into_parts(self) -> (Request<Body>, Claim) {
        (self.request, Claim { meta: self.meta })
    }

    pub(crate) fn claim_as_fallback(self, response: impl IntoResponse) -> Claimed {
        Claimed::new(
            self.meta,
            response.into_response(),
            ExchangeState::FallbackHandled,
        )
    }
}

/// The single-use right to answer an exchange whose request was taken.
#[derive(Debug)]
#[must_use = "an exchange must be answered"]
pub struct Claim {
    meta: ExchangeMeta,
}

impl Claim {
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.meta.peer_addr
    }

    pub fn respond(self, response: impl IntoResponse) -> Flow {
        Flow::Claimed(Claimed::new(self.meta, response.into_response(), ExchangeState::Handled))
    }
}

/// A terminal exchange: the response plus how it got there.
#[derive(Debug)]
pub struct Claimed {
    response: Response,
    state: ExchangeState,
    elapsed: Duration,
}

impl Claimed {
    fn new(meta: ExchangeMeta, response: Response, state: ExchangeState) -> Self {
        Self {
            response,
            state,
            elapsed: meta.received_at.elapsed(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Time from receipt to claim.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

/// What a stage did with an exchange.
#[derive(Debug)]
#[must_use]
pub enum Flow {
    /// The stage answered; later stages do not run.
    Claimed(Claimed),
    /// The stage declined; the next stage gets the exchange.
    Next(Exchange),
}
