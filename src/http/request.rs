//! Request classification and request-scoped transport context.
//!
//! # Responsibilities
//! - Decide HTTP vs. WebSocket handshake from the request head
//! - Carry transport-level detail into the routing engine via extensions

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri, Version};

use crate::http::chain::Stage;
use crate::http::exchange::{Exchange, Flow};

/// Header whose presence marks a WebSocket handshake.
pub const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

/// Which pipeline an exchange belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    WebSocket,
}

/// Returns true if the request head carries a WebSocket handshake key.
///
/// `HeaderMap` lookups are case-insensitive; an empty value does not count.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(SEC_WEBSOCKET_KEY)
        .is_some_and(|value| !value.as_bytes().is_empty())
}

/// Stage that tags each exchange with its protocol and always passes it on.
#[derive(Debug, Default, Clone, Copy)]
pub struct Classifier;

#[async_trait]
impl Stage for Classifier {
    fn name(&self) -> &str {
        "classifier"
    }

    async fn handle(&self, mut exchange: Exchange) -> Flow {
        let protocol = if is_websocket_upgrade(exchange.request().headers()) {
            Protocol::WebSocket
        } else {
            Protocol::Http
        };
        exchange.classify(protocol);
        exchange.next()
    }
}

/// Request path relative to the context path, as seen by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTarget(pub String);

/// Snapshot of the request head as it arrived on the wire.
///
/// The routing engine receives an owned request it may rewrite; this copy is
/// what diagnostics should report.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub peer_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn detects_handshake_key_case_insensitively() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));

        headers.insert("Sec-WebSocket-Key", HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn empty_key_is_not_an_upgrade() {
        let mut headers = HeaderMap::new();
        headers.insert(SEC_WEBSOCKET_KEY, HeaderValue::from_static(""));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn upgrade_header_alone_is_not_enough() {
        let mut headers = HeaderMap::new();
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("connection", HeaderValue::from_static("Upgrade"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[tokio::test]
    async fn classifier_tags_and_passes() {
        let request = Request::builder()
            .uri("/chat")
            .header("sec-websocket-key", "abc")
            .body(Body::empty())
            .unwrap();

        match Classifier.handle(Exchange::new(request)).await {
            Flow::Next(exchange) => assert_eq!(exchange.protocol(), Some(Protocol::WebSocket)),
            Flow::Claimed(_) => panic!("classifier must never claim"),
        }

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        match Classifier.handle(Exchange::new(request)).await {
            Flow::Next(exchange) => assert_eq!(exchange.protocol(), Some(Protocol::Http)),
            Flow::Claimed(_) => panic!("classifier must never claim"),
        }
    }
}
