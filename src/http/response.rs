//! Fixed responses issued by the dispatch layer itself, and the fallback stage.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::exchange::{Claimed, Exchange};
use crate::observability::metrics;
use crate::routing::ContextPath;

pub const WS_HANDLER_NOT_FOUND: &str = "WebSocket handler not found";

/// Body returned for requests outside the context path.
pub fn below_context_path_message(context_path: &ContextPath) -> String {
    format!("Not found. Request is below context-path (context-path: '{context_path}')")
}

/// 500 with an empty body so failure details never reach the client.
pub fn internal_error() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Handshake rejection for an upgrade with no registered handler.
pub fn ws_handler_not_found() -> Response {
    plain_text(StatusCode::NOT_FOUND, WS_HANDLER_NOT_FOUND.to_string())
}

fn plain_text(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Terminal stage: answers anything the earlier stages left unclaimed.
#[derive(Debug, Clone)]
pub struct Fallback {
    context_path: ContextPath,
}

impl Fallback {
    pub fn new(context_path: ContextPath) -> Self {
        Self { context_path }
    }

    pub fn handle(&self, exchange: Exchange) -> Claimed {
        tracing::warn!(
            context_path = %self.context_path,
            path = %exchange.request().uri().path(),
            "Received a request below context-path. Returned 404."
        );
        metrics::record_fallback();
        exchange.claim_as_fallback(plain_text(
            StatusCode::NOT_FOUND,
            below_context_path_message(&self.context_path),
        ))
    }
}
