//! HTTP pipeline adapter.
//!
//! # Responsibilities
//! - Hand in-scope, non-upgrade requests to the routing engine
//! - Attach `RawTarget` and `TransportRequest` to the request
//! - Contain engine failures (errors and panics) as an empty 500
//! - Claim every exchange it accepts, whatever the outcome

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::FutureExt;
use tower::ServiceExt;

use crate::http::chain::Stage;
use crate::http::exchange::{Exchange, ExchangeState, Flow};
use crate::http::request::{Protocol, RawTarget, TransportRequest};
use crate::http::response;
use crate::observability::metrics;
use crate::routing::ContextPath;

/// Failure raised by a routing engine.
pub type PipelineError = Box<dyn std::error::Error + Send + Sync>;

/// The routing engine behind the HTTP adapter.
///
/// Either answers the request or fails; failures never reach the client
/// beyond a bare 500.
#[async_trait]
pub trait HttpPipeline: Send + Sync + 'static {
    async fn service(&self, request: Request<Body>) -> Result<Response, PipelineError>;
}

#[async_trait]
impl<P: HttpPipeline + ?Sized> HttpPipeline for Arc<P> {
    async fn service(&self, request: Request<Body>) -> Result<Response, PipelineError> {
        (**self).service(request).await
    }
}

/// Pipeline backed by a closure.
#[derive(Clone)]
pub struct PipelineFn<F>(F);

/// Wrap an async closure as an [`HttpPipeline`].
pub fn pipeline_fn<F, Fut>(f: F) -> PipelineFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, PipelineError>> + Send + 'static,
{
    PipelineFn(f)
}

#[async_trait]
impl<F, Fut> HttpPipeline for PipelineFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, PipelineError>> + Send + 'static,
{
    async fn service(&self, request: Request<Body>) -> Result<Response, PipelineError> {
        (self.0)(request).await
    }
}

/// An `axum::Router` used as the routing engine.
///
/// Routes are matched against the full request path, so a router serving a
/// non-root context path is usually built with `Router::nest`.
#[derive(Clone)]
pub struct RouterPipeline {
    router: axum::Router,
}

impl RouterPipeline {
    pub fn new(router: axum::Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl HttpPipeline for RouterPipeline {
    async fn service(&self, request: Request<Body>) -> Result<Response, PipelineError> {
        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }
}

/// Stage that owns every in-scope HTTP exchange.
pub struct HttpAdapter {
    pipeline: Arc<dyn HttpPipeline>,
    context_path: ContextPath,
}

impl HttpAdapter {
    pub fn new(pipeline: Arc<dyn HttpPipeline>, context_path: ContextPath) -> Self {
        Self {
            pipeline,
            context_path,
        }
    }
}

#[async_trait]
impl Stage for HttpAdapter {
    fn name(&self) -> &str {
        "http"
    }

    async fn handle(&self, mut exchange: Exchange) -> Flow {
        // Handshakes stay untouched for the WebSocket adapter.
        if exchange.protocol() != Some(Protocol::Http) {
            return exchange.next();
        }
        let Some(target) = self
            .context_path
            .target(exchange.request().uri().path())
            .map(str::to_owned)
        else {
            return exchange.next();
        };

        exchange.enter(ExchangeState::InHttpPipeline);
        let peer_addr = exchange.peer_addr();
        let (mut request, claim) = exchange.into_parts();

        let transport = TransportRequest {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            peer_addr,
        };
        request.extensions_mut().insert(RawTarget(target));
        request.extensions_mut().insert(transport);

        let method = request.method().clone();
        let uri = request.uri().clone();

        let outcome = AssertUnwindSafe(self.pipeline.service(request))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                tracing::error!(
                    method = %method,
                    uri = %uri,
                    error = %error,
                    "Exception occurred while servicing http-request"
                );
                metrics::record_pipeline_failure("error");
                response::internal_error()
            }
            Err(panic) => {
                tracing::error!(
                    method = %method,
                    uri = %uri,
                    panic = panic_message(panic.as_ref()),
                    "Panic occurred while servicing http-request"
                );
                metrics::record_pipeline_failure("panic");
                response::internal_error()
            }
        };

        claim.respond(response)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::exchange::Claimed;
    use crate::http::request::Classifier;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn classified(request: Request<Body>) -> Exchange {
        match Classifier.handle(Exchange::new(request)).await {
            Flow::Next(exchange) => exchange,
            Flow::Claimed(_) => unreachable!(),
        }
    }

    fn get_request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn expect_claimed(flow: Flow) -> Claimed {
        match flow {
            Flow::Claimed(claimed) => claimed,
            Flow::Next(_) => panic!("expected the adapter to claim"),
        }
    }

    fn adapter<P: HttpPipeline>(pipeline: P, context_path: &str) -> HttpAdapter {
        HttpAdapter::new(Arc::new(pipeline), ContextPath::new(context_path).unwrap())
    }

    #[tokio::test]
    async fn success_is_claimed_as_handled() {
        let adapter = adapter(
            pipeline_fn(|_req| async { Ok(Response::new(Body::from("hello"))) }),
            "/",
        );
        let claimed = expect_claimed(adapter.handle(classified(get_request("/hi")).await).await);
        assert_eq!(claimed.state(), ExchangeState::Handled);

        let response = claimed.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(to_bytes(response.into_body(), usize::MAX).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn error_becomes_empty_500() {
        let adapter = adapter(
            pipeline_fn(|_req| async { Err::<Response, PipelineError>("database on fire".into()) }),
            "/",
        );
        let claimed = expect_claimed(adapter.handle(classified(get_request("/boom")).await).await);
        assert_eq!(claimed.state(), ExchangeState::Handled);

        let response = claimed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(to_bytes(response.into_body(), usize::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn panic_becomes_500() {
        let adapter = adapter(
            pipeline_fn(|_req| async {
                if true {
                    panic!("handler bug");
                }
                Ok(Response::new(Body::empty()))
            }),
            "/",
        );
        let claimed = expect_claimed(adapter.handle(classified(get_request("/")).await).await);
        assert_eq!(claimed.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn websocket_requests_are_not_processed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let adapter = adapter(
            pipeline_fn(move |_req| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Response::new(Body::empty())) }
            }),
            "/",
        );
        let request = Request::builder()
            .uri("/chat")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();

        assert!(matches!(adapter.handle(classified(request).await).await, Flow::Next(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unclassified_exchange_passes() {
        let adapter = adapter(
            pipeline_fn(|_req| async { Ok(Response::new(Body::empty())) }),
            "/",
        );
        let exchange = Exchange::new(get_request("/"));
        assert!(matches!(adapter.handle(exchange).await, Flow::Next(_)));
    }

    #[tokio::test]
    async fn outside_context_path_passes() {
        let adapter = adapter(
            pipeline_fn(|_req| async { Ok(Response::new(Body::empty())) }),
            "/api",
        );
        let flow = adapter.handle(classified(get_request("/outside")).await).await;
        assert!(matches!(flow, Flow::Next(_)));
    }

    #[tokio::test]
    async fn attaches_transport_context() {
        let adapter = adapter(
            pipeline_fn(|req: Request<Body>| async move {
                let target = req.extensions().get::<RawTarget>().cloned();
                let transport = req.extensions().get::<TransportRequest>().cloned();
                let body = format!(
                    "{}|{}",
                    target.map(|t| t.0).unwrap_or_default(),
                    transport.map(|t| t.uri.to_string()).unwrap_or_default()
                );
                Ok(Response::new(Body::from(body)))
            }),
            "/api",
        );
        let claimed = expect_claimed(
            adapter.handle(classified(get_request("/api/users?id=7")).await).await,
        );
        let body = to_bytes(claimed.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "/users|/api/users?id=7");
    }

    #[tokio::test]
    async fn router_pipeline_routes_requests() {
        let router = axum::Router::new().nest(
            "/api",
            axum::Router::new().route("/ping", get(|| async { "pong" })),
        );
        let adapter = adapter(RouterPipeline::new(router), "/api");

        let claimed = expect_claimed(adapter.handle(classified(get_request("/api/ping")).await).await);
        let response = claimed.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(to_bytes(response.into_body(), usize::MAX).await.unwrap(), "pong");

        // An unmatched route is still the engine's answer, not the fallback's.
        let claimed = expect_claimed(adapter.handle(classified(get_request("/api/nope")).await).await);
        assert_eq!(claimed.state(), ExchangeState::Handled);
        assert_eq!(claimed.response().status(), StatusCode::NOT_FOUND);
    }
}
