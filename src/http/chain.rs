//! Ordered, immutable dispatch chain.
//!
//! # Design Decisions
//! - Built once at startup from an explicit stage list, shared read-only after
//! - First claim wins; later stages never see a claimed exchange
//! - The terminal fallback is a separate, non-optional slot

use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;

use crate::http::exchange::{Exchange, Flow};
use crate::http::response::Fallback;
use crate::observability::metrics;

/// One step of the dispatch chain.
///
/// Implementations are shared across every connection task and must be
/// safe to call concurrently.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Short name for logs and metrics.
    fn name(&self) -> &str;

    /// Claim the exchange or hand it to the next stage.
    async fn handle(&self, exchange: Exchange) -> Flow;
}

/// Collects stages in the order they will run.
#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append stages that are already shared.
    pub fn stages(mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Freeze the chain with its terminal stage.
    pub fn build(self, fallback: Fallback) -> HandlerChain {
        HandlerChain {
            stages: self.stages.into(),
            fallback: Arc::new(fallback),
        }
    }
}

/// The frozen chain. Cloning is cheap.
#[derive(Clone)]
pub struct HandlerChain {
    stages: Arc<[Arc<dyn Stage>]>,
    fallback: Arc<Fallback>,
}

impl HandlerChain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Stage names in run order, excluding the fallback.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run an exchange through the chain and return its single response.
    pub async fn dispatch(&self, exchange: Exchange) -> Response {
        let mut exchange = exchange;
        for stage in self.stages.iter() {
            match stage.handle(exchange).await {
                Flow::Claimed(claimed) => {
                    let status = claimed.response().status();
                    tracing::debug!(
                        stage = stage.name(),
                        status = status.as_u16(),
                        elapsed_ms = claimed.elapsed().as_secs_f64() * 1000.0,
                        "Exchange handled"
                    );
                    metrics::record_exchange(stage.name(), status.as_u16(), claimed.elapsed());
                    return claimed.into_response();
                }
                Flow::Next(next) => exchange = next,
            }
        }

        let claimed = self.fallback.handle(exchange);
        metrics::record_exchange("fallback", claimed.response().status().as_u16(), claimed.elapsed());
        claimed.into_response()
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain")
            .field("stages", &self.stage_names())
            .field("fallback", &self.fallback)
            .finish()
    }
}
