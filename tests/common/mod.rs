//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use switchyard::http::{HttpPipeline, WsConnection, WsEndpoint};
use switchyard::{initialize, BoundListener, Server, WsRouter};

/// Server bound to an ephemeral loopback port.
pub fn loopback() -> Server {
    Server::new().host(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Start a listener on port 0 with the given collaborators.
pub async fn start(
    server: Server,
    context_path: &str,
    pipeline: impl HttpPipeline,
    registry: WsRouter,
) -> BoundListener {
    initialize(server, 0, context_path, Arc::new(pipeline), Arc::new(registry))
        .await
        .expect("listener should start")
}

pub fn http_url(bound: &BoundListener, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", bound.port(), path)
}

pub fn ws_url(bound: &BoundListener, path: &str) -> String {
    format!("ws://127.0.0.1:{}{}", bound.port(), path)
}

/// Client without connection reuse so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Echo endpoint that counts the connections it has served.
#[derive(Default)]
pub struct EchoEndpoint {
    connections: AtomicUsize,
}

impl EchoEndpoint {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsEndpoint for EchoEndpoint {
    async fn on_connect(&self, mut connection: WsConnection) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        while let Some(Ok(message)) = connection.socket.recv().await {
            match message {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => {
                    if connection.socket.send(message).await.is_err() {
                        break;
                    }
                }
                _ => {}
            }
        }
    }
}
