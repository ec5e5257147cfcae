//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use resttree::config::ServerConfig;
use resttree::demo::{self, Widget, WidgetStore};
use resttree::lifecycle::Shutdown;
use resttree::{HttpServer, Resource};

/// Store holding widget `42`, as in the reference scenario.
pub fn seeded_store() -> WidgetStore {
    let store = WidgetStore::new();
    store.insert(Widget::new("42", "sprocket"));
    store
}

/// Defaults, mounted at `/api/`.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.mount.prefix = "/api/".to_string();
    config
}

/// Layered router over the demo tree backed by `store`.
pub fn demo_router(store: WidgetStore) -> Router {
    router_for(test_config(), demo::tree(store).unwrap())
}

pub fn router_for(config: ServerConfig, root: Arc<dyn Resource>) -> Router {
    HttpServer::new(config, root).unwrap().router()
}

/// A response reduced to what tests look at.
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Drive one request through `router` in-process.
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        headers,
        body,
    }
}

/// Start a real server on an ephemeral port.
pub async fn start_server(store: WidgetStore) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let server = HttpServer::new(test_config(), demo::tree(store).unwrap()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown, handle)
}
