//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that mounts the dispatcher under its prefix
//! - Wire up middleware (tracing, request ID, timeouts, body limit, panics,
//!   `Server` header, live-data marking)
//! - Buffer each request body and run the dispatcher on the blocking pool
//! - Bind to a listener and drain gracefully on shutdown

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware,
    response::Response,
    routing::any,
    Router,
};
use std::any::Any;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::http::request::{live_data_layer, RestRequest};
use crate::http::response::{internal_error, status_text};
use crate::resource::{Resource, SetupError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_bytes: usize,
}

/// HTTP server serving one resource tree.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Mount `root` according to `config`.
    pub fn new(config: ServerConfig, root: Arc<dyn Resource>) -> Result<Self, SetupError> {
        let dispatcher = Arc::new(Dispatcher::new(
            root,
            &config.mount.prefix,
            DispatchPolicy::from_config(&config),
        )?);

        let state = AppState {
            dispatcher: dispatcher.clone(),
            max_body_bytes: config.limits.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            dispatcher,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let prefix = config.mount.prefix.as_str();
        let mut router: Router<AppState> = Router::new()
            .route(prefix, any(dispatch_handler))
            .route(&format!("{}{{*path}}", prefix), any(dispatch_handler));
        // The prefix without its slash, so the dispatcher can redirect it.
        if let Some(bare) = prefix.strip_suffix('/').filter(|bare| !bare.is_empty()) {
            router = router.route(bare, any(dispatch_handler));
        }

        router
            .with_state(state)
            .layer(middleware::from_fn(live_data_layer))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                server_header(),
            ))
    }

    /// The fully layered router, for serving or for driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight
    /// requests for at most `timeouts.shutdown_grace_secs`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            prefix = %self.config.mount.prefix,
            "HTTP server starting"
        );

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let draining = Arc::new(Notify::new());
        let signal = {
            let draining = draining.clone();
            async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
                draining.notify_one();
            }
        };

        let server = axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .into_future();

        tokio::select! {
            result = server => result?,
            _ = async {
                draining.notified().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Shutdown grace period elapsed, dropping open connections"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `Server` header value: engine name, version and platform.
pub fn server_header() -> HeaderValue {
    let value = format!(
        "{}/{} ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    HeaderValue::from_str(&value)
        .unwrap_or_else(|_| HeaderValue::from_static(env!("CARGO_PKG_NAME")))
}

/// Buffer the body and hand the request to the dispatcher.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(
                path = %parts.uri.path(),
                error = %e,
                "Request body rejected"
            );
            return status_text(StatusCode::PAYLOAD_TOO_LARGE);
        }
    };

    let req = RestRequest::from_parts(parts, body, state.dispatcher.prefix().clone());
    let dispatcher = state.dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(&req)).await {
        Ok(response) => response,
        // Re-raise so CatchPanicLayer answers for this request only.
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task cancelled");
            status_text(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %message, "Request handler panicked");
    internal_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_header_names_engine_and_platform() {
        let value = server_header();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("resttree/"));
        assert!(value.contains(std::env::consts::OS));
    }

    #[test]
    fn test_panic_payloads_become_generic_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = handle_panic(Box::new(String::from("boom")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
