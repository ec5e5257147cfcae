//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, body buffering)
//!     → request.rs (RestRequest, request attributes, live-data marking)
//!     → [dispatcher resolves and serves the resource]
//!     → response.rs (status mapping, plain-text errors, redirects)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{live_data_layer, LiveData, RestRequest, X_REQUEST_ID};
pub use server::HttpServer;
