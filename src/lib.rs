//! REST resource tree dispatch engine.
//!
//! Maps a tree of addressable resources onto HTTP: canonical URLs, verb
//! dispatch, conditional GET, caching headers, compression and named
//! POST actions.

pub mod config;
pub mod demo;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resource;

pub use config::ServerConfig;
pub use dispatch::{DispatchPolicy, Dispatcher};
pub use http::{HttpServer, RestRequest};
pub use lifecycle::Shutdown;
pub use resource::{DefaultResource, Resource, ResourceError, ResourceResult};
