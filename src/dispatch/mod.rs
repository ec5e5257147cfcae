//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RestRequest (path under the mount prefix)
//!     → navigator.rs (path → Trail, action token, or redirect signal)
//!     → dispatcher.rs (allowed methods, verb protocol, status codes)
//!     → headers.rs (ETag over the trail, Expires, Cache-Control, If-None-Match)
//!     → negotiation.rs (gzip, compact JSON, Vary, Content-Length)
//!     → Response
//! ```
//!
//! # Design Decisions
//! - One dispatcher per mount; it holds the tree root and nothing per request
//! - Navigation is pure; every side effect happens in the dispatcher

pub mod dispatcher;
pub mod headers;
pub mod navigator;
pub mod negotiation;

pub use dispatcher::{DispatchPolicy, Dispatcher};
pub use headers::CachePolicy;
pub use navigator::{navigate, split_segments, Navigation, Trail};
pub use negotiation::{NegotiationPolicy, Representation};
