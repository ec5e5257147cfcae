//! Request handling and the per-request context.
//!
//! # Responsibilities
//! - Buffer the request body once, before dispatch
//! - Carry the mount prefix alongside the request so resources can build URLs
//! - Expose typed per-request attributes (`http::Extensions`) to delegates
//! - Provide the small request predicates resources keep asking for
//!
//! # Design Decisions
//! - The attribute bag is the request's own extension map: it lives exactly as
//!   long as the request, so nothing has to clean it up on error or panic
//! - Middleware writes attributes, delegates read them; no global state

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, Extensions, HeaderMap, Method, Request, Uri},
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::resource::ResourceError;

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Query flag that switches JSON data sources to their live variant.
pub const LIVE_DATA_PARAM: &str = "livedata";

/// Attribute marking a request that asked for live (uncached, freshly
/// computed) data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveData(pub bool);

/// A fully buffered request as seen by the dispatcher and by resources.
#[derive(Debug)]
pub struct RestRequest {
    parts: Parts,
    body: Bytes,
    prefix: Arc<str>,
}

impl RestRequest {
    /// Wrap a buffered request mounted under `prefix`.
    pub fn new(request: Request<Bytes>, prefix: impl Into<Arc<str>>) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body, prefix)
    }

    pub fn from_parts(parts: Parts, body: Bytes, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            parts,
            body,
            prefix: prefix.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Header value as a string; missing and non-ASCII values read as `None`.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Typed attribute lookup.
    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.parts.extensions.get::<T>().cloned()
    }

    /// The mount prefix, always starting and ending with `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResourceError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Request ID assigned by the request-id layer, or `"unknown"`.
    pub fn request_id(&self) -> &str {
        self.header(X_REQUEST_ID).unwrap_or("unknown")
    }

    /// True when the query string carries `name`, bare or with a value other
    /// than `0`/`false`.
    pub fn query_flag(&self, name: &str) -> bool {
        query_has_flag(self.parts.uri.query(), name)
    }

    /// True when the client accepts a gzip-encoded response.
    pub fn accepts_gzip(&self) -> bool {
        self.header(header::ACCEPT_ENCODING)
            .map(|v| v.contains("gzip"))
            .unwrap_or(false)
    }

    /// GET, HEAD, OPTIONS and TRACE never change server state.
    pub fn is_safe(&self) -> bool {
        matches!(
            self.parts.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }

    /// True when the comma separated feature header contains `flag`.
    pub fn feature_flag(&self, header_name: &str, flag: &str) -> bool {
        self.header(header_name)
            .map(|v| v.contains(flag))
            .unwrap_or(false)
    }

    /// True when middleware marked this request as asking for live data.
    pub fn is_live(&self) -> bool {
        self.parts
            .extensions
            .get::<LiveData>()
            .map(|live| live.0)
            .unwrap_or(false)
    }
}

/// Middleware marking requests that carry the `livedata` query flag.
pub async fn live_data_layer(mut req: Request<Body>, next: Next) -> Response {
    if query_has_flag(req.uri().query(), LIVE_DATA_PARAM) {
        req.extensions_mut().insert(LiveData(true));
    }
    next.run(req).await
}

fn query_has_flag(query: Option<&str>, name: &str) -> bool {
    let Some(query) = query else {
        return false;
    };
    query.split('&').any(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        key == name && value != "0" && !value.eq_ignore_ascii_case("false")
    })
}
