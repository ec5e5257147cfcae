//! Caching and conditional request headers.
//!
//! # Responsibilities
//! - Resolve the effective ETag (the target's, else the nearest ancestor's)
//! - Emit Content-Type, ETag, Expires and the Cache-Control policy
//! - Evaluate `If-None-Match`

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::dispatch::navigator::Trail;
use crate::http::request::RestRequest;
use crate::resource::Resource;

/// Cache-Control sent when nothing about the response is cacheable.
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Cache-Control sent for ETag-only resources when revalidation is enabled.
pub const REVALIDATE: &str = "max-age=0, must-revalidate";

/// Header policy shared by every request of a mount.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Resources with an ETag but no Cache-Control of their own may be
    /// stored by clients as long as they revalidate.
    pub revalidate_with_etag: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            revalidate_with_etag: true,
        }
    }
}

/// First non-empty ETag walking from the target up to the root.
pub fn resolve_etag(trail: &Trail, req: &RestRequest) -> Option<String> {
    trail
        .ancestry()
        .find_map(|node| node.etag(req).filter(|etag| !etag.is_empty()))
}

/// Write the metadata headers of `resource`.
pub fn apply_resource_headers(
    headers: &mut HeaderMap,
    resource: &dyn Resource,
    etag: Option<&str>,
    policy: &CachePolicy,
) {
    if let Some(content_type) = resource.content_type() {
        insert(headers, header::CONTENT_TYPE, &content_type);
    }
    if let Some(etag) = etag {
        insert(headers, header::ETAG, etag);
    }
    if let Some(expires) = resource.expires() {
        insert(headers, header::EXPIRES, &httpdate::fmt_http_date(expires));
    }

    match resource.cache_control() {
        Some(cache_control) => insert(headers, header::CACHE_CONTROL, &cache_control),
        None if etag.is_some() && policy.revalidate_with_etag => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(REVALIDATE));
        }
        None => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }
    }
}

/// True when `If-None-Match` names `etag` (or is `*`).
pub fn if_none_match(req: &RestRequest, etag: &str) -> bool {
    let Some(value) = req.header(header::IF_NONE_MATCH) else {
        return false;
    };
    value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag)
    })
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => {
            tracing::warn!(header = %name, value = %value, "Dropping invalid header value");
        }
    }
}
