//! Verb dispatcher.
//!
//! # Responsibilities
//! - Strip the mount prefix and resolve the path through the navigator
//! - Turn navigator redirect signals into 301s
//! - Enforce the allowed method set, then run the verb protocol
//!   (HEAD, GET, POST action, POST create, PUT, PATCH, DELETE)
//! - Invalidate representation caches after successful mutations
//! - Log one access line and record metrics per request
//!
//! # Design Decisions
//! - Synchronous: resources may block, so the HTTP layer runs `dispatch` on
//!   the blocking pool
//! - A response is assembled whole (headers, then body) and returned; nothing
//!   is written before the status is known

use axum::{
    body::{Body, Bytes, HttpBody},
    http::{HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::config::validation::is_valid_prefix;
use crate::config::ServerConfig;
use crate::dispatch::headers::{self, CachePolicy};
use crate::dispatch::navigator::{navigate, split_segments, Navigation, Trail};
use crate::dispatch::negotiation::{self, NegotiationPolicy};
use crate::http::request::RestRequest;
use crate::http::response::{
    created, method_not_allowed, no_content, not_found, plain_text, redirect, report_error,
    status_text,
};
use crate::observability::metrics;
use crate::resource::{CacheKey, Resource, SetupError};

/// Protocol settings applied to every request of a mount.
#[derive(Debug, Clone, Default)]
pub struct DispatchPolicy {
    pub cache: CachePolicy,
    pub negotiation: NegotiationPolicy,
}

impl DispatchPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            cache: CachePolicy {
                revalidate_with_etag: config.caching.revalidate_with_etag,
            },
            negotiation: NegotiationPolicy {
                gzip: config.compression.gzip,
                compact_json_threshold: config.compression.compact_json_threshold,
                compact_json_param: config.compression.compact_json_param.clone(),
            },
        }
    }
}

/// Serves a resource tree mounted under a path prefix.
pub struct Dispatcher {
    root: Arc<dyn Resource>,
    prefix: Arc<str>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    /// Mount `root` under `prefix`, which must start and end with `/`.
    pub fn new(
        root: Arc<dyn Resource>,
        prefix: &str,
        policy: DispatchPolicy,
    ) -> Result<Self, SetupError> {
        if !is_valid_prefix(prefix) {
            return Err(SetupError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self {
            root,
            prefix: Arc::from(prefix),
            policy,
        })
    }

    pub fn prefix(&self) -> &Arc<str> {
        &self.prefix
    }

    pub fn root(&self) -> &Arc<dyn Resource> {
        &self.root
    }

    /// Wrap a buffered request for this mount.
    pub fn request(&self, request: Request<Bytes>) -> RestRequest {
        RestRequest::new(request, self.prefix.clone())
    }

    /// Handle one request end to end.
    ///
    /// A panic while routing is logged and counted as a 500, then resumed for
    /// the HTTP layer to answer.
    pub fn dispatch(&self, req: &RestRequest) -> Response {
        let start = Instant::now();
        let response = match panic::catch_unwind(AssertUnwindSafe(|| self.route(req))) {
            Ok(response) => response,
            Err(payload) => {
                log_access(req, StatusCode::INTERNAL_SERVER_ERROR, 0, start);
                panic::resume_unwind(payload);
            }
        };

        let bytes = response.body().size_hint().exact().unwrap_or(0);
        log_access(req, response.status(), bytes, start);
        response
    }

    fn route(&self, req: &RestRequest) -> Response {
        let path = req.uri().path();

        if self.prefix.len() > 1 && Some(path) == self.prefix.strip_suffix('/') {
            return redirect(&with_query(self.prefix.to_string(), req.uri()));
        }

        let Some(rest) = path.strip_prefix(&*self.prefix) else {
            tracing::warn!(
                request_id = %req.request_id(),
                path = %path,
                prefix = %self.prefix,
                "Request path outside the mount prefix"
            );
            return not_found();
        };

        let navigation = if rest.is_empty() {
            Navigation::Found(Trail::new(self.root.clone()))
        } else {
            navigate(self.root.clone(), &split_segments(rest), req)
        };

        match navigation {
            Navigation::Found(trail) => self.handle(&trail, None, req),
            Navigation::Action(trail, action) => self.handle(&trail, Some(action.as_str()), req),
            Navigation::AddTrailingSlash => {
                redirect(&with_query(format!("{}/", path), req.uri()))
            }
            Navigation::RemoveTrailingSlash => {
                let trimmed = path.strip_suffix('/').unwrap_or(path);
                redirect(&with_query(trimmed.to_string(), req.uri()))
            }
            Navigation::NotFound => not_found(),
        }
    }

    fn handle(&self, trail: &Trail, action: Option<&str>, req: &RestRequest) -> Response {
        if action.is_some() && req.method() != Method::POST {
            return plain_text(StatusCode::NOT_FOUND, "Non-POST action");
        }

        let allowed = trail.target().allowed_methods();
        if !allowed.contains(req.method()) {
            return method_not_allowed(&allowed);
        }

        match (req.method(), action) {
            (&Method::HEAD, _) => self.head(trail, req),
            (&Method::GET, _) => self.get(trail, req),
            (&Method::POST, Some(action)) => self.perform(trail, action, req),
            (&Method::POST, None) => self.post(trail, req),
            (&Method::PUT, _) => self.put(trail, req),
            (&Method::PATCH, _) => self.patch(trail, req),
            (&Method::DELETE, _) => self.delete(trail, req),
            _ => status_text(StatusCode::NOT_IMPLEMENTED),
        }
    }

    /// Content and caching headers for the target, plus its effective ETag.
    fn metadata(&self, trail: &Trail, req: &RestRequest) -> (HeaderMap, Option<String>) {
        let resource = trail.target().as_ref();
        let etag = headers::resolve_etag(trail, req);

        let mut map = HeaderMap::new();
        headers::apply_resource_headers(&mut map, resource, etag.as_deref(), &self.policy.cache);
        if negotiation::negotiates(resource, &self.policy.negotiation) {
            negotiation::set_vary(&mut map);
        }
        (map, etag)
    }

    fn head(&self, trail: &Trail, req: &RestRequest) -> Response {
        let (headers, etag) = self.metadata(trail, req);
        if is_not_modified(req, etag.as_deref()) {
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }
        (StatusCode::OK, headers).into_response()
    }

    fn get(&self, trail: &Trail, req: &RestRequest) -> Response {
        let (mut headers, etag) = self.metadata(trail, req);
        if is_not_modified(req, etag.as_deref()) {
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }

        let resource = trail.target();
        // Live requests always read fresh and never fill the cache.
        let cache = if req.is_live() {
            None
        } else {
            resource.representation_cache()
        };
        let key = CacheKey::for_request(
            trail,
            req,
            etag.as_deref(),
            &self.policy.negotiation.compact_json_param,
        );

        let representation = match cache.as_ref().and_then(|c| c.get(&key)) {
            Some(hit) => {
                metrics::record_cache_hit();
                hit
            }
            None => {
                // Taken before the read so a mutation committed meanwhile
                // keeps this representation out of the cache.
                let generation = cache.as_ref().map(|c| c.generation());
                let body = match resource.read(req) {
                    Ok(body) => body,
                    Err(e) => return report_error(&e, req),
                };
                let representation = negotiation::negotiate(
                    body,
                    resource.as_ref(),
                    req,
                    &self.policy.negotiation,
                );
                if let (Some(cache), Some(generation)) = (&cache, generation) {
                    cache.put(key, generation, representation.clone());
                }
                representation
            }
        };

        representation.apply_headers(&mut headers);
        (StatusCode::OK, headers, Body::from(representation.body)).into_response()
    }

    fn perform(&self, trail: &Trail, action: &str, req: &RestRequest) -> Response {
        let resource = trail.target();
        if !resource.allowed_actions().iter().any(|a| a == action) {
            return plain_text(StatusCode::BAD_REQUEST, "Unknown action");
        }
        match resource.perform(action, req) {
            Ok(()) => {
                invalidate(trail);
                no_content()
            }
            Err(e) => report_error(&e, req),
        }
    }

    fn post(&self, trail: &Trail, req: &RestRequest) -> Response {
        let resource = trail.target();
        if !resource.is_collection() {
            if resource.allowed_methods().contains(&Method::PUT) {
                return self.put(trail, req);
            }
            return plain_text(StatusCode::BAD_REQUEST, "Not a collection");
        }

        match resource.create(req) {
            Ok(member) => {
                invalidate(trail);
                let location = trail.with_child(member).url(&self.prefix);
                tracing::debug!(request_id = %req.request_id(), location = %location, "Member created");
                created(&location)
            }
            Err(e) => report_error(&e, req),
        }
    }

    fn put(&self, trail: &Trail, req: &RestRequest) -> Response {
        match trail.target().replace(req) {
            Ok(()) => {
                invalidate(trail);
                no_content()
            }
            Err(e) => report_error(&e, req),
        }
    }

    fn patch(&self, trail: &Trail, req: &RestRequest) -> Response {
        match trail.target().update(req) {
            Ok(()) => {
                invalidate(trail);
                no_content()
            }
            Err(e) => report_error(&e, req),
        }
    }

    fn delete(&self, trail: &Trail, req: &RestRequest) -> Response {
        let Some(parent) = trail.parent() else {
            return plain_text(StatusCode::BAD_REQUEST, "No parent");
        };
        if !parent.is_collection() {
            return plain_text(StatusCode::BAD_REQUEST, "Parent is not a collection");
        }
        match parent.remove(trail.target().path_segment(), req) {
            Ok(()) => {
                invalidate(trail);
                no_content()
            }
            Err(e) => report_error(&e, req),
        }
    }
}

fn log_access(req: &RestRequest, status: StatusCode, bytes: u64, start: Instant) {
    tracing::info!(
        request_id = %req.request_id(),
        method = %req.method(),
        uri = %req.uri(),
        status = status.as_u16(),
        bytes,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Request dispatched"
    );
    metrics::record_request(req.method().as_str(), status.as_u16(), start);
}

fn is_not_modified(req: &RestRequest, etag: Option<&str>) -> bool {
    etag.map(|etag| headers::if_none_match(req, etag))
        .unwrap_or(false)
}

/// Drop cached representations of the target and every ancestor.
fn invalidate(trail: &Trail) {
    for node in trail.ancestry() {
        if let Some(cache) = node.representation_cache() {
            cache.invalidate();
        }
    }
}

fn with_query(path: String, uri: &Uri) -> String {
    match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    }
}
