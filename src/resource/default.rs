//! Delegate-backed resource.
//!
//! # Responsibilities
//! - Provide a ready-made `Resource` whose capabilities come from independent
//!   delegates (JSON data, raw bytes, update, replace, create, remove, child
//!   lookup, digest ETag, representation cache, named actions)
//! - Validate the wiring once, when the resource is built
//!
//! # Design Decisions
//! - One optional field per capability, resolved at `build()`; an absent
//!   capability answers `ResourceError::Unsupported`
//! - Allowing a method without its delegate is a `SetupError`, so a tree
//!   never advertises an operation it cannot perform
//! - Delegates are plain traits with blanket impls for closures

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::http::request::RestRequest;
use crate::resource::cache::RepresentationCache;
use crate::resource::model::{
    MethodSet, Resource, ResourceError, ResourceResult, SetupError, CONTENT_TYPE_JSON,
};

/// Produces the JSON document of a resource.
pub trait DataSource: Send + Sync {
    /// Current data; `None` is sent as an empty body.
    fn data(&self, req: &RestRequest) -> ResourceResult<Option<Value>>;

    /// Data for requests marked live; defaults to `data`.
    fn live_data(&self, req: &RestRequest) -> ResourceResult<Option<Value>> {
        self.data(req)
    }
}

/// Produces the body of a resource as raw bytes.
pub trait RawReader: Send + Sync {
    fn read_raw(&self, req: &RestRequest) -> ResourceResult<Bytes>;
}

pub trait Updater: Send + Sync {
    fn update(&self, req: &RestRequest) -> ResourceResult<()>;
}

pub trait Replacer: Send + Sync {
    fn replace(&self, req: &RestRequest) -> ResourceResult<()>;
}

pub trait Creator: Send + Sync {
    fn create(&self, req: &RestRequest) -> ResourceResult<Arc<dyn Resource>>;
}

pub trait Remover: Send + Sync {
    fn remove(&self, name: &str, req: &RestRequest) -> ResourceResult<()>;
}

/// Looks up children that are not registered statically.
pub trait ChildSource: Send + Sync {
    fn child(&self, name: &str, req: &RestRequest) -> Option<Arc<dyn Resource>>;
}

/// Supplies the bytes an ETag is derived from (a version, a hash, a
/// modification time). `None` means no ETag.
pub trait Digest: Send + Sync {
    fn digest(&self, req: &RestRequest) -> Option<Vec<u8>>;
}

impl<F> DataSource for F
where
    F: Fn(&RestRequest) -> ResourceResult<Option<Value>> + Send + Sync,
{
    fn data(&self, req: &RestRequest) -> ResourceResult<Option<Value>> {
        self(req)
    }
}

impl<F> RawReader for F
where
    F: Fn(&RestRequest) -> ResourceResult<Bytes> + Send + Sync,
{
    fn read_raw(&self, req: &RestRequest) -> ResourceResult<Bytes> {
        self(req)
    }
}

impl<F> Updater for F
where
    F: Fn(&RestRequest) -> ResourceResult<()> + Send + Sync,
{
    fn update(&self, req: &RestRequest) -> ResourceResult<()> {
        self(req)
    }
}

impl<F> Replacer for F
where
    F: Fn(&RestRequest) -> ResourceResult<()> + Send + Sync,
{
    fn replace(&self, req: &RestRequest) -> ResourceResult<()> {
        self(req)
    }
}

impl<F> Creator for F
where
    F: Fn(&RestRequest) -> ResourceResult<Arc<dyn Resource>> + Send + Sync,
{
    fn create(&self, req: &RestRequest) -> ResourceResult<Arc<dyn Resource>> {
        self(req)
    }
}

impl<F> Remover for F
where
    F: Fn(&str, &RestRequest) -> ResourceResult<()> + Send + Sync,
{
    fn remove(&self, name: &str, req: &RestRequest) -> ResourceResult<()> {
        self(name, req)
    }
}

impl<F> ChildSource for F
where
    F: Fn(&str, &RestRequest) -> Option<Arc<dyn Resource>> + Send + Sync,
{
    fn child(&self, name: &str, req: &RestRequest) -> Option<Arc<dyn Resource>> {
        self(name, req)
    }
}

impl<F> Digest for F
where
    F: Fn(&RestRequest) -> Option<Vec<u8>> + Send + Sync,
{
    fn digest(&self, req: &RestRequest) -> Option<Vec<u8>> {
        self(req)
    }
}

/// Named POST action.
pub type Action = Box<dyn Fn(&RestRequest) -> ResourceResult<()> + Send + Sync>;

enum Reader {
    Json(Arc<dyn DataSource>),
    Raw(Arc<dyn RawReader>),
}

/// A `Resource` that forwards each capability to an optional delegate.
pub struct DefaultResource {
    segment: String,
    collection: bool,
    methods: MethodSet,
    content_type: Option<String>,
    gzip: bool,
    compact_json: bool,
    cache_duration: Option<Duration>,
    cache_control: Option<String>,
    children: HashMap<String, Arc<dyn Resource>>,
    child_source: Option<Arc<dyn ChildSource>>,
    actions: BTreeMap<String, Action>,
    reader: Option<Reader>,
    updater: Option<Arc<dyn Updater>>,
    replacer: Option<Arc<dyn Replacer>>,
    creator: Option<Arc<dyn Creator>>,
    remover: Option<Arc<dyn Remover>>,
    digest: Option<Arc<dyn Digest>>,
    cache: Option<Arc<dyn RepresentationCache>>,
}

impl DefaultResource {
    /// Start building a resource named `segment`. Defaults: singular, HEAD
    /// only, JSON content type, gzip enabled.
    pub fn builder(segment: impl Into<String>) -> DefaultResourceBuilder {
        DefaultResourceBuilder {
            resource: DefaultResource {
                segment: segment.into(),
                collection: false,
                methods: MethodSet::head_only(),
                content_type: Some(CONTENT_TYPE_JSON.to_string()),
                gzip: true,
                compact_json: false,
                cache_duration: None,
                cache_control: None,
                children: HashMap::new(),
                child_source: None,
                actions: BTreeMap::new(),
                reader: None,
                updater: None,
                replacer: None,
                creator: None,
                remover: None,
                digest: None,
                cache: None,
            },
        }
    }

    fn read_json(&self, source: &dyn DataSource, req: &RestRequest) -> ResourceResult<Bytes> {
        let data = if req.is_live() {
            source.live_data(req)?
        } else {
            source.data(req)?
        };
        let Some(data) = data else {
            return Ok(Bytes::new());
        };
        serde_json::to_vec(&data).map(Bytes::from).map_err(|e| {
            tracing::error!(resource = %self.segment, error = %e, "JSON encoding failed");
            ResourceError::status(StatusCode::INTERNAL_SERVER_ERROR, "JSON encoding failed")
        })
    }
}

impl Resource for DefaultResource {
    fn path_segment(&self) -> &str {
        &self.segment
    }

    fn is_collection(&self) -> bool {
        self.collection
    }

    fn child(&self, name: &str, req: &RestRequest) -> Option<Arc<dyn Resource>> {
        if let Some(child) = self.children.get(name) {
            return Some(child.clone());
        }
        self.child_source.as_ref()?.child(name, req)
    }

    fn allowed_methods(&self) -> MethodSet {
        self.methods.clone()
    }

    fn allowed_actions(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    fn etag(&self, req: &RestRequest) -> Option<String> {
        let digest = self.digest.as_ref()?.digest(req)?;
        let hash = Sha256::digest(&digest);
        Some(format!("\"{}\"", hex::encode(&hash[..16])))
    }

    fn expires(&self) -> Option<SystemTime> {
        self.cache_duration.map(|d| SystemTime::now() + d)
    }

    fn cache_control(&self) -> Option<String> {
        if let Some(cc) = &self.cache_control {
            return Some(cc.clone());
        }
        self.cache_duration
            .map(|d| format!("max-age={}", d.as_secs()))
    }

    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn gzip(&self) -> bool {
        self.gzip
    }

    fn compact_json(&self) -> bool {
        self.compact_json
    }

    fn representation_cache(&self) -> Option<Arc<dyn RepresentationCache>> {
        self.cache.clone()
    }

    fn read(&self, req: &RestRequest) -> ResourceResult<Bytes> {
        match &self.reader {
            Some(Reader::Json(source)) => self.read_json(source.as_ref(), req),
            Some(Reader::Raw(reader)) => reader.read_raw(req),
            None => Err(ResourceError::Unsupported("read")),
        }
    }

    fn update(&self, req: &RestRequest) -> ResourceResult<()> {
        match &self.updater {
            Some(updater) => updater.update(req),
            None => Err(ResourceError::Unsupported("update")),
        }
    }

    fn replace(&self, req: &RestRequest) -> ResourceResult<()> {
        match &self.replacer {
            Some(replacer) => replacer.replace(req),
            None => Err(ResourceError::Unsupported("replace")),
        }
    }

    fn perform(&self, action: &str, req: &RestRequest) -> ResourceResult<()> {
        match self.actions.get(action) {
            Some(f) => f(req),
            None => Err(ResourceError::Unsupported("action")),
        }
    }

    fn create(&self, req: &RestRequest) -> ResourceResult<Arc<dyn Resource>> {
        match &self.creator {
            Some(creator) => creator.create(req),
            None => Err(ResourceError::Unsupported("create")),
        }
    }

    fn remove(&self, name: &str, req: &RestRequest) -> ResourceResult<()> {
        match &self.remover {
            Some(remover) => remover.remove(name, req),
            None => Err(ResourceError::Unsupported("remove")),
        }
    }
}

/// Builder for [`DefaultResource`].
pub struct DefaultResourceBuilder {
    resource: DefaultResource,
}

impl DefaultResourceBuilder {
    pub fn collection(mut self, collection: bool) -> Self {
        self.resource.collection = collection;
        self
    }

    /// Replace the allowed method set.
    pub fn methods(mut self, methods: impl Into<MethodSet>) -> Self {
        self.resource.methods = methods.into();
        self
    }

    /// Add one allowed method.
    pub fn allow(mut self, method: Method) -> Self {
        self.resource.methods.insert(method);
        self
    }

    /// Set the Content-Type; an empty string means none.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.resource.content_type = (!content_type.is_empty()).then_some(content_type);
        self
    }

    pub fn gzip(mut self, gzip: bool) -> Self {
        self.resource.gzip = gzip;
        self
    }

    pub fn compact_json(mut self, compact_json: bool) -> Self {
        self.resource.compact_json = compact_json;
        self
    }

    /// Let clients cache the representation for `duration`.
    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.resource.cache_duration = (!duration.is_zero()).then_some(duration);
        self
    }

    pub fn cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.resource.cache_control = Some(cache_control.into());
        self
    }

    /// Register a static child under its own path segment.
    pub fn child(mut self, child: Arc<dyn Resource>) -> Self {
        self.resource
            .children
            .insert(child.path_segment().to_string(), child);
        self
    }

    pub fn children(mut self, source: Arc<dyn ChildSource>) -> Self {
        self.resource.child_source = Some(source);
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&RestRequest) -> ResourceResult<()> + Send + Sync + 'static,
    {
        self.resource.actions.insert(name.into(), Box::new(action));
        self
    }

    /// Serve JSON produced by `source`. Requires a JSON content type.
    pub fn data(mut self, source: Arc<dyn DataSource>) -> Self {
        self.resource.reader = Some(Reader::Json(source));
        self
    }

    pub fn raw(mut self, reader: Arc<dyn RawReader>) -> Self {
        self.resource.reader = Some(Reader::Raw(reader));
        self
    }

    pub fn updater(mut self, updater: Arc<dyn Updater>) -> Self {
        self.resource.updater = Some(updater);
        self
    }

    pub fn replacer(mut self, replacer: Arc<dyn Replacer>) -> Self {
        self.resource.replacer = Some(replacer);
        self
    }

    pub fn creator(mut self, creator: Arc<dyn Creator>) -> Self {
        self.resource.creator = Some(creator);
        self
    }

    pub fn remover(mut self, remover: Arc<dyn Remover>) -> Self {
        self.resource.remover = Some(remover);
        self
    }

    pub fn digest(mut self, digest: Arc<dyn Digest>) -> Self {
        self.resource.digest = Some(digest);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn RepresentationCache>) -> Self {
        self.resource.cache = Some(cache);
        self
    }

    /// Validate the wiring and produce the resource.
    pub fn build(self) -> Result<DefaultResource, SetupError> {
        let r = self.resource;
        let segment = || r.segment.clone();

        if let Some(Reader::Json(_)) = r.reader {
            let content_type = r.content_type.as_deref().unwrap_or_default();
            if content_type != CONTENT_TYPE_JSON {
                return Err(SetupError::JsonContentType {
                    segment: segment(),
                    content_type: content_type.to_string(),
                });
            }
        }

        if !r.collection {
            if r.creator.is_some() {
                return Err(SetupError::NotACollection {
                    segment: segment(),
                    capability: "create",
                });
            }
            if r.remover.is_some() {
                return Err(SetupError::NotACollection {
                    segment: segment(),
                    capability: "remove",
                });
            }
        }

        let missing = |method: Method| SetupError::MissingDelegate {
            segment: segment(),
            method,
        };
        if r.methods.contains(&Method::GET) && r.reader.is_none() {
            return Err(missing(Method::GET));
        }
        if r.methods.contains(&Method::PATCH) && r.updater.is_none() {
            return Err(missing(Method::PATCH));
        }
        if r.methods.contains(&Method::PUT) && r.replacer.is_none() {
            return Err(missing(Method::PUT));
        }
        if r.methods.contains(&Method::POST)
            && r.actions.is_empty()
            && r.creator.is_none()
            && r.replacer.is_none()
        {
            return Err(missing(Method::POST));
        }

        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde_json::json;

    fn get(uri: &str) -> RestRequest {
        let req = Request::builder()
            .uri(uri)
            .body(Bytes::new())
            .unwrap();
        RestRequest::new(req, "/api/")
    }

    struct Counter;

    impl DataSource for Counter {
        fn data(&self, _req: &RestRequest) -> ResourceResult<Option<Value>> {
            Ok(Some(json!({"count": 1})))
        }

        fn live_data(&self, _req: &RestRequest) -> ResourceResult<Option<Value>> {
            Ok(Some(json!({"count": 2, "live": true})))
        }
    }

    #[test]
    fn test_json_source_requires_json_content_type() {
        let err = DefaultResource::builder("page.html")
            .content_type("text/html")
            .data(Arc::new(Counter))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::JsonContentType { .. }));
        assert!(err.to_string().contains("page.html"));
    }

    #[test]
    fn test_allowed_methods_need_delegates() {
        let err = DefaultResource::builder("x")
            .methods([Method::HEAD, Method::GET])
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            SetupError::MissingDelegate {
                segment: "x".into(),
                method: Method::GET
            }
        );

        let err = DefaultResource::builder("x")
            .allow(Method::PATCH)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::MissingDelegate { method, .. } if method == Method::PATCH));
    }

    #[test]
    fn test_create_requires_collection() {
        let creator: Arc<dyn Creator> =
            Arc::new(|_: &RestRequest| -> ResourceResult<Arc<dyn Resource>> {
                Err(ResourceError::rejected("never"))
            });
        let err = DefaultResource::builder("item")
            .creator(creator)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::NotACollection { capability: "create", .. }));
    }

    #[test]
    fn test_json_read_and_live_variant() {
        let res = DefaultResource::builder("counter")
            .allow(Method::GET)
            .data(Arc::new(Counter))
            .build()
            .unwrap();

        let mut req = get("/api/counter");
        let body = res.read(&req).unwrap();
        assert_eq!(body, Bytes::from_static(br#"{"count":1}"#));

        req.extensions_mut().insert(crate::http::request::LiveData(true));
        let body = res.read(&req).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["live"], json!(true));
    }

    #[test]
    fn test_empty_data_reads_as_empty_body() {
        let res = DefaultResource::builder("nothing")
            .allow(Method::GET)
            .data(Arc::new(|_: &RestRequest| -> ResourceResult<Option<Value>> { Ok(None) }))
            .build()
            .unwrap();
        assert!(res.read(&get("/api/nothing")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_capabilities_are_unsupported() {
        let res = DefaultResource::builder("bare").build().unwrap();
        let req = get("/api/bare");
        assert!(matches!(res.read(&req), Err(ResourceError::Unsupported("read"))));
        assert!(matches!(res.update(&req), Err(ResourceError::Unsupported("update"))));
        assert!(matches!(res.perform("go", &req), Err(ResourceError::Unsupported("action"))));
        assert!(matches!(res.remove("x", &req), Err(ResourceError::Unsupported("remove"))));
        assert!(res.etag(&req).is_none());
        assert!(res.expires().is_none());
        assert!(res.cache_control().is_none());
    }

    #[test]
    fn test_actions_and_children() {
        let leaf: Arc<dyn Resource> = Arc::new(DefaultResource::builder("leaf").build().unwrap());
        let lazy: Arc<dyn ChildSource> = Arc::new(|name: &str, _: &RestRequest| {
            (name == "lazy").then(|| {
                Arc::new(DefaultResource::builder("lazy").build().unwrap()) as Arc<dyn Resource>
            })
        });
        let res = DefaultResource::builder("node")
            .collection(true)
            .allow(Method::POST)
            .action("ping", |_| Ok(()))
            .action("fail", |_| Err(ResourceError::rejected("nope")))
            .child(leaf)
            .children(lazy)
            .build()
            .unwrap();

        let req = get("/api/node/");
        assert_eq!(res.allowed_actions(), vec!["fail".to_string(), "ping".to_string()]);
        assert!(res.perform("ping", &req).is_ok());
        assert_eq!(res.perform("fail", &req).unwrap_err().to_string(), "nope");
        assert_eq!(res.child("leaf", &req).unwrap().path_segment(), "leaf");
        assert_eq!(res.child("lazy", &req).unwrap().path_segment(), "lazy");
        assert!(res.child("other", &req).is_none());
    }

    #[test]
    fn test_digest_etag_and_cache_duration() {
        let digest: Arc<dyn Digest> =
            Arc::new(|_: &RestRequest| Some(b"version-7".to_vec()));
        let res = DefaultResource::builder("doc")
            .digest(digest)
            .cache_duration(Duration::from_secs(60))
            .build()
            .unwrap();

        let req = get("/api/doc");
        let etag = res.etag(&req).unwrap();
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag.len(), 34);
        assert_eq!(res.etag(&req), Some(etag));
        assert_eq!(res.cache_control().as_deref(), Some("max-age=60"));
        assert!(res.expires().unwrap() > SystemTime::now());
    }
}
