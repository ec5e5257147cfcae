//! The entity contract every tree node implements.
//!
//! # Responsibilities
//! - Describe a node: path segment, collection flag, child lookup
//! - Declare what the node permits (methods, named actions)
//! - Report response metadata (ETag, Expires, Cache-Control, Content-Type)
//! - Perform reads and writes on behalf of the dispatcher
//!
//! # Design Decisions
//! - Parents are not part of the contract; navigation records the path taken
//!   (see `dispatch::navigator::Trail`), so ownership only flows downward
//! - Every operation has a default that answers `ResourceError::Unsupported`,
//!   which the dispatcher treats as a programming error, not a client error
//! - Synchronous by design: the dispatcher runs on the blocking pool

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::dispatch::negotiation;
use crate::http::request::RestRequest;
use crate::resource::cache::RepresentationCache;

/// Content type of JSON producing resources.
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Errors returned by resource operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Business-rule or validation failure. The message becomes the response
    /// body; a leading status code (`"409 ..."`) or an exact reason phrase
    /// selects the status, 400 otherwise.
    #[error("{0}")]
    Rejected(String),

    /// Failure with an explicit HTTP status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Malformed JSON request body.
    #[error("Malformed body: {0}")]
    Body(#[from] serde_json::Error),

    /// I/O failure while reading or writing the underlying state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The resource was routed an operation it never wired up.
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

impl ResourceError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// True for errors that indicate a wiring mistake rather than bad input.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Wiring mistakes detected while the tree or the mount is being built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    /// Mount prefixes must start and end with `/`.
    #[error("Invalid prefix '{0}': must start and end with '/'")]
    InvalidPrefix(String),

    /// A JSON data source was attached to a resource serving something else.
    #[error("Resource '{segment}' has a JSON data source but Content-Type '{content_type}'")]
    JsonContentType {
        segment: String,
        content_type: String,
    },

    /// A method is allowed but nothing implements it.
    #[error("Resource '{segment}' allows {method} but has no delegate for it")]
    MissingDelegate { segment: String, method: Method },

    /// Member creation or removal configured on a singular resource.
    #[error("Resource '{segment}' is not a collection but has a {capability} delegate")]
    NotACollection {
        segment: String,
        capability: &'static str,
    },
}

/// Ordered set of HTTP methods a resource accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet(Vec<Method>);

impl MethodSet {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        let mut set = Self::default();
        for method in methods {
            set.insert(method);
        }
        set
    }

    /// HEAD only, the most restrictive useful set.
    pub fn head_only() -> Self {
        Self::new([Method::HEAD])
    }

    /// HEAD and GET.
    pub fn read_only() -> Self {
        Self::new([Method::HEAD, Method::GET])
    }

    pub fn insert(&mut self, method: Method) {
        if !self.0.contains(&method) {
            self.0.push(method);
        }
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of the `Allow` header.
    pub fn allow_header(&self) -> String {
        self.0
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.allow_header())
    }
}

impl<const N: usize> From<[Method; N]> for MethodSet {
    fn from(methods: [Method; N]) -> Self {
        Self::new(methods)
    }
}

/// A node of the resource tree.
pub trait Resource: Send + Sync {
    /// URL path component naming this resource under its parent.
    fn path_segment(&self) -> &str;

    /// Collections live at URLs ending in `/` and accept `create`/`remove`.
    fn is_collection(&self) -> bool {
        false
    }

    /// Child named `name`, possibly synthesized on demand. The returned
    /// resource must report `name` as its path segment.
    fn child(&self, _name: &str, _req: &RestRequest) -> Option<Arc<dyn Resource>> {
        None
    }

    fn allowed_methods(&self) -> MethodSet {
        MethodSet::head_only()
    }

    fn allowed_actions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Entity tag; `None` defers to the nearest ancestor that has one.
    fn etag(&self, _req: &RestRequest) -> Option<String> {
        None
    }

    fn expires(&self) -> Option<SystemTime> {
        None
    }

    fn cache_control(&self) -> Option<String> {
        None
    }

    fn content_type(&self) -> Option<String> {
        None
    }

    /// Whether the body may be gzip encoded. Defaults to a file-extension
    /// heuristic on the path segment.
    fn gzip(&self) -> bool {
        negotiation::compressible_extension(self.path_segment())
    }

    /// Whether oversized JSON may be sent in the compact base64 form when the
    /// client asks for it.
    fn compact_json(&self) -> bool {
        false
    }

    /// Cache of encoded representations, consulted before `read`.
    fn representation_cache(&self) -> Option<Arc<dyn RepresentationCache>> {
        None
    }

    /// Produce the unencoded body.
    fn read(&self, _req: &RestRequest) -> ResourceResult<Bytes> {
        Err(ResourceError::Unsupported("read"))
    }

    /// Partial update (PATCH).
    fn update(&self, _req: &RestRequest) -> ResourceResult<()> {
        Err(ResourceError::Unsupported("update"))
    }

    /// Whole-resource replace (PUT, or POST on a replaceable resource).
    fn replace(&self, _req: &RestRequest) -> ResourceResult<()> {
        Err(ResourceError::Unsupported("replace"))
    }

    /// Run the named action.
    fn perform(&self, _action: &str, _req: &RestRequest) -> ResourceResult<()> {
        Err(ResourceError::Unsupported("action"))
    }

    /// Create a member of this collection and return it.
    fn create(&self, _req: &RestRequest) -> ResourceResult<Arc<dyn Resource>> {
        Err(ResourceError::Unsupported("create"))
    }

    /// Remove the member named `name` from this collection.
    fn remove(&self, _name: &str, _req: &RestRequest) -> ResourceResult<()> {
        Err(ResourceError::Unsupported("remove"))
    }
}

impl fmt::Debug for dyn Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path_segment", &self.path_segment())
            .field("is_collection", &self.is_collection())
            .finish()
    }
}
