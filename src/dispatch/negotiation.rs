//! Content negotiation.
//!
//! # Responsibilities
//! - Decide whether a body is gzip encoded for this client
//! - Produce the compact base64 form of oversized JSON when asked for it
//! - Set `Vary`, `Content-Encoding` and `Content-Length`
//!
//! # Design Decisions
//! - Whole-buffer compression only: the length is always that of the bytes
//!   actually sent
//! - The compact JSON form is an explicit per-resource capability plus a
//!   query flag, and only used when it is strictly smaller

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue};
use base64::Engine as _;
use flate2::{write::GzEncoder, Compression};
use std::io::{self, Write};

use crate::http::request::RestRequest;
use crate::resource::Resource;

/// Marker that prefixes the compact JSON form.
pub const COMPACT_JSON_MARKER: &str = "gzip+base64:";

/// Bodies above this size qualify for the compact JSON form.
pub const COMPACT_JSON_THRESHOLD: usize = 20 * 1024;

/// Query flag a client sets to accept the compact JSON form.
pub const COMPACT_JSON_PARAM: &str = "compressjson";

const COMPRESSIBLE_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "map", "yml", "xml", "json", "txt", "md", "csv", "svg",
];

/// Negotiation settings shared by every request of a mount.
#[derive(Debug, Clone)]
pub struct NegotiationPolicy {
    /// Global switch; when off nothing is gzip encoded.
    pub gzip: bool,
    pub compact_json_threshold: usize,
    pub compact_json_param: String,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            gzip: true,
            compact_json_threshold: COMPACT_JSON_THRESHOLD,
            compact_json_param: COMPACT_JSON_PARAM.to_string(),
        }
    }
}

/// Content codings this engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Gzip => "gzip",
        }
    }
}

/// The bytes sent for a resource, with how they were encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub body: Bytes,
    pub content_encoding: Option<ContentEncoding>,
    /// Replaces the resource's Content-Type when set.
    pub content_type: Option<&'static str>,
}

impl Representation {
    pub fn identity(body: Bytes) -> Self {
        Self {
            body,
            content_encoding: None,
            content_type: None,
        }
    }

    /// Write the encoding and length headers for this representation.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        if let Some(encoding) = self.content_encoding {
            headers.insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(encoding.as_str()),
            );
        }
        if let Some(content_type) = self.content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
    }
}

/// True when the file name ends in an extension worth compressing.
pub fn compressible_extension(segment: &str) -> bool {
    segment
        .rsplit_once('.')
        .map(|(_, ext)| COMPRESSIBLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Whether the response for `resource` can differ by `Accept-Encoding`.
pub fn negotiates(resource: &dyn Resource, policy: &NegotiationPolicy) -> bool {
    (policy.gzip && resource.gzip()) || is_compact_json_capable(resource)
}

pub fn set_vary(headers: &mut HeaderMap) {
    headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
}

/// Choose the representation of `body` for this request.
pub fn negotiate(
    body: Bytes,
    resource: &dyn Resource,
    req: &RestRequest,
    policy: &NegotiationPolicy,
) -> Representation {
    if policy.gzip && resource.gzip() && req.accepts_gzip() {
        match gzip(&body) {
            Ok(compressed) => {
                return Representation {
                    body: Bytes::from(compressed),
                    content_encoding: Some(ContentEncoding::Gzip),
                    content_type: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Gzip encoding failed, sending identity");
            }
        }
    }

    if is_compact_json_capable(resource)
        && body.len() > policy.compact_json_threshold
        && req.query_flag(&policy.compact_json_param)
    {
        match compact_json(&body) {
            Ok(Some(compact)) => {
                return Representation {
                    body: compact,
                    content_encoding: None,
                    content_type: Some("text/plain; charset=utf-8"),
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Compact JSON encoding failed, sending identity");
            }
        }
    }

    Representation::identity(body)
}

/// Gzip `data` in one pass.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Marker plus base64 of the gzipped JSON, or `None` when that is not
/// strictly smaller than the JSON itself.
pub fn compact_json(json: &[u8]) -> io::Result<Option<Bytes>> {
    let compressed = gzip(json)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);
    if COMPACT_JSON_MARKER.len() + encoded.len() >= json.len() {
        return Ok(None);
    }
    let mut out = String::with_capacity(COMPACT_JSON_MARKER.len() + encoded.len());
    out.push_str(COMPACT_JSON_MARKER);
    out.push_str(&encoded);
    Ok(Some(Bytes::from(out)))
}

fn is_compact_json_capable(resource: &dyn Resource) -> bool {
    resource.compact_json()
        && resource
            .content_type()
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false)
}
