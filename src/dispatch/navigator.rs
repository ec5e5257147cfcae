//! Tree navigation.
//!
//! # Responsibilities
//! - Walk the resource tree one path segment at a time
//! - Tell "found" from "found plus trailing action" from "not found"
//! - Report non-canonical URLs (missing or extra trailing slash)
//! - Build canonical URLs back from a resolved trail
//!
//! # Design Decisions
//! - The walk records every resource it passes in a `Trail`; the parent of a
//!   node is simply the previous entry, so nodes never hold parent pointers
//! - Pure: the same tree and path always produce the same result
//! - A child reporting a different segment than the one used to reach it is
//!   a broken tree and panics (caught per request at the HTTP boundary)

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::http::request::RestRequest;
use crate::resource::Resource;

/// Characters escaped when a segment is written back into a URL path.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// The resources visited from the root down to a target.
#[derive(Clone)]
pub struct Trail {
    nodes: Vec<Arc<dyn Resource>>,
}

impl Trail {
    pub fn new(root: Arc<dyn Resource>) -> Self {
        Self { nodes: vec![root] }
    }

    pub fn push(&mut self, child: Arc<dyn Resource>) {
        self.nodes.push(child);
    }

    /// A copy of this trail extended by `child`.
    pub fn with_child(&self, child: Arc<dyn Resource>) -> Self {
        let mut trail = self.clone();
        trail.push(child);
        trail
    }

    /// The resource the trail ends at.
    pub fn target(&self) -> &Arc<dyn Resource> {
        // A trail always holds at least the root.
        &self.nodes[self.nodes.len() - 1]
    }

    /// The target's parent, `None` for the root.
    pub fn parent(&self) -> Option<&Arc<dyn Resource>> {
        let len = self.nodes.len();
        (len > 1).then(|| &self.nodes[len - 2])
    }

    /// Target first, then each ancestor up to the root.
    pub fn ancestry(&self) -> impl Iterator<Item = &Arc<dyn Resource>> {
        self.nodes.iter().rev()
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_root(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Path below the mount point: `/` for the root, `/a/b` for singular
    /// resources and `/a/b/` for collections.
    pub fn relative_path(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        let mut path = String::new();
        for node in &self.nodes[1..] {
            path.push('/');
            path.extend(utf8_percent_encode(node.path_segment(), SEGMENT));
        }
        if self.target().is_collection() {
            path.push('/');
        }
        path
    }

    /// Absolute-path URL of the target under `prefix` (which ends in `/`).
    pub fn url(&self, prefix: &str) -> String {
        let base = prefix.strip_suffix('/').unwrap_or(prefix);
        format!("{}{}", base, self.relative_path())
    }

    /// Full URL of the target as seen by the client of `req`.
    pub fn absolute_url(&self, req: &RestRequest) -> Result<Url, url::ParseError> {
        let scheme = req.header("x-forwarded-proto").unwrap_or("http");
        let host = req
            .header(axum::http::header::HOST)
            .or_else(|| req.uri().authority().map(|a| a.as_str()))
            .unwrap_or("localhost");
        let base = Url::parse(&format!("{}://{}/", scheme, host))?;
        base.join(&self.url(req.prefix()))
    }
}

impl fmt::Debug for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Trail").field(&self.relative_path()).finish()
    }
}

/// Outcome of resolving a path against the tree.
#[derive(Debug)]
pub enum Navigation {
    /// The path names this resource in canonical form.
    Found(Trail),
    /// The path names a resource followed by one unknown segment, which is
    /// taken as an action name.
    Action(Trail, String),
    /// A collection was addressed without its trailing slash.
    AddTrailingSlash,
    /// A singular resource was addressed with a trailing slash.
    RemoveTrailingSlash,
    NotFound,
}

/// Split the part of a path below the mount point into decoded segments.
/// `""` yields no segments; a trailing slash yields a final empty segment.
pub fn split_segments(rest: &str) -> Vec<String> {
    if rest.is_empty() {
        return Vec::new();
    }
    rest.split('/')
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .collect()
}

/// Resolve `segments` starting at `root`.
pub fn navigate<S: AsRef<str>>(
    root: Arc<dyn Resource>,
    segments: &[S],
    req: &RestRequest,
) -> Navigation {
    let mut trail = Trail::new(root);

    for (i, segment) in segments.iter().enumerate() {
        let head = segment.as_ref();
        let last = i + 1 == segments.len();
        let current = trail.target().clone();

        if head.is_empty() {
            if !last {
                return Navigation::NotFound;
            }
            return if current.is_collection() {
                Navigation::Found(trail)
            } else {
                Navigation::RemoveTrailingSlash
            };
        }

        match current.child(head, req) {
            Some(child) => {
                if child.path_segment() != head {
                    panic!(
                        "Resource '{}' has wrong path segment ('{}' / '{}')",
                        trail.with_child(child.clone()).relative_path(),
                        child.path_segment(),
                        head
                    );
                }
                trail.push(child);
            }
            None if last => return Navigation::Action(trail, head.to_string()),
            None => return Navigation::NotFound,
        }
    }

    if trail.target().is_collection() {
        Navigation::AddTrailingSlash
    } else {
        Navigation::Found(trail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ChildSource, DefaultResource};
    use axum::body::Bytes;
    use axum::http::Request;

    fn req() -> RestRequest {
        let req = Request::builder()
            .uri("/api/")
            .header("Host", "example.com")
            .body(Bytes::new())
            .unwrap();
        RestRequest::new(req, "/api/")
    }

    fn leaf(name: &str) -> Arc<dyn Resource> {
        Arc::new(DefaultResource::builder(name).build().unwrap())
    }

    fn tree() -> Arc<dyn Resource> {
        let widgets = DefaultResource::builder("widgets")
            .collection(true)
            .child(leaf("42"))
            .child(leaf("a b"))
            .build()
            .unwrap();
        Arc::new(
            DefaultResource::builder("")
                .collection(true)
                .child(Arc::new(widgets))
                .build()
                .unwrap(),
        )
    }

    fn path_of(nav: &Navigation) -> String {
        match nav {
            Navigation::Found(t) => t.relative_path(),
            Navigation::Action(t, a) => format!("{}+{}", t.relative_path(), a),
            other => format!("{:?}", other),
        }
    }

    #[test]
    fn test_split_segments() {
        assert!(split_segments("").is_empty());
        assert_eq!(split_segments("widgets/"), vec!["widgets", ""]);
        assert_eq!(split_segments("widgets/a%20b"), vec!["widgets", "a b"]);
    }

    #[test]
    fn test_collection_requires_trailing_slash() {
        let nav = navigate(tree(), &["widgets"], &req());
        assert!(matches!(nav, Navigation::AddTrailingSlash));

        let nav = navigate(tree(), &["widgets", ""], &req());
        assert_eq!(path_of(&nav), "/widgets/");
    }

    #[test]
    fn test_singular_rejects_trailing_slash() {
        let nav = navigate(tree(), &["widgets", "42", ""], &req());
        assert!(matches!(nav, Navigation::RemoveTrailingSlash));

        let nav = navigate(tree(), &["widgets", "42"], &req());
        assert_eq!(path_of(&nav), "/widgets/42");
    }

    #[test]
    fn test_unknown_last_segment_is_action() {
        let nav = navigate(tree(), &["widgets", "42", "activate"], &req());
        assert_eq!(path_of(&nav), "/widgets/42+activate");

        let nav = navigate(tree(), &["widgets", "99"], &req());
        assert_eq!(path_of(&nav), "/widgets/+99");
    }

    #[test]
    fn test_unresolvable_paths() {
        assert!(matches!(
            navigate(tree(), &["nope", "42"], &req()),
            Navigation::NotFound
        ));
        assert!(matches!(
            navigate(tree(), &["widgets", "", "42"], &req()),
            Navigation::NotFound
        ));
    }

    #[test]
    fn test_navigation_is_idempotent() {
        let root = tree();
        let first = path_of(&navigate(root.clone(), &["widgets", "42"], &req()));
        let second = path_of(&navigate(root, &["widgets", "42"], &req()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_urls_round_trip() {
        let root = tree();
        let paths: [&[&str]; 3] = [&["widgets", ""], &["widgets", "42"], &["widgets", "a b"]];
        for path in paths {
            let Navigation::Found(trail) = navigate(root.clone(), path, &req()) else {
                panic!("{:?} not found", path);
            };
            let url = trail.url("/api/");
            let rest = url.strip_prefix("/api/").unwrap();
            let again = navigate(root.clone(), &split_segments(rest), &req());
            assert_eq!(path_of(&again), trail.relative_path());
        }
    }

    #[test]
    fn test_trail_urls_and_parents() {
        let Navigation::Found(trail) = navigate(tree(), &["widgets", "a b"], &req()) else {
            panic!("not found");
        };
        assert_eq!(trail.url("/api/"), "/api/widgets/a%20b");
        assert_eq!(trail.depth(), 2);
        assert_eq!(trail.parent().unwrap().path_segment(), "widgets");
        assert_eq!(
            trail.absolute_url(&req()).unwrap().as_str(),
            "http://example.com/api/widgets/a%20b"
        );

        let root = Trail::new(tree());
        assert!(root.parent().is_none());
        assert_eq!(root.url("/api/"), "/api/");
    }

    #[test]
    #[should_panic(expected = "wrong path segment")]
    fn test_inconsistent_child_panics() {
        let liar: Arc<dyn ChildSource> = Arc::new(|_: &str, _: &RestRequest| Some(leaf("other")));
        let root = DefaultResource::builder("")
            .collection(true)
            .children(liar)
            .build()
            .unwrap();
        navigate(Arc::new(root), &["expected"], &req());
    }
}
