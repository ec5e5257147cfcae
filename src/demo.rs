//! In-memory widgets served as a resource tree.
//!
//! ```text
//! /                 root collection, links to its children
//! /widgets/         collection: list, create, remove; ETag from the store generation
//! /widgets/{id}     widget: read, patch, actions `activate` / `deactivate`
//! ```
//!
//! Backs the `resttree` binary and the integration tests.

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::http::request::RestRequest;
use crate::resource::{
    ChildSource, Creator, DataSource, DefaultResource, Digest, MemoryCache, MethodSet, Remover,
    Resource, ResourceError, ResourceResult, SetupError, CONTENT_TYPE_JSON,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl Widget {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
            active: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewWidget {
    name: String,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WidgetPatch {
    name: Option<String>,
    color: Option<String>,
    active: Option<bool>,
}

/// Concurrent widget storage. Every change bumps the generation, which is
/// what the collection's ETag is derived from.
#[derive(Clone, Default)]
pub struct WidgetStore {
    widgets: Arc<DashMap<String, Widget>>,
    generation: Arc<AtomicU64>,
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, widget: Widget) {
        self.widgets.insert(widget.id.clone(), widget);
        self.bump();
    }

    pub fn get(&self, id: &str) -> Option<Widget> {
        self.widgets.get(id).map(|w| w.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.widgets.contains_key(id)
    }

    /// All widgets ordered by id.
    pub fn list(&self) -> Vec<Widget> {
        let mut widgets: Vec<Widget> = self.widgets.iter().map(|w| w.value().clone()).collect();
        widgets.sort_by(|a, b| a.id.cmp(&b.id));
        widgets
    }

    pub fn remove(&self, id: &str) -> Option<Widget> {
        let removed = self.widgets.remove(id).map(|(_, w)| w);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut Widget)) -> ResourceResult<()> {
        {
            let mut widget = self
                .widgets
                .get_mut(id)
                .ok_or_else(|| ResourceError::rejected("Not Found"))?;
            f(widget.value_mut());
        }
        self.bump();
        Ok(())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn listing(&self, req: &RestRequest) -> Vec<Value> {
        let base = format!("{}widgets/", req.prefix());
        self.list()
            .into_iter()
            .map(|w| {
                json!({
                    "id": w.id,
                    "name": w.name,
                    "active": w.active,
                    "url": format!("{}{}", base, w.id),
                })
            })
            .collect()
    }
}

impl DataSource for WidgetStore {
    fn data(&self, req: &RestRequest) -> ResourceResult<Option<Value>> {
        Ok(Some(Value::Array(self.listing(req))))
    }

    /// Live listings also report the generation they were taken at.
    fn live_data(&self, req: &RestRequest) -> ResourceResult<Option<Value>> {
        Ok(Some(json!({
            "generation": self.generation(),
            "widgets": self.listing(req),
        })))
    }
}

impl Creator for WidgetStore {
    fn create(&self, req: &RestRequest) -> ResourceResult<Arc<dyn Resource>> {
        let new: NewWidget = req.json()?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ResourceError::rejected("name must not be empty"));
        }

        let id = Uuid::new_v4().simple().to_string();
        self.insert(Widget {
            id: id.clone(),
            name: name.to_string(),
            color: new.color,
            active: false,
        });
        tracing::debug!(widget = %id, "Widget created");
        Ok(Arc::new(WidgetResource::new(self.clone(), id)))
    }
}

impl Remover for WidgetStore {
    fn remove(&self, name: &str, _req: &RestRequest) -> ResourceResult<()> {
        WidgetStore::remove(self, name)
            .map(|_| ())
            .ok_or_else(|| ResourceError::rejected("Not Found"))
    }
}

impl ChildSource for WidgetStore {
    fn child(&self, name: &str, _req: &RestRequest) -> Option<Arc<dyn Resource>> {
        self.contains(name)
            .then(|| Arc::new(WidgetResource::new(self.clone(), name)) as Arc<dyn Resource>)
    }
}

impl Digest for WidgetStore {
    fn digest(&self, _req: &RestRequest) -> Option<Vec<u8>> {
        Some(self.generation().to_be_bytes().to_vec())
    }
}

/// One widget. Has no ETag of its own; the collection's covers it.
pub struct WidgetResource {
    store: WidgetStore,
    id: String,
}

impl WidgetResource {
    pub const ACTIONS: [&'static str; 2] = ["activate", "deactivate"];

    pub fn new(store: WidgetStore, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }
}

impl Resource for WidgetResource {
    fn path_segment(&self) -> &str {
        &self.id
    }

    fn allowed_methods(&self) -> MethodSet {
        MethodSet::from([
            Method::HEAD,
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
    }

    fn allowed_actions(&self) -> Vec<String> {
        Self::ACTIONS.iter().map(|a| a.to_string()).collect()
    }

    fn content_type(&self) -> Option<String> {
        Some(CONTENT_TYPE_JSON.to_string())
    }

    fn gzip(&self) -> bool {
        true
    }

    fn read(&self, _req: &RestRequest) -> ResourceResult<Bytes> {
        let widget = self
            .store
            .get(&self.id)
            .ok_or_else(|| ResourceError::rejected("Not Found"))?;
        serde_json::to_vec(&widget)
            .map(Bytes::from)
            .map_err(|e| ResourceError::status(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    }

    fn update(&self, req: &RestRequest) -> ResourceResult<()> {
        let patch: WidgetPatch = req.json()?;
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(ResourceError::rejected("name must not be empty"));
            }
        }
        self.store.modify(&self.id, |w| {
            if let Some(name) = patch.name {
                w.name = name.trim().to_string();
            }
            if patch.color.is_some() {
                w.color = patch.color;
            }
            if let Some(active) = patch.active {
                w.active = active;
            }
        })
    }

    fn perform(&self, action: &str, _req: &RestRequest) -> ResourceResult<()> {
        let active = match action {
            "activate" => true,
            "deactivate" => false,
            _ => return Err(ResourceError::Unsupported("action")),
        };
        if self.store.get(&self.id).map(|w| w.active) == Some(active) {
            return Err(ResourceError::rejected(format!("409 widget already {}d", action)));
        }
        self.store.modify(&self.id, |w| w.active = active)
    }
}

/// Build the demo tree over `store`.
pub fn tree(store: WidgetStore) -> Result<Arc<dyn Resource>, SetupError> {
    let widgets = DefaultResource::builder("widgets")
        .collection(true)
        .methods([Method::HEAD, Method::GET, Method::POST])
        .compact_json(true)
        .data(Arc::new(store.clone()))
        .creator(Arc::new(store.clone()))
        .remover(Arc::new(store.clone()))
        .children(Arc::new(store.clone()))
        .digest(Arc::new(store))
        .cache(Arc::new(MemoryCache::new()))
        .build()?;

    let root = DefaultResource::builder("")
        .collection(true)
        .methods(MethodSet::read_only())
        .data(Arc::new(|req: &RestRequest| -> ResourceResult<Option<Value>> {
            Ok(Some(json!({ "widgets": format!("{}widgets/", req.prefix()) })))
        }))
        .child(Arc::new(widgets))
        .build()?;

    Ok(Arc::new(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request(method: &str, body: &str) -> RestRequest {
        let req = Request::builder()
            .method(method)
            .uri("/api/widgets/")
            .body(Bytes::from(body.to_string()))
            .unwrap();
        RestRequest::new(req, "/api/")
    }

    fn seeded() -> WidgetStore {
        let store = WidgetStore::new();
        store.insert(Widget::new("42", "sprocket"));
        store
    }

    #[test]
    fn test_tree_builds() {
        let root = tree(seeded()).unwrap();
        let widgets = root.child("widgets", &request("GET", "")).unwrap();
        assert!(widgets.is_collection());
        assert_eq!(widgets.child("42", &request("GET", "")).unwrap().path_segment(), "42");
        assert!(widgets.child("7", &request("GET", "")).is_none());
    }

    #[test]
    fn test_create_validates_name() {
        let store = seeded();
        let err = Creator::create(&store, &request("POST", r#"{"name":"  "}"#)).err().unwrap();
        assert_eq!(err.to_string(), "name must not be empty");

        let err = Creator::create(&store, &request("POST", "not json")).err().unwrap();
        assert!(matches!(err, ResourceError::Body(_)));

        let created = Creator::create(&store, &request("POST", r#"{"name":"gear"}"#)).unwrap();
        assert_eq!(store.get(created.path_segment()).unwrap().name, "gear");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_actions_and_patch() {
        let store = seeded();
        let widget = WidgetResource::new(store.clone(), "42");
        let before = store.generation();

        widget.perform("activate", &request("POST", "")).unwrap();
        assert!(store.get("42").unwrap().active);
        assert!(store.generation() > before);

        let err = widget.perform("activate", &request("POST", "")).unwrap_err();
        assert_eq!(err.to_string(), "409 widget already activated");

        widget
            .update(&request("PATCH", r#"{"color":"red"}"#))
            .unwrap();
        let updated = store.get("42").unwrap();
        assert_eq!(updated.color.as_deref(), Some("red"));
        assert_eq!(updated.name, "sprocket");
    }

    #[test]
    fn test_listing_links_members() {
        let store = seeded();
        let data = DataSource::data(&store, &request("GET", "")).unwrap().unwrap();
        assert_eq!(data[0]["url"], "/api/widgets/42");

        let live = store.live_data(&request("GET", "")).unwrap().unwrap();
        assert_eq!(live["generation"], json!(store.generation()));
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let store = seeded();
        assert!(Remover::remove(&store, "42", &request("DELETE", "")).is_ok());
        let err = Remover::remove(&store, "42", &request("DELETE", "")).unwrap_err();
        assert_eq!(err.to_string(), "Not Found");
        assert!(store.is_empty());
    }
}
