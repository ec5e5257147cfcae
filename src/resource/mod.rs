//! Resource subsystem.
//!
//! # Data Flow
//! ```text
//! Application state (store, files, rows)
//!     → delegates (DataSource, Creator, Remover, ...)
//!     → default.rs (DefaultResource forwards each capability)
//!     → model.rs (Resource contract the dispatcher speaks)
//!     → cache.rs (encoded representations kept between requests)
//! ```
//!
//! # Design Decisions
//! - The tree is owned top-down; resources never point at their parent
//! - Capabilities are wired once at build time and validated there
//! - Unsupported operations are a distinct error variant, never a 4xx

pub mod cache;
pub mod default;
pub mod model;

pub use cache::{CacheKey, MemoryCache, RepresentationCache};
pub use default::{
    ChildSource, Creator, DataSource, DefaultResource, DefaultResourceBuilder, Digest, RawReader,
    Remover, Replacer, Updater,
};
pub use model::{
    MethodSet, Resource, ResourceError, ResourceResult, SetupError, CONTENT_TYPE_JSON,
};
