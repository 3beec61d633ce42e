use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod active;
pub mod config;
pub mod destination;
pub mod outline;
pub mod scroll;
pub mod session;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use active::{compute_active, ActiveOutline};
pub use config::{Config, ConfigError, NavigationConfig, OutlineConfig};
pub use destination::{
    resolve_page_number, resolve_target, DestElement, Destination, ResolvedDestination,
};
pub use outline::{
    build_outline_entries, load_outline, IndexedEntry, Outline, OutlineEntry, OutlineId,
    OutlineIndex, RawOutlineNode, UNTITLED_TITLE,
};
pub use scroll::{
    compute_scroll_top, scroll_to_destination, PageElementLookup, PageGeometry, ScrollBehavior,
    ScrollContainer, ScrollOptions, ScrollTarget,
};
pub use session::{BuildResult, BuildTicket, OutlineSession, OutlineView, SessionEvent};
pub use viewport::{current_page_at, scroll_progress, PageBox, ScrollMetrics};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c1d9e-52a4-5b8e-9c61-0d4e7a2b6f13").expect("valid namespace UUID")
});

/// Stable handle id for a document loaded from `path`.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

/// Id for a document that has no backing path (URL fetches, in-memory bytes).
pub fn ephemeral_document_id() -> DocumentId {
    Uuid::new_v4()
}

/// Indirect reference to a page object, as issued by the document engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub object: u32,
    pub generation: u16,
}

impl PageRef {
    pub fn new(object: u32, generation: u16) -> Self {
        Self { object, generation }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.object, self.generation)
    }
}

/// Page dimensions in PDF units at the given scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl Viewport {
    pub fn unscaled(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
            scale: self.scale * factor,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("page reference {0} does not point at a page")]
    UnknownPageReference(PageRef),
    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },
    /// Backend failure without a dedicated variant.
    #[error("{0}")]
    Message(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The external PDF engine the navigation core talks to.
///
/// Implementations own parsing; the core only asks for the outline, for
/// named-destination lookups, for page-reference resolution and for page
/// dimensions.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    fn id(&self) -> DocumentId;

    fn page_count(&self) -> usize;

    /// Raw outline, `None` when the document carries no outline.
    async fn outline(&self) -> EngineResult<Option<Vec<RawOutlineNode>>>;

    /// Explicit destination registered under `name`, `None` when unknown.
    async fn destination(&self, name: &str) -> EngineResult<Option<Destination>>;

    /// 0-based index of the page `reference` points at.
    async fn page_index(&self, reference: &PageRef) -> EngineResult<usize>;

    /// Dimensions of the 1-based `page_number` at scale 1.
    async fn page_viewport(&self, page_number: usize) -> EngineResult<Viewport>;
}

#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> anyhow::Result<Arc<dyn DocumentEngine>>;
}
