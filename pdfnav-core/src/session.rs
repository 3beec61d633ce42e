use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::active::{compute_active, ActiveOutline};
use crate::config::{Config, OutlineConfig};
use crate::outline::{load_outline, Outline, OutlineEntry, OutlineId};
use crate::scroll::{scroll_to_destination, PageElementLookup, ScrollContainer, ScrollOptions};
use crate::viewport::{current_page_at, PageBox, ScrollMetrics};
use crate::{DocumentEngine, DocumentId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentChanged(Option<DocumentId>),
    OutlineReady { document: DocumentId, entries: usize },
    StaleBuildDiscarded { document: DocumentId, generation: u64 },
    ActiveEntryChanged(Option<OutlineId>),
}

/// An outline build for one document load, detached from the session so it
/// can run while the session keeps serving scroll updates.
pub struct BuildTicket {
    generation: u64,
    engine: Arc<dyn DocumentEngine>,
    config: OutlineConfig,
}

impl BuildTicket {
    pub async fn build(self) -> BuildResult {
        let outline = load_outline(self.engine.as_ref(), &self.config).await;
        BuildResult {
            generation: self.generation,
            document: self.engine.id(),
            outline,
        }
    }
}

#[derive(Debug)]
pub struct BuildResult {
    generation: u64,
    document: DocumentId,
    outline: Outline,
}

/// What the outline panel renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineView<'a> {
    pub entries: &'a [OutlineEntry],
    pub active_id: Option<&'a OutlineId>,
    pub active_ids: &'a BTreeSet<OutlineId>,
    pub hovered_id: Option<&'a OutlineId>,
}

impl OutlineView<'_> {
    pub fn highlighted_id(&self) -> Option<&OutlineId> {
        self.hovered_id.or(self.active_id)
    }
}

/// Outline state for the document currently shown by the viewer.
pub struct OutlineSession {
    config: Config,
    document: Option<Arc<dyn DocumentEngine>>,
    generation: u64,
    outline: Outline,
    current_page: usize,
    active: ActiveOutline,
    hovered: Option<OutlineId>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl OutlineSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            document: None,
            generation: 0,
            outline: Outline::empty(),
            current_page: 1,
            active: ActiveOutline::default(),
            hovered: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared event queue. Nothing is ever removed by the session; front ends
    /// drain it after each batch of calls.
    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document(&self) -> Option<&Arc<dyn DocumentEngine>> {
        self.document.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn active(&self) -> &ActiveOutline {
        &self.active
    }

    /// Switches to `engine` and hands out the build for its outline.
    ///
    /// Any build started for an earlier document is invalidated.
    pub fn begin_load(&mut self, engine: Arc<dyn DocumentEngine>) -> BuildTicket {
        let document = engine.id();
        self.reset(Some(Arc::clone(&engine)));
        debug!(%document, generation = self.generation, "outline build started");
        BuildTicket {
            generation: self.generation,
            engine,
            config: self.config.outline.clone(),
        }
    }

    /// Installs a finished build unless a newer document superseded it.
    pub fn apply(&mut self, result: BuildResult) -> bool {
        if result.generation != self.generation {
            info!(
                document = %result.document,
                generation = result.generation,
                current = self.generation,
                "discarding stale outline build"
            );
            self.events.lock().push(SessionEvent::StaleBuildDiscarded {
                document: result.document,
                generation: result.generation,
            });
            return false;
        }

        let entries = result.outline.index().len();
        self.outline = result.outline;
        self.events.lock().push(SessionEvent::OutlineReady {
            document: result.document,
            entries,
        });
        self.recompute_active();
        true
    }

    #[instrument(skip(self, engine), fields(document = %engine.id()))]
    pub async fn load(&mut self, engine: Arc<dyn DocumentEngine>) -> bool {
        let ticket = self.begin_load(engine);
        let result = ticket.build().await;
        self.apply(result)
    }

    /// Drops the current document, e.g. after it failed to load.
    pub fn clear(&mut self) {
        self.reset(None);
    }

    fn reset(&mut self, document: Option<Arc<dyn DocumentEngine>>) {
        self.generation += 1;
        let id = document.as_ref().map(|engine| engine.id());
        self.document = document;
        self.outline = Outline::empty();
        self.current_page = 1;
        self.hovered = None;
        self.events.lock().push(SessionEvent::DocumentChanged(id));
        self.recompute_active();
    }

    pub fn set_current_page(&mut self, page: usize) {
        if page != self.current_page {
            self.current_page = page;
            self.recompute_active();
        }
    }

    /// Derives the current page from the scroll container and applies it.
    pub fn update_from_scroll(&mut self, metrics: ScrollMetrics, pages: &[PageBox]) -> usize {
        let page = current_page_at(
            metrics,
            pages,
            self.config.navigation.anchor_ratio,
            self.current_page,
        );
        self.set_current_page(page);
        page
    }

    fn recompute_active(&mut self) {
        let index = self.outline.index();
        let active = compute_active(index.flat(), index.parents(), self.current_page);
        if active.active_id != self.active.active_id {
            self.events
                .lock()
                .push(SessionEvent::ActiveEntryChanged(active.active_id.clone()));
        }
        self.active = active;
    }

    pub fn set_hovered(&mut self, id: Option<OutlineId>) {
        self.hovered = id;
    }

    pub fn hovered(&self) -> Option<&OutlineId> {
        self.hovered.as_ref()
    }

    pub fn view(&self) -> OutlineView<'_> {
        OutlineView {
            entries: self.outline.entries(),
            active_id: self.active.active_id.as_ref(),
            active_ids: &self.active.active_ids,
            hovered_id: self.hovered.as_ref(),
        }
    }

    /// Scrolls to the destination of the entry with `id`.
    ///
    /// Entries without a destination or without a resolved page are ignored.
    #[instrument(skip(self, pages, container), fields(entry = %id))]
    pub async fn navigate_to_entry(
        &self,
        id: &OutlineId,
        pages: &dyn PageElementLookup,
        container: &dyn ScrollContainer,
    ) {
        let Some(engine) = self.document.as_ref() else {
            debug!("no document loaded");
            return;
        };
        let Some(entry) = self.outline.get(id) else {
            debug!("unknown outline entry");
            return;
        };
        let (Some(dest), Some(page_number)) = (entry.dest.as_ref(), entry.page_number) else {
            debug!("outline entry has no resolved destination");
            return;
        };

        scroll_to_destination(
            engine.as_ref(),
            Some(dest),
            Some(page_number),
            pages,
            container,
            ScrollOptions::from(&self.config.navigation),
        )
        .await;
    }
}

impl Default for OutlineSession {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
