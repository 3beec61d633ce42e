use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    ephemeral_document_id, DestElement, Destination, DocumentEngine, DocumentId, EngineError,
    EngineResult, PageElementLookup, PageGeometry, PageRef, RawOutlineNode, ScrollBehavior,
    ScrollContainer, Viewport,
};

pub fn xyz(reference: PageRef, y: f64) -> Destination {
    Destination::Explicit(vec![
        DestElement::Ref(reference),
        DestElement::Name("XYZ".into()),
        DestElement::Number(0.0),
        DestElement::Number(y),
        DestElement::Null,
    ])
}

pub fn node(title: &str, dest: Option<Destination>, children: Vec<RawOutlineNode>) -> RawOutlineNode {
    RawOutlineNode {
        title: Some(title.to_owned()),
        dest,
        children,
    }
}

pub struct FakeEngine {
    id: DocumentId,
    pages: Vec<(PageRef, Viewport)>,
    names: HashMap<String, Destination>,
    outline: Option<Vec<RawOutlineNode>>,
    outline_fails: bool,
    failing_refs: HashSet<PageRef>,
    yields: HashMap<PageRef, usize>,
    lookups: Mutex<Vec<PageRef>>,
}

impl FakeEngine {
    pub fn with_pages(count: usize) -> Self {
        let pages = (0..count)
            .map(|i| {
                (
                    PageRef::new(10 + i as u32, 0),
                    Viewport::unscaled(612.0, 792.0),
                )
            })
            .collect();
        Self {
            id: ephemeral_document_id(),
            pages,
            names: HashMap::new(),
            outline: None,
            outline_fails: false,
            failing_refs: HashSet::new(),
            yields: HashMap::new(),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn page_ref(&self, index: usize) -> PageRef {
        self.pages[index].0
    }

    pub fn name(&mut self, name: &str, dest: Destination) {
        self.names.insert(name.to_owned(), dest);
    }

    pub fn fail_reference(&mut self, reference: PageRef) {
        self.failing_refs.insert(reference);
    }

    pub fn set_outline(&mut self, outline: Option<Vec<RawOutlineNode>>) {
        self.outline = outline;
    }

    pub fn fail_outline(&mut self) {
        self.outline_fails = true;
    }

    pub fn set_viewport(&mut self, page_number: usize, viewport: Viewport) {
        self.pages[page_number - 1].1 = viewport;
    }

    /// Makes lookups of `reference` yield to the executor `count` times first.
    pub fn slow_reference(&mut self, reference: PageRef, count: usize) {
        self.yields.insert(reference, count);
    }

    pub fn completed_lookups(&self) -> Vec<PageRef> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl DocumentEngine for FakeEngine {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn outline(&self) -> EngineResult<Option<Vec<RawOutlineNode>>> {
        if self.outline_fails {
            return Err(EngineError::Message("outline stream is corrupt".into()));
        }
        Ok(self.outline.clone())
    }

    async fn destination(&self, name: &str) -> EngineResult<Option<Destination>> {
        Ok(self.names.get(name).cloned())
    }

    async fn page_index(&self, reference: &PageRef) -> EngineResult<usize> {
        for _ in 0..self.yields.get(reference).copied().unwrap_or(0) {
            tokio::task::yield_now().await;
        }
        self.lookups.lock().push(*reference);
        if self.failing_refs.contains(reference) {
            return Err(EngineError::Message(format!("cannot parse {reference}")));
        }
        self.pages
            .iter()
            .position(|(candidate, _)| candidate == reference)
            .ok_or(EngineError::UnknownPageReference(*reference))
    }

    async fn page_viewport(&self, page_number: usize) -> EngineResult<Viewport> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .map(|(_, viewport)| *viewport)
            .ok_or(EngineError::PageOutOfRange {
                page: page_number,
                page_count: self.pages.len(),
            })
    }
}

#[derive(Default)]
pub struct FixedPages {
    pages: HashMap<usize, PageGeometry>,
}

impl FixedPages {
    pub fn insert(&mut self, page_number: usize, offset_top: f64, rendered_height: f64) {
        self.pages.insert(
            page_number,
            PageGeometry {
                offset_top,
                rendered_height,
            },
        );
    }
}

impl PageElementLookup for FixedPages {
    fn page_element(&self, page_number: usize) -> Option<PageGeometry> {
        self.pages.get(&page_number).copied()
    }
}

pub struct RecordingContainer {
    visible_height: f64,
    scrolls: Mutex<Vec<(f64, ScrollBehavior)>>,
}

impl RecordingContainer {
    pub fn new(visible_height: f64) -> Self {
        Self {
            visible_height,
            scrolls: Mutex::new(Vec::new()),
        }
    }

    pub fn scrolls(&self) -> Vec<(f64, ScrollBehavior)> {
        self.scrolls.lock().clone()
    }
}

impl ScrollContainer for RecordingContainer {
    fn visible_height(&self) -> f64 {
        self.visible_height
    }

    fn scroll_to(&self, top: f64, behavior: ScrollBehavior) {
        self.scrolls.lock().push((top, behavior));
    }
}
