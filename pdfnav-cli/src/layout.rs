use parking_lot::Mutex;
use pdfnav_core::{
    PageBox, PageElementLookup, PageGeometry, ScrollBehavior, ScrollContainer, ScrollMetrics,
    Viewport,
};

/// Pages stacked top to bottom at a fixed zoom with a gap between them,
/// the way a continuous-scroll viewer lays them out.
#[derive(Debug, Clone)]
pub struct ContinuousLayout {
    pages: Vec<PageBox>,
    gap: f64,
}

impl ContinuousLayout {
    pub fn new(viewports: &[Viewport], zoom: f64, gap: f64) -> Self {
        let mut offset_top = 0.0;
        let pages = viewports
            .iter()
            .enumerate()
            .map(|(index, viewport)| {
                let page = PageBox {
                    page_number: index + 1,
                    offset_top,
                    offset_height: viewport.scaled(zoom).height,
                };
                offset_top = page.bottom() + gap;
                page
            })
            .collect();
        Self { pages, gap }
    }

    pub fn pages(&self) -> &[PageBox] {
        &self.pages
    }

    pub fn total_height(&self) -> f64 {
        self.pages.last().map(PageBox::bottom).unwrap_or(0.0) + self.gap
    }

    pub fn metrics(&self, scroll_top: f64, client_height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            client_height,
            scroll_height: self.total_height(),
        }
    }
}

impl PageElementLookup for ContinuousLayout {
    fn page_element(&self, page_number: usize) -> Option<PageGeometry> {
        let page = self.pages.get(page_number.checked_sub(1)?)?;
        Some(PageGeometry {
            offset_top: page.offset_top,
            rendered_height: page.offset_height,
        })
    }
}

/// Scroll container that remembers the last requested offset.
#[derive(Debug)]
pub struct RecordedScroll {
    visible_height: f64,
    last: Mutex<Option<(f64, ScrollBehavior)>>,
}

impl RecordedScroll {
    pub fn new(visible_height: f64) -> Self {
        Self {
            visible_height,
            last: Mutex::new(None),
        }
    }

    pub fn last(&self) -> Option<(f64, ScrollBehavior)> {
        *self.last.lock()
    }
}

impl ScrollContainer for RecordedScroll {
    fn visible_height(&self) -> f64 {
        self.visible_height
    }

    fn scroll_to(&self, top: f64, behavior: ScrollBehavior) {
        *self.last.lock() = Some((top, behavior));
    }
}
