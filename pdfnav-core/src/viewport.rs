//! Current page and progress from raw scroll-container metrics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

/// A rendered page element, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub page_number: usize,
    pub offset_top: f64,
    pub offset_height: f64,
}

impl PageBox {
    pub fn bottom(&self) -> f64 {
        self.offset_top + self.offset_height
    }
}

/// The first page whose bottom edge reaches the anchor line at
/// `anchor_ratio` of the visible height.
///
/// Keeps `previous` when no page reaches the anchor.
pub fn current_page_at(
    metrics: ScrollMetrics,
    pages: &[PageBox],
    anchor_ratio: f64,
    previous: usize,
) -> usize {
    let anchor = metrics.scroll_top + metrics.client_height * anchor_ratio;
    pages
        .iter()
        .find(|page| page.bottom() >= anchor)
        .map(|page| page.page_number)
        .unwrap_or(previous)
}

/// Scroll position as a percentage of the scrollable range.
pub fn scroll_progress(metrics: ScrollMetrics) -> f64 {
    let max_scroll = metrics.scroll_height - metrics.client_height;
    if max_scroll <= 0.0 {
        return 0.0;
    }
    (metrics.scroll_top / max_scroll * 100.0).clamp(0.0, 100.0)
}
