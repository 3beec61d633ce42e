//! Destination to scroll-offset conversion.
//!
//! PDF space has its origin at the bottom-left of the page with Y growing
//! upward; the scroll container measures from the top of its content with Y
//! growing downward. The rendered page height over the native height gives
//! the effective scale, which already includes zoom and width fitting.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::NavigationConfig;
use crate::destination::{resolve_target, Destination};
use crate::DocumentEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// Where a page element currently sits inside the scroll container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub offset_top: f64,
    pub rendered_height: f64,
}

/// Finds the rendered element of a 1-based page, if it has been rendered.
pub trait PageElementLookup {
    fn page_element(&self, page_number: usize) -> Option<PageGeometry>;
}

pub trait ScrollContainer {
    fn visible_height(&self) -> f64;

    fn scroll_to(&self, top: f64, behavior: ScrollBehavior);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTarget {
    pub page_number: usize,
    pub pdf_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOptions {
    /// Fraction of the visible height kept above the target line.
    pub anchor_ratio: f64,
    pub behavior: ScrollBehavior,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            anchor_ratio: 0.2,
            behavior: ScrollBehavior::Smooth,
        }
    }
}

impl From<&NavigationConfig> for ScrollOptions {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            anchor_ratio: config.anchor_ratio,
            behavior: if config.smooth_scroll {
                ScrollBehavior::Smooth
            } else {
                ScrollBehavior::Instant
            },
        }
    }
}

/// Scroll offset that puts `pdf_y` of the page at `anchor_ratio` of the
/// visible height, never below zero.
///
/// Returns `None` when either height is not positive.
pub fn compute_scroll_top(
    page: PageGeometry,
    native_height: f64,
    pdf_y: f64,
    visible_height: f64,
    anchor_ratio: f64,
) -> Option<f64> {
    if !(native_height > 0.0) || !(page.rendered_height > 0.0) {
        return None;
    }
    let render_scale = page.rendered_height / native_height;
    let offset_y = (native_height - pdf_y) * render_scale;
    let top = page.offset_top + offset_y - visible_height * anchor_ratio;
    Some(if top > 0.0 { top } else { 0.0 })
}

/// Scrolls `container` to `dest`.
///
/// Every failure is logged and ends the navigation; nothing is reported back.
/// A page that has not been rendered yet is skipped silently.
#[instrument(skip_all, fields(document = %engine.id(), fallback_page = ?fallback_page))]
pub async fn scroll_to_destination(
    engine: &dyn DocumentEngine,
    dest: Option<&Destination>,
    fallback_page: Option<usize>,
    pages: &dyn PageElementLookup,
    container: &dyn ScrollContainer,
    options: ScrollOptions,
) {
    let Some(resolved) = resolve_target(engine, dest, fallback_page).await else {
        debug!("destination did not resolve to a page");
        return;
    };
    let target = resolved.scroll_target();

    let Some(page) = pages.page_element(target.page_number) else {
        debug!(page = target.page_number, "target page is not rendered");
        return;
    };

    let viewport = match engine.page_viewport(target.page_number).await {
        Ok(viewport) => viewport,
        Err(err) => {
            warn!(%err, page = target.page_number, "failed to read page viewport");
            return;
        }
    };

    let Some(top) = compute_scroll_top(
        page,
        viewport.height,
        target.pdf_y,
        container.visible_height(),
        options.anchor_ratio,
    ) else {
        warn!(
            page = target.page_number,
            native_height = viewport.height,
            rendered_height = page.rendered_height,
            "page has no measurable height"
        );
        return;
    };

    debug!(page = target.page_number, pdf_y = target.pdf_y, top, "scrolling to destination");
    container.scroll_to(top, options.behavior);
}
