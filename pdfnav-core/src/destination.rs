//! Destination resolution.
//!
//! A destination is either a name looked up through the document's name
//! table or an explicit `[page_ref, /Mode, left, top, ...]` array. Resolution
//! never fails loudly: anything the engine cannot answer turns into `None`
//! (or the caller's fallback page) and a log line.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::scroll::ScrollTarget;
use crate::{DocumentEngine, PageRef};

/// Index of the `top` coordinate in an explicit `/XYZ` destination.
const DEST_Y_INDEX: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestElement {
    Ref(PageRef),
    Name(String),
    Number(f64),
    Null,
    /// Any other PDF object; serialized as `null`.
    Other,
}

impl DestElement {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DestElement::Number(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    Named(String),
    Explicit(Vec<DestElement>),
}

impl Destination {
    pub fn explicit(&self) -> Option<&[DestElement]> {
        match self {
            Destination::Explicit(elements) => Some(elements),
            Destination::Named(_) => None,
        }
    }

    /// Target Y in PDF units, measured from the bottom of the page.
    ///
    /// Missing or non-numeric coordinates read as `0.0`, the bottom edge.
    pub fn y(&self) -> f64 {
        self.explicit().map(destination_y).unwrap_or(0.0)
    }
}

pub(crate) fn destination_y(elements: &[DestElement]) -> f64 {
    elements
        .get(DEST_Y_INDEX)
        .and_then(DestElement::as_number)
        .unwrap_or(0.0)
}

/// A destination whose page is known, with the explicit array it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDestination {
    pub page_number: usize,
    pub elements: Vec<DestElement>,
}

impl ResolvedDestination {
    pub fn pdf_y(&self) -> f64 {
        destination_y(&self.elements)
    }

    pub fn scroll_target(&self) -> ScrollTarget {
        ScrollTarget {
            page_number: self.page_number,
            pdf_y: self.pdf_y(),
        }
    }
}

/// Resolves `dest` to a 1-based page number.
///
/// `fallback` is used when the first element is not a page reference or the
/// engine fails to map the reference to an index.
pub async fn resolve_page_number(
    engine: &dyn DocumentEngine,
    dest: Option<&Destination>,
    fallback: Option<usize>,
) -> Option<usize> {
    resolve_target(engine, dest, fallback)
        .await
        .map(|resolved| resolved.page_number)
}

pub async fn resolve_target(
    engine: &dyn DocumentEngine,
    dest: Option<&Destination>,
    fallback: Option<usize>,
) -> Option<ResolvedDestination> {
    let elements = explicit_destination(engine, dest?).await?;
    let page_number = match elements.first()? {
        DestElement::Ref(reference) => match engine.page_index(reference).await {
            Ok(index) => Some(index + 1),
            Err(err) => {
                warn!(%err, %reference, ?fallback, "failed to resolve destination page reference");
                fallback
            }
        },
        other => {
            debug!(?other, ?fallback, "destination does not start with a page reference");
            fallback
        }
    }?;

    Some(ResolvedDestination {
        page_number,
        elements,
    })
}

async fn explicit_destination(
    engine: &dyn DocumentEngine,
    dest: &Destination,
) -> Option<Vec<DestElement>> {
    match dest {
        Destination::Explicit(elements) => Some(elements.clone()),
        Destination::Named(name) => match engine.destination(name).await {
            Ok(Some(Destination::Explicit(elements))) => Some(elements),
            Ok(Some(Destination::Named(alias))) => {
                debug!(name = %name, alias = %alias, "named destination resolved to another name");
                None
            }
            Ok(None) => {
                debug!(name = %name, "unknown named destination");
                None
            }
            Err(err) => {
                warn!(%err, name = %name, "failed to look up named destination");
                None
            }
        },
    }
}
