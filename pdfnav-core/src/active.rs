//! Active outline entry for the current page.

use std::collections::{BTreeSet, HashMap};

use crate::outline::{IndexedEntry, OutlineId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveOutline {
    pub active_id: Option<OutlineId>,
    /// `active_id` and every ancestor up to its root.
    pub active_ids: BTreeSet<OutlineId>,
}

/// Picks the last entry, in document order, starting at or before
/// `current_page`.
///
/// Entries are assumed to be non-decreasing in page number along the
/// pre-order walk, so the scan stops at the first entry past the current
/// page. Outlines that point back to earlier pages after a later one may
/// therefore under-select.
pub fn compute_active(
    flat: &[IndexedEntry],
    parents: &HashMap<OutlineId, OutlineId>,
    current_page: usize,
) -> ActiveOutline {
    let mut active_id = None;
    for entry in flat {
        let Some(page_number) = entry.page_number else {
            continue;
        };
        if page_number > current_page {
            break;
        }
        active_id = Some(&entry.id);
    }

    let mut active_ids = BTreeSet::new();
    let mut cursor = active_id;
    while let Some(id) = cursor {
        // Guards against a malformed parent map that loops.
        if !active_ids.insert(id.clone()) {
            break;
        }
        cursor = parents.get(id);
    }

    ActiveOutline {
        active_id: active_id.cloned(),
        active_ids,
    }
}
