use std::collections::HashMap;
use std::fmt;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OutlineConfig;
use crate::destination::{resolve_page_number, Destination};
use crate::DocumentEngine;

pub const UNTITLED_TITLE: &str = "Untitled";

const ID_SEPARATOR: char = '-';

/// Outline node exactly as the document engine reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutlineNode {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub dest: Option<Destination>,
    #[serde(default, alias = "items")]
    pub children: Vec<RawOutlineNode>,
}

/// Path-derived entry id: `"0-2-1"` is the second child of the third child
/// of the first root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutlineId(String);

impl OutlineId {
    pub fn from_path(path: &[usize]) -> Self {
        let mut id = String::new();
        for (depth, index) in path.iter().enumerate() {
            if depth > 0 {
                id.push(ID_SEPARATOR);
            }
            id.push_str(&index.to_string());
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sibling indices from the root down, `None` for ids that were not
    /// produced by [`OutlineId::from_path`].
    pub fn path(&self) -> Option<Vec<usize>> {
        if self.0.is_empty() {
            return None;
        }
        self.0
            .split(ID_SEPARATOR)
            .map(|segment| segment.parse().ok())
            .collect()
    }
}

impl fmt::Display for OutlineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OutlineId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineEntry {
    pub id: OutlineId,
    pub title: String,
    pub dest: Option<Destination>,
    pub page_number: Option<usize>,
    pub items: Vec<OutlineEntry>,
}

/// Builds normalized entries for `nodes`, positioned under `path`.
pub async fn build_outline_entries(
    engine: &dyn DocumentEngine,
    nodes: &[RawOutlineNode],
    path: &[usize],
) -> Vec<OutlineEntry> {
    build_level(engine, nodes, path.to_vec(), UNTITLED_TITLE).await
}

// Siblings are joined in input order; completion order does not matter.
fn build_level<'a>(
    engine: &'a dyn DocumentEngine,
    nodes: &'a [RawOutlineNode],
    path: Vec<usize>,
    untitled: &'a str,
) -> BoxFuture<'a, Vec<OutlineEntry>> {
    async move {
        let pending = nodes.iter().enumerate().map(|(index, node)| {
            let mut node_path = path.clone();
            node_path.push(index);
            build_entry(engine, node, node_path, untitled)
        });
        join_all(pending).await
    }
    .boxed()
}

async fn build_entry<'a>(
    engine: &'a dyn DocumentEngine,
    node: &'a RawOutlineNode,
    path: Vec<usize>,
    untitled: &'a str,
) -> OutlineEntry {
    let id = OutlineId::from_path(&path);
    let (page_number, items) = futures::join!(
        resolve_page_number(engine, node.dest.as_ref(), None),
        build_level(engine, &node.children, path, untitled),
    );

    OutlineEntry {
        id,
        title: node
            .title
            .clone()
            .unwrap_or_else(|| untitled.to_owned()),
        dest: node.dest.clone(),
        page_number,
        items,
    }
}

/// Fetches and normalizes the document's outline.
///
/// A document without an outline, or whose outline cannot be read, gets an
/// empty one.
pub async fn load_outline(engine: &dyn DocumentEngine, config: &OutlineConfig) -> Outline {
    let raw = match engine.outline().await {
        Ok(Some(nodes)) => nodes,
        Ok(None) => {
            debug!(document = %engine.id(), "document has no outline");
            return Outline::empty();
        }
        Err(err) => {
            warn!(%err, document = %engine.id(), "failed to read document outline");
            return Outline::empty();
        }
    };

    let entries = build_level(engine, &raw, Vec::new(), &config.untitled_title).await;
    Outline::new(entries)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedEntry {
    pub id: OutlineId,
    pub title: String,
    pub page_number: Option<usize>,
    pub depth: usize,
}

/// Pre-order view of an outline tree plus its child to parent links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlineIndex {
    flat: Vec<IndexedEntry>,
    parents: HashMap<OutlineId, OutlineId>,
}

impl OutlineIndex {
    pub fn build(entries: &[OutlineEntry]) -> Self {
        let mut index = Self::default();
        index.walk(entries, None, 0);
        index
    }

    fn walk(&mut self, entries: &[OutlineEntry], parent: Option<&OutlineId>, depth: usize) {
        for entry in entries {
            self.flat.push(IndexedEntry {
                id: entry.id.clone(),
                title: entry.title.clone(),
                page_number: entry.page_number,
                depth,
            });
            if let Some(parent) = parent {
                self.parents.insert(entry.id.clone(), parent.clone());
            }
            self.walk(&entry.items, Some(&entry.id), depth + 1);
        }
    }

    pub fn flat(&self) -> &[IndexedEntry] {
        &self.flat
    }

    pub fn parents(&self) -> &HashMap<OutlineId, OutlineId> {
        &self.parents
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }
}

/// A normalized outline tree together with its index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outline {
    entries: Vec<OutlineEntry>,
    index: OutlineIndex,
}

impl Outline {
    pub fn new(entries: Vec<OutlineEntry>) -> Self {
        let index = OutlineIndex::build(&entries);
        Self { entries, index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[OutlineEntry] {
        &self.entries
    }

    pub fn index(&self) -> &OutlineIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &OutlineId) -> Option<&OutlineEntry> {
        let path = id.path()?;
        let (first, rest) = path.split_first()?;
        let mut entry = self.entries.get(*first)?;
        for index in rest {
            entry = entry.items.get(*index)?;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{node, xyz, FakeEngine};

    fn count(nodes: &[RawOutlineNode]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.children)).sum()
    }

    fn raw_depth(nodes: &[RawOutlineNode]) -> usize {
        nodes.iter().map(|n| 1 + raw_depth(&n.children)).max().unwrap_or(0)
    }

    fn entry_depth(entries: &[OutlineEntry]) -> usize {
        entries
            .iter()
            .map(|e| 1 + entry_depth(&e.items))
            .max()
            .unwrap_or(0)
    }

    fn sample(engine: &FakeEngine) -> Vec<RawOutlineNode> {
        vec![
            node(
                "Part I",
                Some(xyz(engine.page_ref(0), 792.0)),
                vec![
                    node("Chapter 1", Some(xyz(engine.page_ref(0), 400.0)), vec![]),
                    node(
                        "Chapter 2",
                        Some(xyz(engine.page_ref(2), 700.0)),
                        vec![node(
                            "Section 2.1",
                            Some(xyz(engine.page_ref(3), 300.0)),
                            vec![],
                        )],
                    ),
                ],
            ),
            RawOutlineNode {
                title: None,
                dest: Some(xyz(engine.page_ref(5), 792.0)),
                children: vec![],
            },
            node("Appendix", None, vec![]),
        ]
    }

    #[tokio::test]
    async fn normalized_tree_keeps_shape_and_order() {
        let engine = FakeEngine::with_pages(8);
        let raw = sample(&engine);
        let entries = build_outline_entries(&engine, &raw, &[]).await;

        assert_eq!(Outline::new(entries.clone()).index().len(), count(&raw));
        assert_eq!(entry_depth(&entries), raw_depth(&raw));

        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Part I", "Untitled", "Appendix"]);
        let chapters: Vec<_> = entries[0].items.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(chapters, ["Chapter 1", "Chapter 2"]);

        assert_eq!(entries[0].page_number, Some(1));
        assert_eq!(entries[0].items[1].page_number, Some(3));
        assert_eq!(entries[0].items[1].items[0].page_number, Some(4));
        assert_eq!(entries[1].page_number, Some(6));
        assert_eq!(entries[2].page_number, None);
    }

    #[tokio::test]
    async fn ids_extend_parent_path_and_are_stable() {
        let engine = FakeEngine::with_pages(8);
        let raw = sample(&engine);
        let first = build_outline_entries(&engine, &raw, &[]).await;
        let second = build_outline_entries(&engine, &raw, &[]).await;

        let ids = |entries: &[OutlineEntry]| {
            OutlineIndex::build(entries)
                .flat()
                .iter()
                .map(|e| e.id.as_str().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ["0", "0-0", "0-1", "0-1-0", "1", "2"]);
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn path_prefix_is_applied_to_ids() {
        let engine = FakeEngine::with_pages(2);
        let raw = vec![node("Nested", None, vec![node("Leaf", None, vec![])])];
        let entries = build_outline_entries(&engine, &raw, &[4, 1]).await;
        assert_eq!(entries[0].id.as_str(), "4-1-0");
        assert_eq!(entries[0].items[0].id.as_str(), "4-1-0-0");
    }

    #[tokio::test]
    async fn slow_siblings_do_not_reorder_output() {
        let mut engine = FakeEngine::with_pages(4);
        engine.slow_reference(engine.page_ref(0), 8);
        let raw = vec![
            node("First", Some(xyz(engine.page_ref(0), 0.0)), vec![]),
            node("Second", Some(xyz(engine.page_ref(1), 0.0)), vec![]),
            node("Third", Some(xyz(engine.page_ref(2), 0.0)), vec![]),
        ];

        let entries = build_outline_entries(&engine, &raw, &[]).await;

        let completed = engine.completed_lookups();
        assert_eq!(completed.last(), Some(&engine.page_ref(0)));
        let pages: Vec<_> = entries.iter().map(|e| e.page_number).collect();
        assert_eq!(pages, [Some(1), Some(2), Some(3)]);
        assert_eq!(entries[0].title, "First");
    }

    #[tokio::test]
    async fn missing_or_failing_outline_is_empty() {
        let engine = FakeEngine::with_pages(3);
        let outline = load_outline(&engine, &OutlineConfig::default()).await;
        assert!(outline.is_empty());
        assert!(outline.index().is_empty());

        let mut failing = FakeEngine::with_pages(3);
        failing.fail_outline();
        assert!(load_outline(&failing, &OutlineConfig::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn configured_placeholder_replaces_missing_titles() {
        let mut engine = FakeEngine::with_pages(1);
        engine.set_outline(Some(vec![RawOutlineNode::default()]));
        let config = OutlineConfig {
            untitled_title: "(no title)".into(),
        };
        let outline = load_outline(&engine, &config).await;
        assert_eq!(outline.entries()[0].title, "(no title)");
    }

    #[tokio::test]
    async fn index_is_preorder_with_parent_links() {
        let engine = FakeEngine::with_pages(8);
        let outline = Outline::new(build_outline_entries(&engine, &sample(&engine), &[]).await);
        let index = outline.index();

        let depths: Vec<_> = index.flat().iter().map(|e| e.depth).collect();
        assert_eq!(depths, [0, 1, 1, 2, 0, 0]);
        let parents = index.parents();
        assert_eq!(parents.get(&OutlineId::from("0-1-0")), Some(&OutlineId::from("0-1")));
        assert_eq!(parents.get(&OutlineId::from("0-1")), Some(&OutlineId::from("0")));
        assert_eq!(parents.get(&OutlineId::from("0")), None);
        assert_eq!(index.parents().len(), 3);
    }

    #[tokio::test]
    async fn entries_are_found_by_id() {
        let engine = FakeEngine::with_pages(8);
        let outline = Outline::new(build_outline_entries(&engine, &sample(&engine), &[]).await);

        assert_eq!(outline.get(&"0-1-0".into()).unwrap().title, "Section 2.1");
        assert_eq!(outline.get(&"2".into()).unwrap().title, "Appendix");
        assert!(outline.get(&"0-5".into()).is_none());
        assert!(outline.get(&"bogus".into()).is_none());
        assert!(outline.get(&"".into()).is_none());
    }

    #[test]
    fn raw_nodes_accept_engine_item_lists() {
        let raw: Vec<RawOutlineNode> = serde_json::from_str(
            r#"[{"title": "Intro", "dest": "intro", "items": [{"title": "Scope"}]}]"#,
        )
        .unwrap();
        assert_eq!(raw[0].dest, Some(Destination::Named("intro".into())));
        assert_eq!(raw[0].children[0].title.as_deref(), Some("Scope"));
        assert!(raw[0].children[0].children.is_empty());
    }
}
