use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfnav_core::{
    document_id_for_path, ephemeral_document_id, DestElement, Destination, DocumentEngine,
    DocumentId, DocumentProvider, EngineError, EngineResult, PageRef, RawOutlineNode, Viewport,
};
use tracing::{debug, instrument, warn};

const MAX_OUTLINE_DEPTH: usize = 64;
const MAX_NAME_TREE_DEPTH: usize = 32;
const MAX_PAGE_TREE_DEPTH: usize = 32;
/// US Letter, used when a page tree carries no MediaBox at all.
const DEFAULT_MEDIA_BOX: (f64, f64) = (612.0, 792.0);

/// Document engine backed by `lopdf`.
///
/// Everything the navigation core asks for is extracted once when the
/// document is opened; the parsed `lopdf::Document` is not kept around.
#[derive(Debug)]
pub struct LopdfEngine {
    id: DocumentId,
    path: Option<PathBuf>,
    outline: Option<Vec<RawOutlineNode>>,
    names: HashMap<String, Destination>,
    pages: HashMap<PageRef, usize>,
    viewports: Vec<Viewport>,
}

impl LopdfEngine {
    #[instrument]
    pub async fn open(path: &Path) -> Result<Self> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        tokio::task::spawn_blocking(move || {
            let document = Document::load(&absolute)
                .with_context(|| format!("failed to open {:?}", absolute))?;
            let mut engine = Self::from_document(&document, document_id_for_path(&absolute));
            engine.path = Some(absolute);
            Ok(engine)
        })
        .await
        .map_err(|err| anyhow!("document loader task failed: {err}"))?
    }

    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        let document = Document::load_mem(bytes).context("failed to parse PDF bytes")?;
        Ok(Self::from_document(&document, ephemeral_document_id()))
    }

    pub fn from_document(document: &Document, id: DocumentId) -> Self {
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        let pages = page_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (page_ref(*id), index))
            .collect();
        let viewports = page_ids
            .iter()
            .map(|id| page_viewport(document, *id))
            .collect();

        let engine = Self {
            id,
            path: None,
            outline: extract_outline(document),
            names: extract_named_destinations(document),
            pages,
            viewports,
        };
        debug!(
            document = %engine.id,
            pages = engine.viewports.len(),
            names = engine.names.len(),
            has_outline = engine.outline.is_some(),
            "indexed PDF document"
        );
        engine
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl DocumentEngine for LopdfEngine {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn page_count(&self) -> usize {
        self.viewports.len()
    }

    async fn outline(&self) -> EngineResult<Option<Vec<RawOutlineNode>>> {
        Ok(self.outline.clone())
    }

    async fn destination(&self, name: &str) -> EngineResult<Option<Destination>> {
        Ok(self.names.get(name).cloned())
    }

    async fn page_index(&self, reference: &PageRef) -> EngineResult<usize> {
        self.pages
            .get(reference)
            .copied()
            .ok_or(EngineError::UnknownPageReference(*reference))
    }

    async fn page_viewport(&self, page_number: usize) -> EngineResult<Viewport> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.viewports.get(index))
            .copied()
            .ok_or(EngineError::PageOutOfRange {
                page: page_number,
                page_count: self.viewports.len(),
            })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfProvider;

#[async_trait]
impl DocumentProvider for LopdfProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentEngine>> {
        Ok(Arc::new(LopdfEngine::open(path).await?))
    }
}

fn page_ref(id: ObjectId) -> PageRef {
    PageRef::new(id.0, id.1)
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolved_dict<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(document, object)?.as_dict().ok()
}

fn catalog(document: &Document) -> Option<&Dictionary> {
    resolved_dict(document, document.trailer.get(b"Root").ok()?)
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE or UTF-8 with a byte order mark,
/// unmarked UTF-8 with non-ASCII content, else PDFDocEncoding.
fn text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if !bytes.is_ascii() {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return text.to_owned();
        }
    }
    bytes.iter().map(|&b| pdf_doc_char(b)).collect()
}

/// PDFDocEncoding (ISO 32000-1, Annex D). Differs from Latin-1 in
/// 0x18..=0x1F, 0x80..=0x9F and 0xA0.
fn pdf_doc_char(code: u8) -> char {
    match code {
        0x18 => '\u{02D8}',
        0x19 => '\u{02C7}',
        0x1A => '\u{02C6}',
        0x1B => '\u{02D9}',
        0x1C => '\u{02DD}',
        0x1D => '\u{02DB}',
        0x1E => '\u{02DA}',
        0x1F => '\u{02DC}',
        0x80 => '\u{2022}',
        0x81 => '\u{2020}',
        0x82 => '\u{2021}',
        0x83 => '\u{2026}',
        0x84 => '\u{2014}',
        0x85 => '\u{2013}',
        0x86 => '\u{0192}',
        0x87 => '\u{2044}',
        0x88 => '\u{2039}',
        0x89 => '\u{203A}',
        0x8A => '\u{2212}',
        0x8B => '\u{2030}',
        0x8C => '\u{201E}',
        0x8D => '\u{201C}',
        0x8E => '\u{201D}',
        0x8F => '\u{2018}',
        0x90 => '\u{2019}',
        0x91 => '\u{201A}',
        0x92 => '\u{2122}',
        0x93 => '\u{FB01}',
        0x94 => '\u{FB02}',
        0x95 => '\u{0141}',
        0x96 => '\u{0152}',
        0x97 => '\u{0160}',
        0x98 => '\u{0178}',
        0x99 => '\u{017D}',
        0x9A => '\u{0131}',
        0x9B => '\u{0142}',
        0x9C => '\u{0153}',
        0x9D => '\u{0161}',
        0x9E => '\u{017E}',
        0x9F => '\u{FFFD}',
        0xA0 => '\u{20AC}',
        other => other as char,
    }
}

fn destination(document: &Document, object: &Object) -> Option<Destination> {
    match resolve(document, object)? {
        Object::Array(elements) => Some(Destination::Explicit(
            elements.iter().map(dest_element).collect(),
        )),
        Object::String(bytes, _) => Some(Destination::Named(text_string(bytes))),
        Object::Name(name) => Some(Destination::Named(
            String::from_utf8_lossy(name).into_owned(),
        )),
        // Name-tree values may wrap the array as `<< /D [...] >>`.
        Object::Dictionary(dict) => destination(document, dict.get(b"D").ok()?),
        _ => None,
    }
}

fn dest_element(object: &Object) -> DestElement {
    match object {
        Object::Reference(id) => DestElement::Ref(page_ref(*id)),
        Object::Name(name) => DestElement::Name(String::from_utf8_lossy(name).into_owned()),
        Object::Null => DestElement::Null,
        other => number(other)
            .map(DestElement::Number)
            .unwrap_or(DestElement::Other),
    }
}

fn outline_destination(document: &Document, item: &Dictionary) -> Option<Destination> {
    if let Ok(dest) = item.get(b"Dest") {
        return destination(document, dest);
    }
    let action = resolved_dict(document, item.get(b"A").ok()?)?;
    match action.get(b"S") {
        Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {
            destination(document, action.get(b"D").ok()?)
        }
        _ => None,
    }
}

fn extract_outline(document: &Document) -> Option<Vec<RawOutlineNode>> {
    let outlines = resolved_dict(document, catalog(document)?.get(b"Outlines").ok()?)?;
    let first = match outlines.get(b"First") {
        Ok(Object::Reference(id)) => *id,
        _ => return None,
    };
    let mut visited = HashSet::new();
    let nodes = collect_outline(document, first, 0, &mut visited);
    (!nodes.is_empty()).then_some(nodes)
}

fn collect_outline(
    document: &Document,
    first: ObjectId,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
) -> Vec<RawOutlineNode> {
    let mut nodes = Vec::new();
    if depth >= MAX_OUTLINE_DEPTH {
        warn!(depth, "outline nesting limit reached");
        return nodes;
    }

    let mut cursor = Some(first);
    while let Some(id) = cursor {
        if !visited.insert(id) {
            warn!(object = id.0, generation = id.1, "outline item visited twice");
            break;
        }
        let Ok(item) = document.get_dictionary(id) else {
            warn!(object = id.0, generation = id.1, "outline item is not a dictionary");
            break;
        };

        let title = item
            .get(b"Title")
            .ok()
            .and_then(|title| resolve(document, title))
            .and_then(|title| match title {
                Object::String(bytes, _) => Some(text_string(bytes)),
                _ => None,
            });
        let children = match item.get(b"First") {
            Ok(Object::Reference(child)) => collect_outline(document, *child, depth + 1, visited),
            _ => Vec::new(),
        };
        nodes.push(RawOutlineNode {
            title,
            dest: outline_destination(document, item),
            children,
        });

        cursor = match item.get(b"Next") {
            Ok(Object::Reference(next)) => Some(*next),
            _ => None,
        };
    }
    nodes
}

fn extract_named_destinations(document: &Document) -> HashMap<String, Destination> {
    let mut names = HashMap::new();
    let Some(catalog) = catalog(document) else {
        return names;
    };

    let tree = catalog
        .get(b"Names")
        .ok()
        .and_then(|names| resolved_dict(document, names))
        .and_then(|names| names.get(b"Dests").ok())
        .and_then(|dests| resolved_dict(document, dests));
    if let Some(tree) = tree {
        collect_name_tree(document, tree, 0, &mut names);
    }

    // PDF 1.1 style `/Dests` dictionary; the name tree wins on conflicts.
    if let Some(legacy) = catalog
        .get(b"Dests")
        .ok()
        .and_then(|dests| resolved_dict(document, dests))
    {
        for (key, value) in legacy.iter() {
            let name = String::from_utf8_lossy(key).into_owned();
            if let Some(dest) = destination(document, value) {
                names.entry(name).or_insert(dest);
            }
        }
    }
    names
}

fn collect_name_tree(
    document: &Document,
    node: &Dictionary,
    depth: usize,
    out: &mut HashMap<String, Destination>,
) {
    if depth >= MAX_NAME_TREE_DEPTH {
        warn!(depth, "name tree nesting limit reached");
        return;
    }

    if let Some(Object::Array(pairs)) = node.get(b"Names").ok().and_then(|n| resolve(document, n))
    {
        for pair in pairs.chunks_exact(2) {
            let key = match resolve(document, &pair[0]) {
                Some(Object::String(bytes, _)) => text_string(bytes),
                _ => continue,
            };
            if let Some(dest) = destination(document, &pair[1]) {
                out.insert(key, dest);
            }
        }
    }

    if let Some(Object::Array(kids)) = node.get(b"Kids").ok().and_then(|k| resolve(document, k)) {
        for kid in kids {
            if let Some(kid) = resolved_dict(document, kid) {
                collect_name_tree(document, kid, depth + 1, out);
            }
        }
    }
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
fn inherited<'a>(document: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(document, value);
        }
        node = resolved_dict(document, node.get(b"Parent").ok()?)?;
    }
    None
}

fn page_viewport(document: &Document, page_id: ObjectId) -> Viewport {
    let Ok(page) = document.get_dictionary(page_id) else {
        warn!(object = page_id.0, "page object is not a dictionary");
        return Viewport::unscaled(DEFAULT_MEDIA_BOX.0, DEFAULT_MEDIA_BOX.1);
    };

    let (width, height) = match inherited(document, page, b"MediaBox") {
        Some(Object::Array(bounds)) if bounds.len() == 4 => {
            let values: Option<Vec<f64>> = bounds
                .iter()
                .map(|value| resolve(document, value).and_then(number))
                .collect();
            match values.as_deref() {
                Some([x0, y0, x1, y1]) => ((x1 - x0).abs(), (y1 - y0).abs()),
                _ => DEFAULT_MEDIA_BOX,
            }
        }
        _ => DEFAULT_MEDIA_BOX,
    };

    let rotation = inherited(document, page, b"Rotate")
        .and_then(number)
        .map(|degrees| (degrees as i64).rem_euclid(360))
        .unwrap_or(0);
    if rotation == 90 || rotation == 270 {
        Viewport::unscaled(height, width)
    } else {
        Viewport::unscaled(width, height)
    }
}
