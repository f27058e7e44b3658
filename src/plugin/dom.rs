//! DOM handle table
//!
//! Parsed HTML documents stay on the Rust side of the bridge. Scripts only ever
//! see opaque string handles:
//!
//! - `g<generation>:d<doc>` for a document
//! - `g<generation>:e<doc>:<node>` for an element
//!
//! Every execution gets its own arena with a fresh generation, so a handle
//! leaked from one execution resolves to nothing in any other.

use ego_tree::NodeId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Returned by `attr` when the attribute (or the element) does not exist
pub const ATTR_ABSENT: &str = "__UNDEFINED__";

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn contains_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#":contains\(\s*(?:"([^"]*)"|'([^']*)'|([^)]*?))\s*\)"#).expect("valid :contains pattern")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handle {
    Document { doc: usize },
    Element { doc: usize, node: usize },
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    Document(&'a Html),
    Element(ElementRef<'a>),
}

/// A parsed document with its node ordinal index, built once at load
struct Document {
    html: Html,
    nodes: Vec<NodeId>,
    ordinals: HashMap<NodeId, usize>,
}

impl Document {
    fn parse(source: &str) -> Self {
        let html = Html::parse_document(source);
        let nodes: Vec<NodeId> = html.tree.nodes().map(|node| node.id()).collect();
        let ordinals = nodes.iter().enumerate().map(|(ordinal, id)| (*id, ordinal)).collect();
        Self { html, nodes, ordinals }
    }

    fn element(&self, ordinal: usize) -> Option<ElementRef<'_>> {
        let id = *self.nodes.get(ordinal)?;
        ElementRef::wrap(self.html.tree.get(id)?)
    }
}

/// Per-execution arena of parsed documents
pub struct DomArena {
    generation: u64,
    documents: Vec<Document>,
}

impl DomArena {
    pub fn new() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            documents: Vec::new(),
        }
    }

    /// Drop every document and invalidate all previously issued handles
    pub fn reset(&mut self) {
        self.documents.clear();
        self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Parse a document and return its handle
    pub fn load(&mut self, html: &str) -> String {
        self.documents.push(Document::parse(html));
        self.document_handle(self.documents.len() - 1)
    }

    /// Select matching elements beneath one handle
    pub fn select(&self, handle: &str, selector: &str) -> Vec<String> {
        self.find(&[handle.to_string()], selector)
    }

    /// Select matching elements beneath every handle, in document order without duplicates
    pub fn find(&self, handles: &[String], selector: &str) -> Vec<String> {
        let mut per_doc: HashMap<usize, Vec<ElementRef<'_>>> = HashMap::new();
        for handle in handles {
            let Some((doc, scope)) = self.scope(handle) else {
                continue;
            };
            per_doc
                .entry(doc)
                .or_default()
                .extend(select_list(scope, selector));
        }

        let mut docs: Vec<usize> = per_doc.keys().copied().collect();
        docs.sort_unstable();
        docs.into_iter()
            .flat_map(|doc| {
                let elements = per_doc.remove(&doc).unwrap_or_default();
                self.element_handles(doc, elements)
            })
            .collect()
    }

    /// Combined text content of all handles
    pub fn text(&self, handles: &[String]) -> String {
        handles
            .iter()
            .filter_map(|h| self.scope(h))
            .map(|(_, scope)| match scope {
                Scope::Document(doc) => doc.root_element().text().collect::<String>(),
                Scope::Element(el) => el.text().collect::<String>(),
            })
            .collect()
    }

    /// Inner HTML of the first handle (whole document for a document handle)
    pub fn html(&self, handles: &[String]) -> String {
        match handles.iter().find_map(|h| self.scope(h)) {
            Some((_, Scope::Document(doc))) => doc.html(),
            Some((_, Scope::Element(el))) => el.inner_html(),
            None => String::new(),
        }
    }

    /// Outer HTML of the first handle
    pub fn outer_html(&self, handles: &[String]) -> String {
        match handles.iter().find_map(|h| self.scope(h)) {
            Some((_, Scope::Document(doc))) => doc.html(),
            Some((_, Scope::Element(el))) => el.html(),
            None => String::new(),
        }
    }

    /// Attribute value, or [`ATTR_ABSENT`]
    pub fn attr(&self, handle: &str, name: &str) -> String {
        match self.scope(handle) {
            Some((_, Scope::Element(el))) => el
                .value()
                .attr(name)
                .map(str::to_string)
                .unwrap_or_else(|| ATTR_ABSENT.to_string()),
            _ => ATTR_ABSENT.to_string(),
        }
    }

    /// Next element sibling
    pub fn next(&self, handle: &str) -> Option<String> {
        let (doc, el) = self.element(handle)?;
        let sibling = el.next_siblings().find_map(ElementRef::wrap)?;
        self.element_handles(doc, vec![sibling]).pop()
    }

    /// Previous element sibling
    pub fn prev(&self, handle: &str) -> Option<String> {
        let (doc, el) = self.element(handle)?;
        let sibling = el.prev_siblings().find_map(ElementRef::wrap)?;
        self.element_handles(doc, vec![sibling]).pop()
    }

    /// Parent element
    pub fn parent(&self, handle: &str) -> Option<String> {
        let (doc, el) = self.element(handle)?;
        let parent = el.parent().and_then(ElementRef::wrap)?;
        self.element_handles(doc, vec![parent]).pop()
    }

    /// Child elements
    pub fn children(&self, handle: &str) -> Vec<String> {
        match self.scope(handle) {
            Some((doc, Scope::Element(el))) => {
                self.element_handles(doc, el.children().filter_map(ElementRef::wrap).collect())
            }
            Some((doc, Scope::Document(html))) => self.element_handles(doc, vec![html.root_element()]),
            None => Vec::new(),
        }
    }

    fn document_handle(&self, doc: usize) -> String {
        format!("g{}:d{}", self.generation, doc)
    }

    fn element_handles(&self, doc: usize, elements: Vec<ElementRef<'_>>) -> Vec<String> {
        if elements.is_empty() {
            return Vec::new();
        }
        let Some(document) = self.documents.get(doc) else {
            return Vec::new();
        };

        let mut ordinals: Vec<usize> = elements
            .iter()
            .filter_map(|el| document.ordinals.get(&el.id()).copied())
            .collect();
        ordinals.sort_unstable();
        ordinals.dedup();

        ordinals
            .into_iter()
            .map(|node| format!("g{}:e{}:{}", self.generation, doc, node))
            .collect()
    }

    fn parse_handle(&self, handle: &str) -> Option<Handle> {
        let rest = handle.strip_prefix('g')?;
        let (generation, body) = rest.split_once(':')?;
        if generation.parse::<u64>().ok()? != self.generation {
            return None;
        }

        if let Some(doc) = body.strip_prefix('d') {
            return Some(Handle::Document { doc: doc.parse().ok()? });
        }
        let (doc, node) = body.strip_prefix('e')?.split_once(':')?;
        Some(Handle::Element {
            doc: doc.parse().ok()?,
            node: node.parse().ok()?,
        })
    }

    fn scope(&self, handle: &str) -> Option<(usize, Scope<'_>)> {
        match self.parse_handle(handle)? {
            Handle::Document { doc } => Some((doc, Scope::Document(&self.documents.get(doc)?.html))),
            Handle::Element { doc, node } => Some((doc, Scope::Element(self.documents.get(doc)?.element(node)?))),
        }
    }

    fn element(&self, handle: &str) -> Option<(usize, ElementRef<'_>)> {
        match self.scope(handle)? {
            (doc, Scope::Element(el)) => Some((doc, el)),
            _ => None,
        }
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a comma separated selector list
fn select_list<'a>(scope: Scope<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    split_top_level(selector)
        .into_iter()
        .flat_map(|part| select_part(scope, part.trim()))
        .collect()
}

/// Evaluate one complex selector.
///
/// Selectors without `:contains` go straight to the native engine. Otherwise
/// the selector is split into compounds and combinators and walked left to
/// right, each compound checked with [`Selector::matches`] plus its
/// case-insensitive text needles.
fn select_part<'a>(scope: Scope<'a>, part: &str) -> Vec<ElementRef<'a>> {
    if part.is_empty() {
        return Vec::new();
    }
    if !contains_pattern().is_match(part) {
        return select_native(scope, part);
    }

    let (compounds, combinators) = split_compounds(part);
    let mut steps = compounds.into_iter().map(Compound::parse);
    let Some(Some(first)) = steps.next() else {
        return Vec::new();
    };

    let mut current: Vec<ElementRef<'a>> = descendants(scope).filter(|el| first.matches(el)).collect();
    for (combinator, step) in combinators.into_iter().zip(steps) {
        let Some(step) = step else {
            return Vec::new();
        };
        current = current
            .into_iter()
            .flat_map(|el| related(el, combinator))
            .filter(|el| step.matches(el))
            .collect();
    }
    current
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

/// One compound selector: native part plus `:contains` needles (lowercased)
struct Compound {
    selector: Selector,
    needles: Vec<String>,
}

impl Compound {
    fn parse(compound: &str) -> Option<Self> {
        let mut native = String::new();
        let mut needles = Vec::new();
        let mut last = 0;
        for caps in contains_pattern().captures_iter(compound) {
            let whole = caps.get(0)?;
            native.push_str(&compound[last..whole.start()]);
            needles.push(
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str().to_lowercase())
                    .unwrap_or_default(),
            );
            last = whole.end();
        }
        native.push_str(&compound[last..]);

        // Suffix-only compounds (".x", "[href]", ":not(.y)") apply to any element
        if !native.starts_with(|c: char| c.is_alphanumeric() || c == '*' || c == '_' || c == '-') {
            native.insert(0, '*');
        }
        let selector = Selector::parse(&native).ok()?;
        Some(Self { selector, needles })
    }

    fn matches(&self, el: &ElementRef<'_>) -> bool {
        if !self.selector.matches(el) {
            return false;
        }
        if self.needles.is_empty() {
            return true;
        }
        let text = el.text().collect::<String>().to_lowercase();
        self.needles.iter().all(|needle| text.contains(needle.as_str()))
    }
}

/// Split a complex selector into compounds and the combinators between them
fn split_compounds(part: &str) -> (Vec<&str>, Vec<Combinator>) {
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut start: Option<usize> = None;
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, c) in part.char_indices() {
        let top = quote.is_none() && depth == 0;
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth -= 1,
            _ => {}
        }

        if top && (c.is_whitespace() || matches!(c, '>' | '+' | '~')) {
            if let Some(s) = start.take() {
                compounds.push(&part[s..i]);
                pending = Some(Combinator::Descendant);
            }
            match c {
                '>' => pending = Some(Combinator::Child),
                '+' => pending = Some(Combinator::Adjacent),
                '~' => pending = Some(Combinator::Sibling),
                _ => {}
            }
            continue;
        }

        if start.is_none() {
            if !compounds.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }
            start = Some(i);
        }
    }
    if let Some(s) = start {
        compounds.push(&part[s..]);
    }
    (compounds, combinators)
}

/// Elements strictly beneath the scope
fn descendants<'a>(scope: Scope<'a>) -> Box<dyn Iterator<Item = ElementRef<'a>> + 'a> {
    match scope {
        Scope::Document(doc) => Box::new(doc.tree.root().descendants().filter_map(ElementRef::wrap)),
        Scope::Element(el) => Box::new(el.descendants().skip(1).filter_map(ElementRef::wrap)),
    }
}

fn related<'a>(el: ElementRef<'a>, combinator: Combinator) -> Box<dyn Iterator<Item = ElementRef<'a>> + 'a> {
    match combinator {
        Combinator::Descendant => descendants(Scope::Element(el)),
        Combinator::Child => Box::new(el.children().filter_map(ElementRef::wrap)),
        Combinator::Adjacent => Box::new(el.next_siblings().find_map(ElementRef::wrap).into_iter()),
        Combinator::Sibling => Box::new(el.next_siblings().filter_map(ElementRef::wrap)),
    }
}

fn select_native<'a>(scope: Scope<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    let Ok(parsed) = Selector::parse(selector) else {
        return Vec::new();
    };
    match scope {
        Scope::Document(doc) => doc.select(&parsed).collect(),
        Scope::Element(el) => el.select(&parsed).filter(|found| found.id() != el.id()).collect(),
    }
}

/// Split a selector list on commas that are not inside quotes, parentheses or brackets
fn split_top_level(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in selector.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&selector[start..]);
    parts
}
