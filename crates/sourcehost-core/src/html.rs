//! The `html` import's backend: CSS selection and traversal over parsed
//! documents (spec.md §4.6).
//!
//! Nodes have upward references (child -> parent), which `scraper`/`ego_tree`
//! model as an arena: every node is an index into a document-owned tree, not
//! a shared-ownership pointer (spec.md §9 "Cyclic references"). We carry
//! that straight through: a [`HtmlDocument`] owns the parsed tree, and a
//! [`NodeHandle`] is `(document, node id, optional pre-selected set)`.

use std::sync::Arc;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum HtmlError {
    #[error("invalid descriptor")]
    InvalidDescriptor,
    #[error("invalid string")]
    InvalidString,
    #[error("invalid HTML")]
    InvalidHtml,
    #[error("invalid CSS query")]
    InvalidQuery,
    #[error("no result")]
    NoResult,
    #[error("backend error: {0}")]
    BackendError(String),
}

impl From<HtmlError> for i32 {
    fn from(err: HtmlError) -> i32 {
        match err {
            HtmlError::InvalidDescriptor => -1,
            HtmlError::InvalidString => -2,
            HtmlError::InvalidHtml => -3,
            HtmlError::InvalidQuery => -4,
            HtmlError::NoResult => -5,
            HtmlError::BackendError(_) => -6,
        }
    }
}

/// A parsed document, owned once and shared cheaply (`Arc`) across every
/// node handle and node-set it produces.
#[derive(Clone)]
pub struct HtmlDocument {
    html: Arc<Html>,
    base_url: Option<Url>,
}

impl HtmlDocument {
    pub fn parse(input: &str, base_url: Option<&str>) -> Self {
        Self { html: Arc::new(Html::parse_document(input)), base_url: base_url.and_then(|u| Url::parse(u).ok()) }
    }

    pub fn parse_fragment(input: &str, base_url: Option<&str>) -> Self {
        Self { html: Arc::new(Html::parse_fragment(input)), base_url: base_url.and_then(|u| Url::parse(u).ok()) }
    }

    pub fn root_id(&self) -> NodeId {
        self.html.tree.root().id()
    }

    fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        ElementRef::wrap(self.html.tree.get(id)?)
    }

    /// Run a CSS selector over the whole document, applying the historical
    /// `[*]`/`:not([*])` wildcard rewrite spec.md §4.6 calls out.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeId>, HtmlError> {
        self.select_within(self.root_id(), selector)
    }

    /// Run a CSS selector rooted at `within`, matching only descendants.
    pub fn select_within(&self, within: NodeId, selector: &str) -> Result<Vec<NodeId>, HtmlError> {
        let (rewritten, filter) = rewrite_wildcard_selector(selector);
        let parsed = Selector::parse(&rewritten).map_err(|_| HtmlError::InvalidQuery)?;
        let root = self.element(within).ok_or(HtmlError::InvalidDescriptor)?;
        let mut out = Vec::new();
        for el in root.select(&parsed) {
            if within == self.root_id() || el.id() != within {
                if filter.matches(&el) {
                    out.push(el.id());
                }
            }
        }
        Ok(out)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        let el = self.element(id)?;
        if let Some(stripped) = name.strip_prefix("abs:") {
            let value = el.value().attr(stripped)?;
            return self.resolve_url(value);
        }
        el.value().attr(name).map(|s| s.to_string())
    }

    fn resolve_url(&self, value: &str) -> Option<String> {
        match &self.base_url {
            Some(base) => base.join(value).ok().map(|u| u.to_string()),
            None => Url::parse(value).ok().map(|u| u.to_string()).or_else(|| Some(value.to_string())),
        }
    }

    pub fn text(&self, id: NodeId) -> Option<String> {
        let el = self.element(id)?;
        let joined: String = el.text().collect::<Vec<_>>().join(" ");
        Some(joined.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn untrimmed_text(&self, id: NodeId) -> Option<String> {
        let el = self.element(id)?;
        Some(el.text().collect::<Vec<_>>().concat())
    }

    pub fn own_text(&self, id: NodeId) -> Option<String> {
        let node = self.html.tree.get(id)?;
        let mut out = String::new();
        for child in node.children() {
            if let scraper::Node::Text(text) = child.value() {
                out.push_str(text);
            }
        }
        Some(out.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn inner_html(&self, id: NodeId) -> Option<String> {
        let node = self.html.tree.get(id)?;
        let mut out = String::new();
        for child in node.children() {
            out.push_str(&render_node(child));
        }
        Some(out)
    }

    pub fn outer_html(&self, id: NodeId) -> Option<String> {
        let node = self.html.tree.get(id)?;
        Some(render_node(node))
    }

    pub fn data(&self, id: NodeId) -> Option<String> {
        let node = self.html.tree.get(id)?;
        match node.value() {
            scraper::Node::Text(text) => Some(text.to_string()),
            scraper::Node::Comment(comment) => Some(comment.to_string()),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        Some(self.element(id)?.value().name().to_string())
    }

    pub fn class_name(&self, id: NodeId) -> Option<String> {
        let el = self.element(id)?;
        Some(el.value().classes().collect::<Vec<_>>().join(" "))
    }

    pub fn id_attr(&self, id: NodeId) -> Option<String> {
        self.element(id)?.value().id().map(|s| s.to_string())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).map(|el| el.value().has_class(class, scraper::CaseSensitivity::CaseSensitive)).unwrap_or(false)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.element(id).map(|el| el.value().attr(name).is_some()).unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.html.tree.get(id)?;
        let mut ancestor = node.parent();
        while let Some(candidate) = ancestor {
            if ElementRef::wrap(candidate).is_some() {
                return Some(candidate.id());
            }
            ancestor = candidate.parent();
        }
        None
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.html.tree.get(id) else { return Vec::new() };
        node.children().filter(|c| ElementRef::wrap(*c).is_some()).map(|c| c.id()).collect()
    }

    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else { return Vec::new() };
        self.children(parent).into_iter().filter(|&sibling| sibling != id).collect()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.html.tree.get(id)?;
        let mut next = node.next_sibling();
        while let Some(candidate) = next {
            if ElementRef::wrap(candidate).is_some() {
                return Some(candidate.id());
            }
            next = candidate.next_sibling();
        }
        None
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.html.tree.get(id)?;
        let mut prev = node.prev_sibling();
        while let Some(candidate) = prev {
            if ElementRef::wrap(candidate).is_some() {
                return Some(candidate.id());
            }
            prev = candidate.prev_sibling();
        }
        None
    }

    /// Replaces every child of `id` with a single text node (§4.6 `set_text`).
    pub fn set_text(&mut self, id: NodeId, text: &str) -> bool {
        let Some(tree) = Arc::get_mut(&mut self.html).map(|h| &mut h.tree) else { return false };
        if tree.get(id).is_none() {
            return false;
        }
        detach_children(tree, id);
        let Some(mut node) = tree.get_mut(id) else { return false };
        node.append(scraper::Node::Text(scraper::node::Text { text: text.into() }));
        true
    }

    /// Replaces every child of `id` with the parsed fragment `html` (§4.6
    /// `set_html`).
    pub fn set_html(&mut self, id: NodeId, html: &str) -> bool {
        let fragment = Html::parse_fragment(html);
        let Some(tree) = Arc::get_mut(&mut self.html).map(|h| &mut h.tree) else { return false };
        if tree.get(id).is_none() {
            return false;
        }
        detach_children(tree, id);
        append_fragment_children(tree, id, &fragment);
        true
    }

    /// Inserts the parsed fragment `html` before `id`'s existing children
    /// (§4.6 `prepend`).
    pub fn prepend(&mut self, id: NodeId, html: &str) -> bool {
        let fragment = Html::parse_fragment(html);
        let Some(tree) = Arc::get_mut(&mut self.html).map(|h| &mut h.tree) else { return false };
        if tree.get(id).is_none() {
            return false;
        }
        prepend_fragment_children(tree, id, &fragment);
        true
    }

    /// Appends the parsed fragment `html` after `id`'s existing children
    /// (§4.6 `append`).
    pub fn append(&mut self, id: NodeId, html: &str) -> bool {
        let fragment = Html::parse_fragment(html);
        let Some(tree) = Arc::get_mut(&mut self.html).map(|h| &mut h.tree) else { return false };
        if tree.get(id).is_none() {
            return false;
        }
        append_fragment_children(tree, id, &fragment);
        true
    }
}

fn detach_children(tree: &mut ego_tree::Tree<scraper::Node>, parent: NodeId) {
    let child_ids: Vec<NodeId> = match tree.get(parent) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };
    for child_id in child_ids {
        if let Some(mut child) = tree.get_mut(child_id) {
            child.detach();
        }
    }
}

fn copy_subtree(dest: &mut ego_tree::NodeMut<'_, scraper::Node>, src: ego_tree::NodeRef<'_, scraper::Node>) {
    let mut dest_child = dest.append(src.value().clone());
    for child in src.children() {
        copy_subtree(&mut dest_child, child);
    }
}

fn append_fragment_children(tree: &mut ego_tree::Tree<scraper::Node>, parent: NodeId, fragment: &Html) {
    let roots: Vec<_> = fragment.tree.root().children().collect();
    for src_child in roots {
        let Some(mut dest) = tree.get_mut(parent) else { return };
        copy_subtree(&mut dest, src_child);
    }
}

fn prepend_fragment_children(tree: &mut ego_tree::Tree<scraper::Node>, parent: NodeId, fragment: &Html) {
    let roots: Vec<_> = fragment.tree.root().children().collect();
    let anchor = tree.get(parent).and_then(|n| n.first_child()).map(|c| c.id());
    match anchor {
        None => append_fragment_children(tree, parent, fragment),
        Some(anchor_id) => {
            for src_child in roots {
                let Some(mut anchor_node) = tree.get_mut(anchor_id) else { return };
                let mut dest_child = anchor_node.insert_before(src_child.value().clone());
                for grandchild in src_child.children() {
                    copy_subtree(&mut dest_child, grandchild);
                }
            }
        }
    }
}

fn render_node(node: ego_tree::NodeRef<'_, scraper::Node>) -> String {
    if let Some(el) = ElementRef::wrap(node) {
        return el.html();
    }
    match node.value() {
        scraper::Node::Text(text) => escape_text(text),
        scraper::Node::Comment(comment) => format!("<!--{comment}-->"),
        _ => String::new(),
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// A set of nodes selected together, e.g. from `select()`; also doubles as
/// the single-node wrapper `select_first` and `parse` produce (a set of one).
#[derive(Clone)]
pub struct NodeSet {
    pub document: HtmlDocument,
    pub nodes: Vec<NodeId>,
}

impl NodeSet {
    pub fn single(document: HtmlDocument, id: NodeId) -> Self {
        Self { document, nodes: vec![id] }
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }
}

/// Historical wildcard selector rewrite (spec.md §4.6): `[*]` and
/// `:not([*])` aren't valid CSS, so they're stripped from the selector
/// before parsing and re-applied as a post-filter on whether the matched
/// element carries any attributes at all.
enum WildcardFilter {
    None,
    HasAnyAttr,
    HasNoAttr,
}

impl WildcardFilter {
    fn matches(&self, el: &ElementRef<'_>) -> bool {
        match self {
            WildcardFilter::None => true,
            WildcardFilter::HasAnyAttr => el.value().attrs().next().is_some(),
            WildcardFilter::HasNoAttr => el.value().attrs().next().is_none(),
        }
    }
}

fn rewrite_wildcard_selector(selector: &str) -> (String, WildcardFilter) {
    if let Some(rewritten) = selector.strip_suffix(":not([*])") {
        return (rewritten.to_string(), WildcardFilter::HasNoAttr);
    }
    if let Some(rewritten) = selector.strip_suffix("[*]") {
        return (rewritten.to_string(), WildcardFilter::HasAnyAttr);
    }
    (selector.to_string(), WildcardFilter::None)
}
