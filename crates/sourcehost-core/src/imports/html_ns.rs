//! The `html` import namespace: CSS selection, traversal, and the
//! historical `[*]` wildcard-attribute rewrite (spec.md §4.6).
//!
//! A document lives once in the resource table under `ResourceKind::
//! HtmlDocument`; every selection is a `ResourceKind::HtmlNodes` handle that
//! only stores the owning document's rid plus a list of `NodeId`s, so a
//! mutation (`set_text`, `append`, ...) always reaches the one live copy of
//! the tree rather than a cloned `Arc` with a stale strong count.

use ego_tree::NodeId;
use wasmtime::{Caller, Linker};

use crate::error::HostError;
use crate::html::{HtmlDocument, HtmlError};
use crate::memory;
use crate::resource_table::{ResourceKind, ResourcePayload, ResourceTable, Rid};
use crate::state::HostState;

struct NodeHandle {
    doc: Rid,
    nodes: Vec<NodeId>,
}

fn with_doc<R>(table: &ResourceTable, doc_rid: Rid, f: impl FnOnce(&HtmlDocument) -> R) -> Option<R> {
    table.with_payload::<HtmlDocument, _>(doc_rid, f)
}

fn allocate_set(table: &ResourceTable, doc: Rid, nodes: Vec<NodeId>) -> Rid {
    table.allocate(ResourcePayload::Opaque(Box::new(NodeHandle { doc, nodes })), ResourceKind::HtmlNodes)
}

fn first_node(table: &ResourceTable, rid: Rid) -> Option<(Rid, NodeId)> {
    table.with_payload::<NodeHandle, _>(rid, |h| h.nodes.first().map(|n| (h.doc, *n)))?
}

pub fn parse(table: &ResourceTable, html: &str, base_url: Option<&str>) -> Rid {
    table.allocate(ResourcePayload::Opaque(Box::new(HtmlDocument::parse(html, base_url))), ResourceKind::HtmlDocument)
}

pub fn parse_fragment(table: &ResourceTable, html: &str, base_url: Option<&str>) -> Rid {
    table.allocate(
        ResourcePayload::Opaque(Box::new(HtmlDocument::parse_fragment(html, base_url))),
        ResourceKind::HtmlDocument,
    )
}

pub fn select(table: &ResourceTable, rid: Rid, selector: &str) -> Result<Rid, i32> {
    match table.kind_of(rid) {
        Some(ResourceKind::HtmlDocument) => {
            let nodes = with_doc(table, rid, |d| d.select(selector)).ok_or(i32::from(HtmlError::InvalidDescriptor))?;
            let nodes = nodes.map_err(i32::from)?;
            Ok(allocate_set(table, rid, nodes))
        }
        Some(ResourceKind::HtmlNodes) => {
            let (doc, scope) = first_node(table, rid).ok_or(i32::from(HtmlError::NoResult))?;
            let nodes = with_doc(table, doc, |d| d.select_within(scope, selector)).ok_or(i32::from(HtmlError::InvalidDescriptor))?;
            let nodes = nodes.map_err(i32::from)?;
            Ok(allocate_set(table, doc, nodes))
        }
        _ => Err(i32::from(HtmlError::InvalidDescriptor)),
    }
}

/// `select` then immediately narrow to the first match, the way a plugin's
/// own `selectFirst` helper would otherwise re-implement by hand (spec.md
/// §4.6 `select_first`).
pub fn select_first(table: &ResourceTable, rid: Rid, selector: &str) -> Result<Rid, i32> {
    let set = select(table, rid, selector)?;
    let Some((doc, node)) = first_node(table, set) else {
        table.force_remove(set);
        return Err(i32::from(HtmlError::NoResult));
    };
    table.force_remove(set);
    Ok(allocate_set(table, doc, vec![node]))
}

pub fn size(table: &ResourceTable, rid: Rid) -> Option<i32> {
    table.with_payload::<NodeHandle, _>(rid, |h| h.nodes.len() as i32)
}

pub fn at(table: &ResourceTable, rid: Rid, index: i32) -> Option<Rid> {
    if index < 0 {
        return None;
    }
    let (doc, node) = table.with_payload::<NodeHandle, _>(rid, |h| {
        h.nodes.get(index as usize).map(|n| (h.doc, *n))
    })??;
    Some(allocate_set(table, doc, vec![node]))
}

pub fn first(table: &ResourceTable, rid: Rid) -> Option<Rid> {
    at(table, rid, 0)
}

pub fn last(table: &ResourceTable, rid: Rid) -> Option<Rid> {
    let len = size(table, rid)?;
    if len == 0 {
        return None;
    }
    at(table, rid, len - 1)
}

/// Convert a node set into an array of single-node descriptors (spec.md
/// §4.6 legacy `array`), one `Value::Int` rid per matched node so the
/// legacy ABI's generic-array iteration sees the same shape it always has.
pub fn array(table: &ResourceTable, rid: Rid) -> Option<Rid> {
    let (doc, nodes) = table.with_payload::<NodeHandle, _>(rid, |h| (h.doc, h.nodes.clone()))?;
    let items: Vec<i32> = nodes.into_iter().map(|n| allocate_set(table, doc, vec![n])).collect();
    let value = crate::value::Value::Array(items.into_iter().map(|rid| crate::value::Value::Int(rid as i64)).collect());
    Some(table.allocate(ResourcePayload::Value(value), ResourceKind::Value))
}

macro_rules! string_accessor {
    ($name:ident, $method:ident) => {
        pub fn $name(table: &ResourceTable, rid: Rid) -> Option<String> {
            let (doc, node) = first_node(table, rid)?;
            with_doc(table, doc, |d| d.$method(node))?
        }
    };
}

string_accessor!(text, text);
string_accessor!(untrimmed_text, untrimmed_text);
string_accessor!(own_text, own_text);
string_accessor!(inner_html, inner_html);
string_accessor!(outer_html, outer_html);
string_accessor!(data, data);
string_accessor!(tag_name, tag_name);
string_accessor!(class_name, class_name);
string_accessor!(id_attr, id_attr);

pub fn attr(table: &ResourceTable, rid: Rid, name: &str) -> Option<String> {
    let (doc, node) = first_node(table, rid)?;
    with_doc(table, doc, |d| d.attr(node, name))?
}

pub fn has_class(table: &ResourceTable, rid: Rid, class: &str) -> bool {
    first_node(table, rid).and_then(|(doc, node)| with_doc(table, doc, |d| d.has_class(node, class))).unwrap_or(false)
}

pub fn has_attr(table: &ResourceTable, rid: Rid, name: &str) -> bool {
    first_node(table, rid).and_then(|(doc, node)| with_doc(table, doc, |d| d.has_attr(node, name))).unwrap_or(false)
}

macro_rules! set_accessor {
    ($name:ident, $method:ident) => {
        pub fn $name(table: &ResourceTable, rid: Rid) -> Option<Rid> {
            let (doc, node) = first_node(table, rid)?;
            let related = with_doc(table, doc, |d| d.$method(node))?;
            related.map(|n| allocate_set(table, doc, vec![n]))
        }
    };
}

set_accessor!(parent, parent);
set_accessor!(next_sibling, next_sibling);
set_accessor!(previous_sibling, previous_sibling);

pub fn children(table: &ResourceTable, rid: Rid) -> Option<Rid> {
    let (doc, node) = first_node(table, rid)?;
    let nodes = with_doc(table, doc, |d| d.children(node))?;
    Some(allocate_set(table, doc, nodes))
}

pub fn siblings(table: &ResourceTable, rid: Rid) -> Option<Rid> {
    let (doc, node) = first_node(table, rid)?;
    let nodes = with_doc(table, doc, |d| d.siblings(node))?;
    Some(allocate_set(table, doc, nodes))
}

pub fn set_text(table: &ResourceTable, rid: Rid, text: &str) -> bool {
    let Some((doc, node)) = first_node(table, rid) else { return false };
    table.with_payload_mut::<HtmlDocument, _>(doc, |d| d.set_text(node, text)).unwrap_or(false)
}

pub fn set_html(table: &ResourceTable, rid: Rid, html: &str) -> bool {
    let Some((doc, node)) = first_node(table, rid) else { return false };
    table.with_payload_mut::<HtmlDocument, _>(doc, |d| d.set_html(node, html)).unwrap_or(false)
}

pub fn prepend(table: &ResourceTable, rid: Rid, html: &str) -> bool {
    let Some((doc, node)) = first_node(table, rid) else { return false };
    table.with_payload_mut::<HtmlDocument, _>(doc, |d| d.prepend(node, html)).unwrap_or(false)
}

pub fn append(table: &ResourceTable, rid: Rid, html: &str) -> bool {
    let Some((doc, node)) = first_node(table, rid) else { return false };
    table.with_payload_mut::<HtmlDocument, _>(doc, |d| d.append(node, html)).unwrap_or(false)
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap(
        "html",
        "parse",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32, bptr: i32, blen: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(html) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            let base = memory::read_string(&caller, &memory, bptr, blen);
            parse(&caller.data().table, &html, base.as_deref())
        },
    )?;
    linker.func_wrap(
        "html",
        "parse_fragment",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32, bptr: i32, blen: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(html) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            let base = memory::read_string(&caller, &memory, bptr, blen);
            parse_fragment(&caller.data().table, &html, base.as_deref())
        },
    )?;
    linker.func_wrap(
        "html",
        "select",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(selector) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            select(&caller.data().table, rid, &selector).unwrap_or_else(|e| e)
        },
    )?;
    linker.func_wrap(
        "html",
        "select_first",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(selector) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            select_first(&caller.data().table, rid, &selector).unwrap_or_else(|e| e)
        },
    )?;
    linker.func_wrap("html", "size", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        size(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "get", |caller: Caller<'_, HostState>, rid: i32, index: i32| -> i32 {
        at(&caller.data().table, rid, index).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "first", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        first(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "last", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        last(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "array", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        array(&caller.data().table, rid).unwrap_or(-1)
    })?;

    macro_rules! wrap_string_fn {
        ($name:literal, $f:path) => {
            linker.func_wrap(
                "html",
                $name,
                |mut caller: Caller<'_, HostState>, rid: i32, out_ptr: i32| -> i32 {
                    let Some(value) = $f(&caller.data().table, rid) else { return -1 };
                    let Some(memory) = caller.data().memory() else { return -1 };
                    if memory::write_bytes(&mut caller, &memory, out_ptr, value.as_bytes()) {
                        value.as_bytes().len() as i32
                    } else {
                        -1
                    }
                },
            )?;
        };
    }
    wrap_string_fn!("text", text);
    wrap_string_fn!("untrimmed_text", untrimmed_text);
    wrap_string_fn!("own_text", own_text);
    wrap_string_fn!("inner_html", inner_html);
    wrap_string_fn!("outer_html", outer_html);
    wrap_string_fn!("data", data);
    wrap_string_fn!("tag_name", tag_name);
    wrap_string_fn!("class_name", class_name);
    wrap_string_fn!("id", id_attr);

    linker.func_wrap(
        "html",
        "attr",
        |mut caller: Caller<'_, HostState>, rid: i32, nptr: i32, nlen: i32, out_ptr: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(name) = memory::read_string(&caller, &memory, nptr, nlen) else { return -1 };
            let Some(value) = attr(&caller.data().table, rid, &name) else { return -1 };
            if memory::write_bytes(&mut caller, &memory, out_ptr, value.as_bytes()) {
                value.as_bytes().len() as i32
            } else {
                -1
            }
        },
    )?;
    linker.func_wrap(
        "html",
        "has_class",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(class) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            has_class(&caller.data().table, rid, &class) as i32
        },
    )?;
    linker.func_wrap(
        "html",
        "has_attr",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(name) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            has_attr(&caller.data().table, rid, &name) as i32
        },
    )?;

    linker.func_wrap("html", "parent", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        parent(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "children", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        children(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "siblings", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        siblings(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "next_sibling", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        next_sibling(&caller.data().table, rid).unwrap_or(-1)
    })?;
    linker.func_wrap("html", "previous_sibling", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        previous_sibling(&caller.data().table, rid).unwrap_or(-1)
    })?;

    linker.func_wrap(
        "html",
        "set_text",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(text) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            set_text(&caller.data().table, rid, &text) as i32
        },
    )?;
    linker.func_wrap(
        "html",
        "set_html",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(html) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            set_html(&caller.data().table, rid, &html) as i32
        },
    )?;
    linker.func_wrap(
        "html",
        "prepend",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(html) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            prepend(&caller.data().table, rid, &html) as i32
        },
    )?;
    linker.func_wrap(
        "html",
        "append",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(html) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            append(&caller.data().table, rid, &html) as i32
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_over_document_then_over_a_selection() {
        let table = ResourceTable::new();
        let doc = parse(&table, r#"<ul><li class="x">a</li><li>b</li></ul>"#, None);
        let items = select(&table, doc, "li").unwrap();
        assert_eq!(size(&table, items), Some(2));
        let first = at(&table, items, 0).unwrap();
        assert_eq!(text(&table, first), Some("a".to_string()));

        let ul = select(&table, doc, "ul").unwrap();
        let nested = select(&table, ul, ".x").unwrap();
        assert_eq!(size(&table, nested), Some(1));
    }

    #[test]
    fn mutation_is_visible_through_a_fresh_selection_on_the_same_document() {
        let table = ResourceTable::new();
        let doc = parse(&table, "<p>old</p>", None);
        let p = select(&table, doc, "p").unwrap();
        assert!(set_text(&table, p, "new"));
        let again = select(&table, doc, "p").unwrap();
        assert_eq!(text(&table, again), Some("new".to_string()));
    }

    #[test]
    fn invalid_selector_surfaces_as_negative_code() {
        let table = ResourceTable::new();
        let doc = parse(&table, "<div></div>", None);
        assert!(select(&table, doc, ":::").is_err());
    }

    #[test]
    fn select_first_narrows_to_one_match() {
        let table = ResourceTable::new();
        let doc = parse(&table, r#"<ul><li>a</li><li>b</li></ul>"#, None);
        let first = select_first(&table, doc, "li").unwrap();
        assert_eq!(size(&table, first), Some(1));
        assert_eq!(text(&table, first), Some("a".to_string()));
    }

    #[test]
    fn select_first_with_no_match_reports_no_result() {
        let table = ResourceTable::new();
        let doc = parse(&table, "<div></div>", None);
        assert!(select_first(&table, doc, "li").is_err());
    }

    #[test]
    fn first_and_last_bracket_a_node_set() {
        let table = ResourceTable::new();
        let doc = parse(&table, r#"<ul><li>a</li><li>b</li><li>c</li></ul>"#, None);
        let items = select(&table, doc, "li").unwrap();
        let f = first(&table, items).unwrap();
        let l = last(&table, items).unwrap();
        assert_eq!(text(&table, f), Some("a".to_string()));
        assert_eq!(text(&table, l), Some("c".to_string()));
    }

    #[test]
    fn array_converts_node_set_into_value_descriptors() {
        let table = ResourceTable::new();
        let doc = parse(&table, r#"<ul><li>a</li><li>b</li></ul>"#, None);
        let items = select(&table, doc, "li").unwrap();
        let arr = array(&table, items).unwrap();
        assert_eq!(table.kind_of(arr), Some(ResourceKind::Value));
    }
}
