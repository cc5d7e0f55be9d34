//! Raw dump parsing
//!
//! Turns the XML hierarchy emitted by `uiautomator dump` (or an equivalent
//! accessibility snapshot) into a [`UiTree`]. The dump frequently arrives
//! with shell noise before the document and with attributes missing on
//! individual nodes; both are tolerated. Only a dump that cannot be read as
//! a tree at all is rejected.

use roxmltree::{Document, Node};
use tracing::debug;

use crate::errors::TreeError;
use crate::model::{Bounds, NodeId, UiNode, UiTree};

/// Parse a raw hierarchy dump into a tree.
///
/// The returned tree always has exactly one root: the `<hierarchy>`
/// element when present, otherwise the document's root element. Child
/// document order is preserved.
pub fn parse_dump(raw: &str) -> Result<UiTree, TreeError> {
    let xml = extract_document(raw)?;
    let doc =
        Document::parse(xml).map_err(|e| TreeError::MalformedInput(e.to_string()))?;

    let root_el = doc.root_element();
    let mut tree = UiTree::with_root(parse_node(&root_el, 0));
    let root = tree.root();
    for (position, child) in root_el.children().filter(|c| c.is_element()).enumerate() {
        append_subtree(&mut tree, root, &child, position);
    }

    debug!(nodes = tree.len(), "parsed ui hierarchy dump");
    Ok(tree)
}

fn append_subtree(tree: &mut UiTree, parent: NodeId, el: &Node<'_, '_>, position: usize) {
    let id = tree.push_child(parent, parse_node(el, position));
    for (child_pos, child) in el.children().filter(|c| c.is_element()).enumerate() {
        append_subtree(tree, id, &child, child_pos);
    }
}

/// Skip anything the shell printed before the document itself.
fn extract_document(raw: &str) -> Result<&str, TreeError> {
    for marker in ["<?xml", "<hierarchy", "<node"] {
        if let Some(start) = raw.find(marker) {
            return Ok(&raw[start..]);
        }
    }
    Err(TreeError::MalformedInput(format!(
        "no xml document in dump: {:.80}",
        raw
    )))
}

fn parse_node(el: &Node<'_, '_>, position: usize) -> UiNode {
    let attr = |name: &str| el.attribute(name).unwrap_or("").to_string();
    let flag = |name: &str| el.attribute(name) == Some("true");

    UiNode {
        class_name: if el.has_attribute("class") {
            attr("class")
        } else {
            el.tag_name().name().to_string()
        },
        resource_id: attr("resource-id"),
        text: attr("text"),
        content_desc: attr("content-desc"),
        package: attr("package"),
        bounds: parse_bounds(el.attribute("bounds").unwrap_or("")),
        checkable: flag("checkable"),
        checked: flag("checked"),
        clickable: flag("clickable"),
        enabled: el.attribute("enabled") != Some("false"),
        focusable: flag("focusable"),
        focused: flag("focused"),
        scrollable: flag("scrollable"),
        selected: flag("selected"),
        index: el
            .attribute("index")
            .and_then(|v| v.parse().ok())
            .unwrap_or(position),
        ..UiNode::default()
    }
}

/// Parse a `[left,top][right,bottom]` bounds string, defaulting to the zero
/// rect when it does not conform.
fn parse_bounds(raw: &str) -> Bounds {
    fn pair(s: &str) -> Option<(i32, i32)> {
        let inner = s.strip_prefix('[')?.strip_suffix(']')?;
        let (x, y) = inner.split_once(',')?;
        Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
    }

    let Some(split) = raw.find("][") else {
        return Bounds::default();
    };
    let (first, second) = raw.split_at(split + 1);
    match (pair(first), pair(second)) {
        (Some((left, top)), Some((right, bottom))) => Bounds::new(left, top, right, bottom),
        _ => Bounds::default(),
    }
}
