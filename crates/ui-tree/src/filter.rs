//! Tree projections
//!
//! Pure, read-only reductions over a parsed [`UiTree`]. The tree-to-tree
//! projections compose by sequential application; [`bounds_only`] is a
//! terminal projection emitting the minimal per-node payload.

use serde::Serialize;
use tracing::debug;

use crate::model::{Bounds, NodeId, UiTree};

/// Longest text carried by a bounds-only entry.
const BOUNDS_TEXT_LIMIT: usize = 50;

/// Keep clickable nodes (and the root), collapsing non-interactive
/// ancestors. A clickable node buried under non-interactive containers is
/// re-attached to its nearest retained ancestor, so descendant
/// relationships survive for index-based selection. Retained nodes keep
/// their original ordinal index.
pub fn interactive_only(tree: &UiTree) -> UiTree {
    let root = tree.root();
    let mut out = UiTree::with_root(tree.get(root).cloned().unwrap_or_default());
    let out_root = out.root();
    for child in tree.children(root) {
        collapse_into(tree, *child, &mut out, out_root);
    }
    debug!(from = tree.len(), to = out.len(), "interactive-only projection");
    out
}

fn collapse_into(tree: &UiTree, id: NodeId, out: &mut UiTree, retained_parent: NodeId) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let attach_to = if node.clickable {
        out.push_child(retained_parent, node.clone())
    } else {
        retained_parent
    };
    for child in tree.children(id) {
        collapse_into(tree, *child, out, attach_to);
    }
}

/// Truncate the tree below `max_depth`, counted from the root at depth 0.
pub fn depth_limited(tree: &UiTree, max_depth: usize) -> UiTree {
    let root = tree.root();
    let mut out = UiTree::with_root(tree.get(root).cloned().unwrap_or_default());
    let out_root = out.root();
    if max_depth > 0 {
        for child in tree.children(root) {
            copy_to_depth(tree, *child, 1, max_depth, &mut out, out_root);
        }
    }
    out
}

fn copy_to_depth(
    tree: &UiTree,
    id: NodeId,
    depth: usize,
    max_depth: usize,
    out: &mut UiTree,
    parent: NodeId,
) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let new_id = out.push_child(parent, node.clone());
    if depth < max_depth {
        for child in tree.children(id) {
            copy_to_depth(tree, *child, depth + 1, max_depth, out, new_id);
        }
    }
}

/// Drop subtrees whose package matches the denylist of system surfaces.
/// The root itself is always retained.
pub fn exclude_system(tree: &UiTree, denylist: &[String]) -> UiTree {
    let root = tree.root();
    let mut out = UiTree::with_root(tree.get(root).cloned().unwrap_or_default());
    let out_root = out.root();
    for child in tree.children(root) {
        copy_unless_denied(tree, *child, denylist, &mut out, out_root);
    }
    out
}

fn copy_unless_denied(
    tree: &UiTree,
    id: NodeId,
    denylist: &[String],
    out: &mut UiTree,
    parent: NodeId,
) {
    let Some(node) = tree.get(id) else {
        return;
    };
    if denylist.iter().any(|denied| node.package == *denied) {
        debug!(package = %node.package, "dropping system subtree");
        return;
    }
    let new_id = out.push_child(parent, node.clone());
    for child in tree.children(id) {
        copy_unless_denied(tree, *child, denylist, out, new_id);
    }
}

/// One entry of the bounds-only projection.
#[derive(Clone, Debug, Serialize)]
pub struct BoundsEntry {
    pub text: String,
    pub resource_id: String,
    pub bounds: Bounds,
    pub clickable: bool,
}

/// Emit bounds plus minimal identifying attributes for every node with a
/// non-empty rect, in document order. Text is truncated to keep payloads
/// small.
pub fn bounds_only(tree: &UiTree) -> Vec<BoundsEntry> {
    tree.iter()
        .filter_map(|(id, _)| tree.get(id))
        .filter(|node| node.bounds.has_area())
        .map(|node| BoundsEntry {
            text: truncate(&node.text, BOUNDS_TEXT_LIMIT),
            resource_id: node.resource_id.clone(),
            bounds: node.bounds,
            clickable: node.clickable,
        })
        .collect()
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
