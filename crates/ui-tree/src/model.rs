//! Arena-backed UI node tree

use serde::{Deserialize, Serialize};

/// Rectangular node bounds in screen pixels.
///
/// Raw dumps can be malformed, so bounds are not guaranteed to nest inside
/// the parent's bounds and may be empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    /// Center point, the coordinate a tap on this node would target.
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    pub fn has_area(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }
}

/// Index of a node inside its owning [`UiTree`] arena.
///
/// Ids are only meaningful for the tree that produced them; a projection
/// returns a new tree with its own ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A single UI element as reported by the device dump.
///
/// Missing attributes default to empty strings / `false` (`enabled`
/// defaults to `true`, matching the dump format).
#[derive(Clone, Debug)]
pub struct UiNode {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub package: String,
    pub bounds: Bounds,
    pub checkable: bool,
    pub checked: bool,
    pub clickable: bool,
    pub enabled: bool,
    pub focusable: bool,
    pub focused: bool,
    pub scrollable: bool,
    pub selected: bool,
    /// Ordinal position among the node's siblings in the unfiltered dump.
    /// Survives projections, so index-based selectors stay stable.
    pub index: usize,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Default for UiNode {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            resource_id: String::new(),
            text: String::new(),
            content_desc: String::new(),
            package: String::new(),
            bounds: Bounds::default(),
            checkable: false,
            checked: false,
            clickable: false,
            enabled: true,
            focusable: false,
            focused: false,
            scrollable: false,
            selected: false,
            index: 0,
            children: Vec::new(),
            parent: None,
        }
    }
}

impl UiNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Owned node tree with exactly one root.
///
/// Nodes are stored in an arena addressed by [`NodeId`]; child lists are
/// index sequences and the parent back-reference is a plain index, never
/// shared ownership. A tree is built per snapshot and discarded after the
/// consuming call returns.
#[derive(Clone, Debug)]
pub struct UiTree {
    nodes: Vec<UiNode>,
    root: NodeId,
}

impl UiTree {
    /// Create a tree containing only the given root node.
    pub(crate) fn with_root(mut root: UiNode) -> Self {
        root.parent = None;
        root.children.clear();
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Append `node` under `parent`, preserving insertion order.
    pub(crate) fn push_child(&mut self, parent: NodeId, mut node: UiNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Depth-first, document-order traversal yielding `(id, depth)` with the
    /// root at depth 0. Deterministic for a given tree.
    pub fn iter(&self) -> DepthFirst<'_> {
        DepthFirst {
            tree: self,
            stack: vec![(self.root, 0)],
        }
    }

    /// Full nested view of the tree, suitable for JSON emission.
    pub fn to_view(&self) -> NodeView {
        self.view_of(self.root)
    }

    fn view_of(&self, id: NodeId) -> NodeView {
        let node = &self.nodes[id.0];
        NodeView {
            class_name: node.class_name.clone(),
            resource_id: node.resource_id.clone(),
            text: node.text.clone(),
            content_desc: node.content_desc.clone(),
            package: node.package.clone(),
            bounds: node.bounds,
            clickable: node.clickable,
            enabled: node.enabled,
            focused: node.focused,
            scrollable: node.scrollable,
            index: node.index,
            children: node.children.iter().map(|c| self.view_of(*c)).collect(),
        }
    }
}

/// Serializable nested rendition of a (possibly projected) tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeView {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub package: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub enabled: bool,
    pub focused: bool,
    pub scrollable: bool,
    pub index: usize,
    pub children: Vec<NodeView>,
}

/// See [`UiTree::iter`].
pub struct DepthFirst<'a> {
    tree: &'a UiTree,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        let node = self.tree.nodes.get(id.0)?;
        for child in node.children.iter().rev() {
            self.stack.push((*child, depth + 1));
        }
        Some((id, depth))
    }
}
