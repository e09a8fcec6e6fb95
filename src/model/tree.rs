//! Arena-indexed document trees.
//!
//! # Overview
//!
//! A [`Tree`] owns every node of one parsed document in a flat arena and
//! hands out copyable [`NodeId`] handles. All structure lives in the arena:
//! an element node records its tag, its attributes (insertion-ordered), and
//! the ids of its children in document order.
//!
//! The merge engine leans on three properties of this representation:
//!
//! - **Ids survive cloning.** `Tree::clone` copies the arena verbatim, so an
//!   id minted by the original addresses the corresponding node in the clone.
//!   The engine clones the local side and then edits the clone in place.
//! - **Child lists are plain vectors.** Callers that mutate while iterating
//!   snapshot the list first (`children(..).to_vec()`); the arena itself
//!   never moves nodes.
//! - **Detached nodes stay allocated.** Removing a child only unlinks it from
//!   its parent. Trees are short-lived, so the slack is never reclaimed.
//!
//! Node ids are only meaningful for the tree that created them. Passing a
//! foreign id to an accessor is a logic error: it panics on out-of-range ids
//! and silently addresses the wrong node otherwise.

use indexmap::IndexMap;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// A handle to a node inside one [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// Arena slot. Only elements carry structure; text and comments are leaves.
#[derive(Clone, Debug, PartialEq)]
enum Node {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        children: Vec<NodeId>,
    },
    Text(String),
    Comment(String),
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// An arena-backed document tree with a single element root.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree whose root is an empty element with the given tag.
    #[must_use]
    pub fn new(root_tag: &str) -> Self {
        let root = Node::Element {
            tag: root_tag.to_owned(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Create a tree whose root is a deep copy of an element in `source`.
    ///
    /// Used to lift a single record out of a full document. `node` must be
    /// an element.
    #[must_use]
    pub fn from_subtree(source: &Self, node: NodeId) -> Self {
        let mut tree = Self::new(source.tag(node).unwrap_or_default());
        if let Some(attrs) = source.attributes(node) {
            for (name, value) in attrs {
                tree.set_attribute(tree.root, name, value);
            }
        }
        for child in source.children(node).to_vec() {
            let copied = tree.adopt(source, child);
            tree.append_child(tree.root, copied);
        }
        tree
    }

    /// The root element of the tree.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Number of allocated nodes, detached ones included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Allocate a detached element node.
    pub fn new_element(&mut self, tag: &str) -> NodeId {
        self.push(Node::Element {
            tag: tag.to_owned(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        })
    }

    /// Allocate a detached text node.
    pub fn new_text(&mut self, text: &str) -> NodeId {
        self.push(Node::Text(text.to_owned()))
    }

    /// Allocate a detached comment node.
    pub fn new_comment(&mut self, text: &str) -> NodeId {
        self.push(Node::Comment(text.to_owned()))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    /// Append `child` to the end of `parent`'s child list.
    ///
    /// `parent` must be an element; appending to a leaf is a no-op.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Node::Element { children, .. } = &mut self.nodes[parent.index()] {
            children.push(child);
        }
    }

    /// Unlink `child` from `parent`'s child list.
    ///
    /// Returns `true` if the child was present. The node itself stays
    /// allocated but unreachable.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if let Node::Element { children, .. } = &mut self.nodes[parent.index()] {
            if let Some(pos) = children.iter().position(|&c| c == child) {
                children.remove(pos);
                return true;
            }
        }
        false
    }

    /// The children of a node in document order. Empty for leaves.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.index()] {
            Node::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// Iterate over the element children of a node.
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
    }

    /// The first text child of an element, if any.
    #[must_use]
    pub fn first_text_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.is_text(c))
    }

    // -----------------------------------------------------------------------
    // Node inspection
    // -----------------------------------------------------------------------

    /// `true` if the node is an element.
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.index()], Node::Element { .. })
    }

    /// `true` if the node is a text run.
    #[must_use]
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.index()], Node::Text(_))
    }

    /// `true` if the node is a comment.
    #[must_use]
    pub fn is_comment(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.index()], Node::Comment(_))
    }

    /// The tag of an element node, `None` for leaves.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()] {
            Node::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// The content of a text node, `None` otherwise.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()] {
            Node::Text(t) => Some(t),
            _ => None,
        }
    }

    /// The content of a comment node, `None` otherwise.
    #[must_use]
    pub fn comment(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()] {
            Node::Comment(t) => Some(t),
            _ => None,
        }
    }

    /// Replace the content of a text node. No-op for other kinds.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Node::Text(t) = &mut self.nodes[id.index()] {
            text.clone_into(t);
        }
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    /// The attribute map of an element in insertion order, `None` for leaves.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> Option<&IndexMap<String, String>> {
        match &self.nodes[id.index()] {
            Node::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    /// The value of one attribute on an element.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)?.get(name).map(String::as_str)
    }

    /// Set an attribute, preserving the position of an existing entry.
    ///
    /// No-op on leaves.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Node::Element { attributes, .. } = &mut self.nodes[id.index()] {
            attributes.insert(name.to_owned(), value.to_owned());
        }
    }

    /// Remove an attribute, shifting later entries down to keep order dense.
    ///
    /// Returns the removed value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let Node::Element { attributes, .. } = &mut self.nodes[id.index()] {
            attributes.shift_remove(name)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Cross-tree operations
    // -----------------------------------------------------------------------

    /// Deep-copy a subtree rooted in `source` into this arena.
    ///
    /// Returns the id of the detached copy; attach it with
    /// [`Tree::append_child`].
    pub fn adopt(&mut self, source: &Self, node: NodeId) -> NodeId {
        match &source.nodes[node.index()] {
            Node::Element {
                tag,
                attributes,
                children,
            } => {
                let copy = self.push(Node::Element {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                    children: Vec::new(),
                });
                for &child in children {
                    let child_copy = self.adopt(source, child);
                    self.append_child(copy, child_copy);
                }
                copy
            }
            Node::Text(t) => self.push(Node::Text(t.clone())),
            Node::Comment(t) => self.push(Node::Comment(t.clone())),
        }
    }

    /// Structural equality of two subtrees, possibly across trees.
    ///
    /// Elements compare by tag, attribute sets (order-insensitive), and
    /// children pairwise in document order. Text and comments compare by
    /// content.
    #[must_use]
    pub fn subtree_equal(&self, node: NodeId, other: &Self, other_node: NodeId) -> bool {
        match (&self.nodes[node.index()], &other.nodes[other_node.index()]) {
            (
                Node::Element {
                    tag: a_tag,
                    attributes: a_attrs,
                    children: a_kids,
                },
                Node::Element {
                    tag: b_tag,
                    attributes: b_attrs,
                    children: b_kids,
                },
            ) => {
                a_tag == b_tag
                    && a_attrs == b_attrs
                    && a_kids.len() == b_kids.len()
                    && a_kids
                        .iter()
                        .zip(b_kids)
                        .all(|(&a, &b)| self.subtree_equal(a, other, b))
            }
            (Node::Text(a), Node::Text(b)) | (Node::Comment(a), Node::Comment(b)) => a == b,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new("lexicon");
        tree.set_attribute(tree.root(), "version", "1.0");
        let entry = tree.new_element("entry");
        tree.set_attribute(entry, "id", "e1");
        tree.append_child(tree.root(), entry);
        let form = tree.new_element("form");
        tree.set_attribute(form, "lang", "en");
        tree.append_child(entry, form);
        let text = tree.new_text("apple");
        tree.append_child(form, text);
        (tree, entry, form)
    }

    #[test]
    fn new_tree_has_element_root() {
        let tree = Tree::new("lexicon");
        assert!(tree.is_element(tree.root()));
        assert_eq!(tree.tag(tree.root()), Some("lexicon"));
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn append_preserves_document_order() {
        let mut tree = Tree::new("root");
        let a = tree.new_element("a");
        let b = tree.new_element("b");
        let c = tree.new_element("c");
        tree.append_child(tree.root(), a);
        tree.append_child(tree.root(), b);
        tree.append_child(tree.root(), c);
        assert_eq!(tree.children(tree.root()), &[a, b, c]);
    }

    #[test]
    fn remove_child_unlinks() {
        let mut tree = Tree::new("root");
        let a = tree.new_element("a");
        let b = tree.new_element("b");
        tree.append_child(tree.root(), a);
        tree.append_child(tree.root(), b);

        assert!(tree.remove_child(tree.root(), a));
        assert_eq!(tree.children(tree.root()), &[b]);
        // Already unlinked.
        assert!(!tree.remove_child(tree.root(), a));
        // Node stays allocated.
        assert_eq!(tree.tag(a), Some("a"));
    }

    #[test]
    fn attribute_order_is_insertion_order() {
        let mut tree = Tree::new("entry");
        tree.set_attribute(tree.root(), "id", "e1");
        tree.set_attribute(tree.root(), "date-created", "2024-01-01");
        tree.set_attribute(tree.root(), "date-modified", "2024-02-02");

        let names: Vec<&str> = tree
            .attributes(tree.root())
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(names, ["id", "date-created", "date-modified"]);
    }

    #[test]
    fn set_attribute_overwrite_keeps_position() {
        let mut tree = Tree::new("entry");
        tree.set_attribute(tree.root(), "id", "e1");
        tree.set_attribute(tree.root(), "lang", "en");
        tree.set_attribute(tree.root(), "id", "e2");

        let names: Vec<&str> = tree
            .attributes(tree.root())
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(names, ["id", "lang"]);
        assert_eq!(tree.attribute(tree.root(), "id"), Some("e2"));
    }

    #[test]
    fn remove_attribute_returns_value() {
        let mut tree = Tree::new("entry");
        tree.set_attribute(tree.root(), "id", "e1");
        assert_eq!(tree.remove_attribute(tree.root(), "id"), Some("e1".into()));
        assert_eq!(tree.attribute(tree.root(), "id"), None);
        assert_eq!(tree.remove_attribute(tree.root(), "id"), None);
    }

    #[test]
    fn leaf_accessors() {
        let mut tree = Tree::new("root");
        let text = tree.new_text("hello");
        let comment = tree.new_comment("note");
        tree.append_child(tree.root(), text);
        tree.append_child(tree.root(), comment);

        assert!(tree.is_text(text));
        assert_eq!(tree.text(text), Some("hello"));
        assert!(tree.is_comment(comment));
        assert_eq!(tree.comment(comment), Some("note"));
        assert!(tree.children(text).is_empty());
        assert_eq!(tree.attributes(text), None);
    }

    #[test]
    fn set_text_replaces_content() {
        let mut tree = Tree::new("root");
        let text = tree.new_text("hi");
        tree.append_child(tree.root(), text);
        tree.set_text(text, "hello");
        assert_eq!(tree.text(text), Some("hello"));
    }

    #[test]
    fn first_text_child_skips_elements() {
        let mut tree = Tree::new("form");
        let annotation = tree.new_element("annotation");
        tree.append_child(tree.root(), annotation);
        let text = tree.new_text("apple");
        tree.append_child(tree.root(), text);

        assert_eq!(tree.first_text_child(tree.root()), Some(text));
        assert_eq!(tree.first_text_child(annotation), None);
    }

    #[test]
    fn element_children_filters_leaves() {
        let (tree, entry, form) = sample();
        let elements: Vec<NodeId> = tree.element_children(entry).collect();
        assert_eq!(elements, vec![form]);
        assert_eq!(tree.element_children(tree.root()).count(), 1);
    }

    #[test]
    fn clone_preserves_node_ids() {
        let (tree, entry, form) = sample();
        let mut copy = tree.clone();

        assert_eq!(copy.tag(entry), Some("entry"));
        assert_eq!(copy.attribute(form, "lang"), Some("en"));

        // Mutating the clone leaves the original untouched.
        copy.set_attribute(entry, "id", "changed");
        assert_eq!(tree.attribute(entry, "id"), Some("e1"));
        assert_eq!(copy.attribute(entry, "id"), Some("changed"));
    }

    #[test]
    fn adopt_copies_whole_subtree() {
        let (source, entry, _) = sample();
        let mut target = Tree::new("lexicon");
        let copied = target.adopt(&source, entry);
        target.append_child(target.root(), copied);

        assert!(target.subtree_equal(copied, &source, entry));
        // Independent copies: editing one side breaks equality.
        target.set_attribute(copied, "id", "e2");
        assert!(!target.subtree_equal(copied, &source, entry));
    }

    #[test]
    fn from_subtree_lifts_record() {
        let (source, entry, _) = sample();
        let lifted = Tree::from_subtree(&source, entry);
        assert_eq!(lifted.tag(lifted.root()), Some("entry"));
        assert_eq!(lifted.attribute(lifted.root(), "id"), Some("e1"));
        assert!(lifted.subtree_equal(lifted.root(), &source, entry));
    }

    #[test]
    fn subtree_equal_ignores_attribute_order() {
        let mut a = Tree::new("entry");
        a.set_attribute(a.root(), "id", "e1");
        a.set_attribute(a.root(), "lang", "en");

        let mut b = Tree::new("entry");
        b.set_attribute(b.root(), "lang", "en");
        b.set_attribute(b.root(), "id", "e1");

        assert!(a.subtree_equal(a.root(), &b, b.root()));
    }

    #[test]
    fn subtree_equal_respects_child_order() {
        let mut a = Tree::new("entry");
        let a1 = a.new_element("form");
        let a2 = a.new_element("sense");
        a.append_child(a.root(), a1);
        a.append_child(a.root(), a2);

        let mut b = Tree::new("entry");
        let b1 = b.new_element("sense");
        let b2 = b.new_element("form");
        b.append_child(b.root(), b1);
        b.append_child(b.root(), b2);

        assert!(!a.subtree_equal(a.root(), &b, b.root()));
    }

    #[test]
    fn subtree_equal_distinguishes_kinds() {
        let mut a = Tree::new("root");
        let text = a.new_text("x");
        a.append_child(a.root(), text);

        let mut b = Tree::new("root");
        let comment = b.new_comment("x");
        b.append_child(b.root(), comment);

        assert!(!a.subtree_equal(a.root(), &b, b.root()));
    }

    #[test]
    fn subtree_equal_detects_text_difference() {
        let mut a = Tree::new("text");
        let at = a.new_text("hi");
        a.append_child(a.root(), at);

        let mut b = Tree::new("text");
        let bt = b.new_text("hello");
        b.append_child(b.root(), bt);

        assert!(!a.subtree_equal(a.root(), &b, b.root()));
    }
}
