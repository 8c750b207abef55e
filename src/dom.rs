// Copyright 2024-2026 The canopy Project Developers. See the
// COPYRIGHT file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The reference-counted DOM that parsing produces.
//!
//! Nodes own their children and hold weak references to their parents, so
//! the whole tree is released when the [`Document`] is dropped. The tree
//! builder mutates the graph exclusively through the primitives in this
//! module; foster parenting and the adoption agency share them, which is
//! what keeps the sibling/parent invariants in one place.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use tendril::StrTendril;

use crate::interface::{Attribute, ParseError, QualName, QuirksMode};
use crate::{expanded_name, LocalName};

/// The different kinds of nodes in the DOM.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// The `Document` itself - the root node of a HTML document.
    Document,

    /// A `DOCTYPE` with name, public id, and system id. See
    /// [document type declaration on wikipedia][dtd wiki].
    ///
    /// [dtd wiki]: https://en.wikipedia.org/wiki/Document_type_declaration
    Doctype {
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    },

    /// A text node.
    Text { contents: RefCell<StrTendril> },

    /// A comment.
    Comment { contents: StrTendril },

    /// An element with attributes.
    Element {
        name: QualName,
        attrs: RefCell<Vec<Attribute>>,

        /// Whether the node is a MathML `annotation-xml` element whose
        /// `encoding` makes it an [HTML integration point].
        ///
        /// [HTML integration point]: https://html.spec.whatwg.org/multipage/#html-integration-point
        mathml_annotation_xml_integration_point: bool,
    },

    /// An error placeholder, mirroring the token-level end-of-input
    /// marker. The parser never produces one; it exists so consumers that
    /// splice their own bookkeeping nodes into a tree have a kind that
    /// serialization and text extraction ignore.
    Error,
}

/// A DOM node.
pub struct Node {
    /// Parent node.
    pub parent: Cell<Option<WeakHandle>>,
    /// Child nodes of this node.
    pub children: RefCell<Vec<Handle>>,
    /// Represents this node's data.
    pub data: NodeData,
}

/// Reference to a DOM node.
pub type Handle = Rc<Node>;

/// Weak reference to a DOM node, used for parent pointers.
pub type WeakHandle = Weak<Node>;

impl Node {
    /// Create a new node from its contents.
    pub fn new(data: NodeData) -> Handle {
        Rc::new(Node {
            data,
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
        })
    }

    /// The parent of this node, if it is attached to a tree.
    pub fn parent(&self) -> Option<Handle> {
        let weak = self.parent.take()?;
        let parent = weak.upgrade().expect("dangling weak pointer");
        self.parent.set(Some(weak));
        Some(parent)
    }

    pub fn first_child(&self) -> Option<Handle> {
        self.children.borrow().first().cloned()
    }

    pub fn last_child(&self) -> Option<Handle> {
        self.children.borrow().last().cloned()
    }

    pub fn next_sibling(self: &Rc<Self>) -> Option<Handle> {
        let (parent, i) = get_parent_and_index(self)?;
        let siblings = parent.children.borrow();
        siblings.get(i + 1).cloned()
    }

    pub fn prev_sibling(self: &Rc<Self>) -> Option<Handle> {
        let (parent, i) = get_parent_and_index(self)?;
        let siblings = parent.children.borrow();
        i.checked_sub(1).and_then(|i| siblings.get(i)).cloned()
    }

    /// A copy of this node's data, with no parent and no children.
    pub fn clone_shallow(&self) -> Handle {
        Node::new(self.data.clone())
    }

    /// The concatenation of every descendant text node, in tree order.
    pub fn inner_text(&self) -> StrTendril {
        let mut out = StrTendril::new();
        let mut stack: Vec<Handle> = self.children.borrow().iter().rev().cloned().collect();
        if let NodeData::Text { ref contents } = self.data {
            out.push_tendril(&contents.borrow());
        }
        while let Some(node) = stack.pop() {
            if let NodeData::Text { ref contents } = node.data {
                out.push_tendril(&contents.borrow());
            }
            stack.extend(node.children.borrow().iter().rev().cloned());
        }
        out
    }

    /// The value of the attribute named `name`, if present. Only
    /// meaningful for element nodes.
    pub fn attr(&self, name: &str) -> Option<StrTendril> {
        let NodeData::Element { ref attrs, .. } = self.data else {
            return None;
        };
        attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.clone())
    }

    /// Set an attribute, replacing the value in place if the name is
    /// already present and appending otherwise (insertion order is
    /// preserved either way).
    ///
    /// # Panics
    ///
    /// Panics if this is not an element node.
    pub fn set_attr(&self, name: &str, value: StrTendril) {
        let NodeData::Element { ref attrs, .. } = self.data else {
            panic!("not an element!");
        };
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == name) {
            Some(existing) => existing.value = value,
            None => attrs.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(name)),
                value,
            }),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Iterative to avoid blowing the stack on very deep trees.
        let mut nodes = mem::take(&mut *self.children.borrow_mut());
        while let Some(node) = nodes.pop() {
            let children = mem::take(&mut *node.children.borrow_mut());
            nodes.extend(children);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Node")
            .field("data", &self.data)
            .field("children", &self.children)
            .finish()
    }
}

/// Something to append to a parent: a node, or a string of text that may
/// coalesce with an adjacent text node.
pub enum NodeOrText {
    AppendNode(Handle),
    AppendText(StrTendril),
}

/// Create an element node for the given name and attributes.
///
/// This computes the MathML `annotation-xml` integration-point flag, which
/// depends on the `encoding` attribute at creation time.
pub fn create_element(name: QualName, attrs: Vec<Attribute>) -> Handle {
    let mathml_annotation_xml_integration_point = name.expanded()
        == expanded_name!(mathml "annotation-xml")
        && attrs.iter().any(|attr| {
            attr.name.expanded() == expanded_name!("", "encoding")
                && (attr.value.eq_ignore_ascii_case("text/html")
                    || attr.value.eq_ignore_ascii_case("application/xhtml+xml"))
        });
    Node::new(NodeData::Element {
        name,
        attrs: RefCell::new(attrs),
        mathml_annotation_xml_integration_point,
    })
}

pub fn is_mathml_annotation_xml_integration_point(node: &Handle) -> bool {
    match node.data {
        NodeData::Element {
            mathml_annotation_xml_integration_point,
            ..
        } => mathml_annotation_xml_integration_point,
        _ => panic!("not an element!"),
    }
}

/// Append a parentless node to another node's children.
fn append(new_parent: &Handle, child: Handle) {
    let previous_parent = child.parent.replace(Some(Rc::downgrade(new_parent)));
    // Invariant: child cannot have an existing parent.
    debug_assert!(previous_parent.is_none());
    new_parent.children.borrow_mut().push(child);
}

/// If the node has a parent, get it and this node's position in its children.
fn get_parent_and_index(target: &Handle) -> Option<(Handle, usize)> {
    let parent = target.parent()?;
    let i = match parent
        .children
        .borrow()
        .iter()
        .enumerate()
        .find(|&(_, child)| Rc::ptr_eq(child, target))
    {
        Some((i, _)) => i,
        None => panic!("have parent but couldn't find in parent's children!"),
    };
    Some((parent, i))
}

fn append_to_existing_text(prev: &Handle, text: &str) -> bool {
    match prev.data {
        NodeData::Text { ref contents } => {
            contents.borrow_mut().push_slice(text);
            true
        },
        _ => false,
    }
}

/// Append a node or text as the last child of `parent`. Text coalesces
/// with an existing trailing text node.
pub fn append_child(parent: &Handle, child: NodeOrText) {
    if let NodeOrText::AppendText(ref text) = child {
        if let Some(h) = parent.children.borrow().last() {
            if append_to_existing_text(h, text) {
                return;
            }
        }
    }

    append(
        parent,
        match child {
            NodeOrText::AppendText(text) => Node::new(NodeData::Text {
                contents: RefCell::new(text),
            }),
            NodeOrText::AppendNode(node) => {
                remove_from_parent(&node);
                node
            },
        },
    );
}

/// Insert a node or text immediately before `sibling` in its parent's
/// child list. Text coalesces with the preceding text node if there is
/// one.
///
/// # Panics
///
/// Panics if `sibling` has no parent.
pub fn insert_before(sibling: &Handle, child: NodeOrText) {
    let (parent, i) =
        get_parent_and_index(sibling).expect("insert_before called on node without parent");

    let child = match (child, i) {
        // No previous node.
        (NodeOrText::AppendText(text), 0) => Node::new(NodeData::Text {
            contents: RefCell::new(text),
        }),

        // Look for a text node before the insertion point.
        (NodeOrText::AppendText(text), i) => {
            let children = parent.children.borrow();
            let prev = &children[i - 1];
            if append_to_existing_text(prev, &text) {
                return;
            }
            Node::new(NodeData::Text {
                contents: RefCell::new(text),
            })
        },

        // Any other kind of node.
        (NodeOrText::AppendNode(node), _) => node,
    };

    remove_from_parent(&child);

    child.parent.set(Some(Rc::downgrade(&parent)));
    parent.children.borrow_mut().insert(i, child);
}

/// The foster-parenting fallback: insert before `element` if it has a
/// parent, otherwise append to `prev_element`.
pub fn append_based_on_parent_node(element: &Handle, prev_element: &Handle, child: NodeOrText) {
    if element.parent().is_some() {
        insert_before(element, child);
    } else {
        append_child(prev_element, child);
    }
}

/// Detach a node from its parent, clearing the sibling links. A no-op for
/// nodes that are already detached.
pub fn remove_from_parent(target: &Handle) {
    if let Some((parent, i)) = get_parent_and_index(target) {
        parent.children.borrow_mut().remove(i);
        target.parent.set(None);
    }
}

/// Remove `child` from `parent`.
///
/// # Panics
///
/// Panics in debug builds if `child` is not actually a child of `parent`.
pub fn remove_child(parent: &Handle, child: &Handle) {
    debug_assert!(child
        .parent()
        .is_some_and(|actual| Rc::ptr_eq(&actual, parent)));
    remove_from_parent(child);
}

/// Move all of `node`'s children to the end of `new_parent`'s child list.
pub fn reparent_children(node: &Handle, new_parent: &Handle) {
    let mut children = node.children.borrow_mut();
    let mut new_children = new_parent.children.borrow_mut();
    for child in children.iter() {
        let previous_parent = child.parent.replace(Some(Rc::downgrade(new_parent)));
        debug_assert!(previous_parent
            .and_then(|p| p.upgrade())
            .is_some_and(|p| Rc::ptr_eq(&p, node)));
    }
    new_children.extend(mem::take(&mut *children));
}

/// Add each attribute whose name is not already present on the element.
pub fn add_attrs_if_missing(target: &Handle, attrs: Vec<Attribute>) {
    let NodeData::Element {
        attrs: ref existing,
        ..
    } = target.data
    else {
        panic!("not an element!");
    };
    let mut existing = existing.borrow_mut();

    let existing_names = existing
        .iter()
        .map(|e| e.name.clone())
        .collect::<HashSet<_>>();
    existing.extend(
        attrs
            .into_iter()
            .filter(|attr| !existing_names.contains(&attr.name)),
    );
}

/// The result of parsing: the document root plus the diagnostics and
/// quirks mode that go with it.
pub struct Document {
    /// The `Document` node at the root of the tree.
    pub document: Handle,

    /// Parse diagnostics, in roughly source order. Always advisory; a
    /// tree is produced no matter what.
    pub errors: Vec<ParseError>,

    /// The document's quirks mode, as determined by the DOCTYPE.
    pub quirks_mode: QuirksMode,
}

impl Default for Document {
    fn default() -> Document {
        Document {
            document: Node::new(NodeData::Document),
            errors: vec![],
            quirks_mode: QuirksMode::NoQuirks,
        }
    }
}

impl Document {
    /// The single `html` element child of the document, if parsing
    /// produced one.
    pub fn root_element(&self) -> Option<Handle> {
        self.document
            .children
            .borrow()
            .iter()
            .find(|node| {
                matches!(node.data, NodeData::Element { ref name, .. }
                    if name.expanded() == expanded_name!(html "html"))
            })
            .cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tendril::SliceExt;

    fn elem(name: &str) -> Handle {
        create_element(
            QualName::new(None, ns!(html), LocalName::from(name)),
            vec![],
        )
    }

    fn text(t: &str) -> NodeOrText {
        NodeOrText::AppendText(t.to_tendril())
    }

    #[test]
    fn append_and_traverse() {
        let parent = elem("div");
        let a = elem("a");
        let b = elem("b");
        append_child(&parent, NodeOrText::AppendNode(a.clone()));
        append_child(&parent, NodeOrText::AppendNode(b.clone()));

        assert!(Rc::ptr_eq(&parent.first_child().unwrap(), &a));
        assert!(Rc::ptr_eq(&parent.last_child().unwrap(), &b));
        assert!(Rc::ptr_eq(&a.next_sibling().unwrap(), &b));
        assert!(Rc::ptr_eq(&b.prev_sibling().unwrap(), &a));
        assert!(a.prev_sibling().is_none());
        assert!(b.next_sibling().is_none());
        assert!(Rc::ptr_eq(&a.parent().unwrap(), &parent));
    }

    #[test]
    fn adjacent_text_coalesces() {
        let parent = elem("p");
        append_child(&parent, text("one"));
        append_child(&parent, text(" two"));
        assert_eq!(parent.children.borrow().len(), 1);
        assert_eq!(&*parent.inner_text(), "one two");
    }

    #[test]
    fn insert_before_keeps_sibling_order() {
        let parent = elem("p");
        let a = elem("a");
        let c = elem("c");
        append_child(&parent, NodeOrText::AppendNode(a.clone()));
        append_child(&parent, NodeOrText::AppendNode(c.clone()));

        let b = elem("b");
        insert_before(&c, NodeOrText::AppendNode(b.clone()));
        assert!(Rc::ptr_eq(&a.next_sibling().unwrap(), &b));
        assert!(Rc::ptr_eq(&b.next_sibling().unwrap(), &c));
    }

    #[test]
    fn append_reparents_atomically() {
        let first = elem("div");
        let second = elem("div");
        let child = elem("span");
        append_child(&first, NodeOrText::AppendNode(child.clone()));
        append_child(&second, NodeOrText::AppendNode(child.clone()));

        assert!(first.children.borrow().is_empty());
        assert!(Rc::ptr_eq(&child.parent().unwrap(), &second));
    }

    #[test]
    fn remove_clears_links() {
        let parent = elem("div");
        let child = elem("span");
        append_child(&parent, NodeOrText::AppendNode(child.clone()));
        remove_child(&parent, &child);

        assert!(parent.children.borrow().is_empty());
        assert!(child.parent().is_none());
        assert!(child.next_sibling().is_none());
        assert!(child.prev_sibling().is_none());
    }

    #[test]
    fn inner_text_walks_descendants() {
        let outer = elem("div");
        let inner = elem("em");
        append_child(&outer, text("x"));
        append_child(&inner, text("y"));
        append_child(&outer, NodeOrText::AppendNode(inner));
        append_child(&outer, text("z"));
        assert_eq!(&*outer.inner_text(), "xyz");
    }

    #[test]
    fn attrs_preserve_insertion_order() {
        let e = elem("input");
        e.set_attr("type", "button".to_tendril());
        e.set_attr("value", "ok".to_tendril());
        e.set_attr("type", "submit".to_tendril());

        let NodeData::Element { ref attrs, .. } = e.data else {
            unreachable!()
        };
        let names: Vec<_> = attrs
            .borrow()
            .iter()
            .map(|a| a.name.local.to_string())
            .collect();
        assert_eq!(names, ["type", "value"]);
        assert_eq!(e.attr("type").as_deref(), Some("submit"));
        assert_eq!(e.attr("missing"), None);
    }

    #[test]
    fn clone_shallow_detaches() {
        let parent = elem("div");
        let child = elem("span");
        append_child(&parent, NodeOrText::AppendNode(child.clone()));
        append_child(&child, text("x"));

        let copy = child.clone_shallow();
        assert!(copy.parent().is_none());
        assert!(copy.children.borrow().is_empty());
        assert!(matches!(copy.data, NodeData::Element { ref name, .. }
            if name.local == local_name!("span")));
    }

    #[test]
    fn annotation_xml_integration_point_flag() {
        let plain = create_element(
            QualName::new(None, ns!(mathml), LocalName::from("annotation-xml")),
            vec![],
        );
        assert!(!is_mathml_annotation_xml_integration_point(&plain));

        let attrs = vec![Attribute {
            name: QualName::new(None, ns!(), local_name!("encoding")),
            value: "Text/HTML".to_tendril(),
        }];
        let ip = create_element(
            QualName::new(None, ns!(mathml), LocalName::from("annotation-xml")),
            attrs,
        );
        assert!(is_mathml_annotation_xml_integration_point(&ip));
    }
}
