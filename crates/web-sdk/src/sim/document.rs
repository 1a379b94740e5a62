//! In-memory document tree implementing [`Dom`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::dom::{Dom, Point, Rect};
use crate::sim::selector::{self, Compound};

/// Handle of an element in a [`SimDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    html: bool,
    id: Option<String>,
    class_name: Option<String>,
    name: Option<String>,
    attributes: HashMap<String, String>,
    rect: Option<Rect>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Builder for an element appended to a [`SimDocument`].
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    html: bool,
    id: Option<String>,
    class_name: Option<String>,
    name: Option<String>,
    attributes: HashMap<String, String>,
    rect: Option<Rect>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            html: true,
            id: None,
            class_name: None,
            name: None,
            attributes: HashMap::new(),
            rect: Some(Rect::default()),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    /// Element without `getBoundingClientRect`.
    pub fn without_geometry(mut self) -> Self {
        self.rect = None;
        self
    }

    /// A node that is not an element, such as a shadow root or document
    /// fragment hosting elements.
    pub fn fragment() -> Self {
        Self {
            html: false,
            rect: None,
            ..Self::new("")
        }
    }

    /// Element outside the HTML namespace (e.g. inline SVG).
    pub fn non_html(mut self) -> Self {
        self.html = false;
        self
    }
}

/// A mutable in-memory document rooted at `<html><body>`.
pub struct SimDocument {
    nodes: RefCell<Vec<NodeData>>,
    scroll: Cell<Point>,
    root_scrolls: Cell<bool>,
    body_scroll: Cell<Point>,
}

impl Default for SimDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDocument {
    pub fn new() -> Self {
        let doc = Self {
            nodes: RefCell::new(Vec::new()),
            scroll: Cell::new(Point::default()),
            root_scrolls: Cell::new(true),
            body_scroll: Cell::new(Point::default()),
        };
        doc.push(None, ElementSpec::new("html"));
        doc.push(Some(0), ElementSpec::new("body"));
        doc
    }

    pub fn html(&self) -> NodeRef {
        NodeRef(0)
    }

    pub fn body(&self) -> NodeRef {
        NodeRef(1)
    }

    pub fn append(&self, parent: NodeRef, spec: ElementSpec) -> NodeRef {
        self.push(Some(parent.0), spec)
    }

    pub fn set_attribute(&self, el: NodeRef, name: &str, value: &str) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(el.0) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn set_rect(&self, el: NodeRef, rect: Rect) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(el.0) {
            node.rect = Some(rect);
        }
    }

    /// Scroll offsets reported by `documentElement`.
    pub fn set_scroll(&self, offset: Point) {
        self.scroll.set(offset);
    }

    /// Model an engine whose `documentElement` has no scroll offsets, so
    /// the body is the scrolling element.
    pub fn scroll_body_instead(&self, offset: Point) {
        self.root_scrolls.set(false);
        self.body_scroll.set(offset);
    }

    /// Scroll offsets of an overflowing body. Only read when
    /// `documentElement` has none.
    pub fn set_body_scroll(&self, offset: Point) {
        self.body_scroll.set(offset);
    }

    fn push(&self, parent: Option<usize>, spec: ElementSpec) -> NodeRef {
        let mut nodes = self.nodes.borrow_mut();
        let index = nodes.len();
        let tag = if spec.html {
            spec.tag.to_uppercase()
        } else {
            spec.tag
        };
        nodes.push(NodeData {
            tag,
            html: spec.html,
            id: spec.id,
            class_name: spec.class_name,
            name: spec.name,
            attributes: spec.attributes,
            rect: spec.rect,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            nodes[p].children.push(index);
        }
        NodeRef(index)
    }

    fn with_node<T>(&self, el: &NodeRef, f: impl FnOnce(&NodeData) -> T) -> Option<T> {
        self.nodes.borrow().get(el.0).map(f)
    }

    /// Every element in document (pre-)order.
    fn document_order(&self) -> Vec<usize> {
        let nodes = self.nodes.borrow();
        let mut order = Vec::with_capacity(nodes.len());
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(nodes[i].children.iter().rev());
        }
        order
    }

    fn matches_compound(&self, nodes: &[NodeData], index: usize, compound: &Compound) -> bool {
        let node = &nodes[index];
        if let Some(tag) = &compound.tag {
            if !node.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &compound.id {
            if node.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        let classes: Vec<&str> = node
            .class_name
            .as_deref()
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default();
        if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
        for (attr, value) in &compound.attributes {
            let actual = match attr.as_str() {
                "name" => node.name.clone(),
                "id" => node.id.clone(),
                "class" => node.class_name.clone(),
                other => node.attributes.get(other).cloned(),
            };
            if actual.as_deref() != Some(value.as_str()) {
                return false;
            }
        }
        if let Some(n) = compound.nth_child {
            let position = node
                .parent
                .and_then(|p| nodes[p].children.iter().position(|c| *c == index));
            if position.map(|p| p + 1) != Some(n) {
                return false;
            }
        }
        true
    }

    fn matches_chain(&self, nodes: &[NodeData], index: usize, chain: &[Compound]) -> bool {
        let Some((last, rest)) = chain.split_last() else {
            return true;
        };
        if !self.matches_compound(nodes, index, last) {
            return false;
        }
        if rest.is_empty() {
            return true;
        }
        match nodes[index].parent {
            Some(parent) => self.matches_chain(nodes, parent, rest),
            None => false,
        }
    }
}

impl Dom for SimDocument {
    type Element = NodeRef;

    fn is_html_element(&self, el: &NodeRef) -> bool {
        self.with_node(el, |n| n.html).unwrap_or(false)
    }

    fn tag_name(&self, el: &NodeRef) -> Option<String> {
        self.with_node(el, |n| n.tag.clone())
            .filter(|tag| !tag.is_empty())
    }

    fn id(&self, el: &NodeRef) -> Option<String> {
        self.with_node(el, |n| n.id.clone()).flatten()
    }

    fn class_name(&self, el: &NodeRef) -> Option<String> {
        self.with_node(el, |n| n.class_name.clone()).flatten()
    }

    fn name(&self, el: &NodeRef) -> Option<String> {
        self.with_node(el, |n| n.name.clone()).flatten()
    }

    fn attribute(&self, el: &NodeRef, name: &str) -> Option<String> {
        self.with_node(el, |n| match name {
            "id" => n.id.clone(),
            "class" => n.class_name.clone(),
            "name" => n.name.clone(),
            other => n.attributes.get(other).cloned(),
        })
        .flatten()
    }

    fn parent(&self, el: &NodeRef) -> Option<NodeRef> {
        self.with_node(el, |n| n.parent.map(NodeRef)).flatten()
    }

    fn children(&self, el: &NodeRef) -> Vec<NodeRef> {
        self.with_node(el, |n| n.children.iter().copied().map(NodeRef).collect())
            .unwrap_or_default()
    }

    fn bounding_rect(&self, el: &NodeRef) -> Option<Rect> {
        self.with_node(el, |n| n.rect).flatten()
    }

    fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        let nodes = self.nodes.borrow();
        self.document_order()
            .into_iter()
            .find(|i| nodes[*i].id.as_deref() == Some(id))
            .map(NodeRef)
    }

    fn elements_by_name(&self, name: &str) -> Vec<NodeRef> {
        let nodes = self.nodes.borrow();
        self.document_order()
            .into_iter()
            .filter(|i| nodes[*i].name.as_deref() == Some(name))
            .map(NodeRef)
            .collect()
    }

    fn query_selector(&self, query: &str) -> Option<NodeRef> {
        let chain = selector::parse(query)?;
        let order = self.document_order();
        let nodes = self.nodes.borrow();
        order
            .into_iter()
            .find(|i| self.matches_chain(&nodes, *i, &chain))
            .map(NodeRef)
    }

    fn scroll_offset(&self) -> Point {
        if self.root_scrolls.get() {
            self.scroll.get()
        } else {
            self.body_scroll.get()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_shape() {
        let doc = SimDocument::new();
        let body = doc.body();
        let div = doc.append(body, ElementSpec::new("div").id("a"));
        assert_eq!(doc.parent(&div), Some(body));
        assert_eq!(doc.parent(&body), Some(doc.html()));
        assert_eq!(doc.parent(&doc.html()), None);
        assert_eq!(doc.children(&body), vec![div]);
        assert_eq!(doc.tag_name(&div).as_deref(), Some("DIV"));
    }

    #[test]
    fn test_query_selector_document_order() {
        let doc = SimDocument::new();
        let body = doc.body();
        let first = doc.append(body, ElementSpec::new("section"));
        let second = doc.append(body, ElementSpec::new("section"));
        let nested = doc.append(first, ElementSpec::new("p"));
        let later = doc.append(second, ElementSpec::new("p"));

        assert_eq!(doc.query_selector("p"), Some(nested));
        assert_eq!(doc.query_selector("section:nth-child(2)>p"), Some(later));
        assert_eq!(doc.query_selector("body>section>p"), Some(nested));
        assert_eq!(doc.query_selector("article"), None);
        assert_eq!(doc.query_selector("p p"), None);
    }

    #[test]
    fn test_lookups_by_id_and_name() {
        let doc = SimDocument::new();
        let body = doc.body();
        let input = doc.append(body, ElementSpec::new("input").name("q").id("search"));
        assert_eq!(doc.element_by_id("search"), Some(input));
        assert_eq!(doc.element_by_id("#search"), None);
        assert_eq!(doc.elements_by_name("q"), vec![input]);
        assert_eq!(doc.query_selector("#search"), Some(input));
        assert_eq!(doc.query_selector("input[name=q]"), Some(input));
    }

    #[test]
    fn test_attributes() {
        let doc = SimDocument::new();
        let body = doc.body();
        let button = doc.append(body, ElementSpec::new("button").attr("tracker-key", "buy"));
        assert_eq!(doc.attribute(&button, "tracker-key").as_deref(), Some("buy"));
        doc.set_attribute(button, "tracker-key", "");
        assert_eq!(doc.attribute(&button, "tracker-key").as_deref(), Some(""));
        assert_eq!(doc.attribute(&button, "missing"), None);
    }

    #[test]
    fn test_scroll_source_fallback() {
        let doc = SimDocument::new();
        doc.set_scroll(Point::new(1.0, 2.0));
        assert_eq!(doc.scroll_offset(), Point::new(1.0, 2.0));
        doc.scroll_body_instead(Point::new(5.0, 6.0));
        assert_eq!(doc.scroll_offset(), Point::new(5.0, 6.0));
    }

    #[test]
    fn test_scroll_source_chosen_once() {
        let doc = SimDocument::new();
        doc.set_scroll(Point::new(0.0, 300.0));
        doc.set_body_scroll(Point::new(40.0, 0.0));
        assert_eq!(doc.scroll_offset(), Point::new(0.0, 300.0));
    }
}
