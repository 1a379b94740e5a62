//! Structural paths and relative pointer offsets for DOM elements.
//!
//! A structural path is a `>`-joined chain of element descriptors built from
//! the target upward. The walk stops as soon as the chain resolves back to
//! the target through a document-wide lookup, at an id descriptor, or at a
//! body-level descriptor.

use std::collections::VecDeque;

use tracing::warn;
use trackkit_core::PathMode;

use crate::dom::{Dom, Point};

/// Pointer position as a fraction of the target's bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeOffset {
    pub x: f64,
    pub y: f64,
}

impl RelativeOffset {
    /// Six-fractional-digit decimal strings, as sent on the wire.
    pub fn formatted(&self) -> (String, String) {
        (format!("{:.6}", self.x), format!("{:.6}", self.y))
    }
}

pub struct PathResolver<'a, D: Dom + ?Sized> {
    dom: &'a D,
    mode: PathMode,
}

impl<'a, D: Dom + ?Sized> PathResolver<'a, D> {
    pub fn new(dom: &'a D, mode: PathMode) -> Self {
        Self { dom, mode }
    }

    /// Structural locator for `element`; empty for non-HTML elements.
    pub fn resolve(&self, element: &D::Element) -> String {
        if !self.dom.is_html_element(element) {
            warn!("path requested for a node that is not an HTML element");
            return String::new();
        }

        let mut path: VecDeque<String> = VecDeque::new();
        let mut current = Some(element.clone());

        while let Some(node) = current {
            let mut desc = self.describe(&node);
            if desc.is_empty() {
                break;
            }

            path.push_front(desc.clone());
            if desc.starts_with('#')
                || desc.contains("body")
                || self.resolves_to(&path, element)
            {
                break;
            }
            path.pop_front();

            let parent = self.dom.parent(&node);
            if let Some(parent) = &parent {
                let siblings = self.dom.children(parent);
                if siblings.len() > 1 {
                    if let Some(pos) = siblings.iter().position(|s| *s == node) {
                        desc.push_str(&format!(":nth-child({})", pos + 1));
                    }
                }
            }

            path.push_front(desc);
            if self.resolves_to(&path, element) {
                break;
            }
            current = parent;
        }

        Vec::from(path).join(">")
    }

    /// Descriptor of a single element: `#id`, or the lowercase tag with
    /// optional `.class` and `[name=value]` suffixes.
    pub fn describe(&self, element: &D::Element) -> String {
        let Some(tag) = self.dom.tag_name(element) else {
            return String::new();
        };
        if let Some(id) = self.dom.id(element).filter(|id| !id.is_empty()) {
            return format!("#{id}");
        }

        let mut desc = tag.to_lowercase();
        if self.mode == PathMode::IncludeClass {
            if let Some(class_name) = self.dom.class_name(element) {
                for class in class_name.split_whitespace() {
                    desc.push('.');
                    desc.push_str(class);
                }
            }
        }
        if let Some(name) = self.dom.name(element).filter(|n| !n.is_empty()) {
            desc.push_str(&format!("[name={name}]"));
        }
        desc
    }

    /// Pointer position relative to `element`'s box. `None` when the box
    /// is unavailable or has a zero dimension, or no coordinates were given.
    pub fn relative_offset(
        &self,
        element: &D::Element,
        page: Option<Point>,
        client: Option<Point>,
    ) -> Option<RelativeOffset> {
        let rect = self.dom.bounding_rect(element)?;
        let (width, height) = rect.dimensions();
        if width == 0.0 || height == 0.0 {
            return None;
        }

        let scroll = self.dom.scroll_offset();
        let pointer = match (page, client) {
            (Some(page), _) => page,
            (None, Some(client)) => Point::new(client.x + scroll.x, client.y + scroll.y),
            (None, None) => return None,
        };

        Some(RelativeOffset {
            x: clamp_fraction((pointer.x - rect.left - scroll.x) / width),
            y: clamp_fraction((pointer.y - rect.top - scroll.y) / height),
        })
    }

    fn resolves_to(&self, path: &VecDeque<String>, element: &D::Element) -> bool {
        let query = Vec::from(path.clone()).join(">");
        self.lookup(&query).as_ref() == Some(element)
    }

    fn lookup(&self, query: &str) -> Option<D::Element> {
        self.dom
            .element_by_id(query)
            .or_else(|| self.dom.elements_by_name(query).into_iter().next())
            .or_else(|| self.dom.query_selector(query))
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// `encodeURIComponent`: percent-encode every byte outside
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
