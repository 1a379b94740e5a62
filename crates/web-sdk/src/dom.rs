//! Document access seam.
//!
//! Path resolution and pointer geometry only need a handful of DOM
//! queries. [`Dom`] exposes exactly those so the same capture logic runs
//! against `web-sys` in the browser and against the in-memory [`crate::sim`]
//! document in tests.

use std::fmt::Debug;

/// A point in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Viewport-relative bounding box, as `getBoundingClientRect` reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
            width,
            height,
        }
    }

    /// Width and height, falling back to the edge differences when an
    /// engine reports zero dimensions.
    pub fn dimensions(&self) -> (f64, f64) {
        let width = if self.width != 0.0 {
            self.width
        } else {
            self.right - self.left
        };
        let height = if self.height != 0.0 {
            self.height
        } else {
            self.bottom - self.top
        };
        (width, height)
    }
}

/// Read-only queries against the hosting document.
pub trait Dom {
    type Element: Clone + PartialEq + Debug;

    /// `instanceof HTMLElement`.
    fn is_html_element(&self, el: &Self::Element) -> bool;
    /// Tag name as the engine reports it; `None` for non-element nodes.
    fn tag_name(&self, el: &Self::Element) -> Option<String>;
    fn id(&self, el: &Self::Element) -> Option<String>;
    fn class_name(&self, el: &Self::Element) -> Option<String>;
    fn name(&self, el: &Self::Element) -> Option<String>;
    fn attribute(&self, el: &Self::Element, name: &str) -> Option<String>;
    fn parent(&self, el: &Self::Element) -> Option<Self::Element>;
    /// Element children of `el`, in document order.
    fn children(&self, el: &Self::Element) -> Vec<Self::Element>;
    fn bounding_rect(&self, el: &Self::Element) -> Option<Rect>;

    fn element_by_id(&self, id: &str) -> Option<Self::Element>;
    fn elements_by_name(&self, name: &str) -> Vec<Self::Element>;
    /// First match of a CSS selector; `None` on no match or a selector the
    /// engine rejects.
    fn query_selector(&self, selector: &str) -> Option<Self::Element>;

    /// Scroll offsets of the document scrolling element: `documentElement`
    /// when it exposes them, `body` otherwise.
    fn scroll_offset(&self) -> Point;
}
