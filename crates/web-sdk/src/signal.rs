//! Raw browser signals and the global event target they are bound on.

use std::rc::Rc;

use serde_json::Value;

use crate::dom::Point;

/// What a signal was dispatched at.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalTarget<E> {
    Window,
    Document,
    Element(E),
}

impl<E> SignalTarget<E> {
    pub fn element(&self) -> Option<&E> {
        match self {
            SignalTarget::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// A browser event as delivered to a listener, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal<E> {
    pub kind: String,
    pub target: Option<SignalTarget<E>>,
    /// Legacy engines report the origin here instead of `target`.
    pub src_element: Option<SignalTarget<E>>,
    pub page: Option<Point>,
    pub client: Option<Point>,
    /// Arguments of the intercepted call for synthetic history signals.
    pub arguments: Vec<Value>,
}

impl<E> RawSignal<E> {
    pub fn new(kind: impl Into<String>, target: SignalTarget<E>) -> Self {
        Self {
            kind: kind.into(),
            target: Some(target),
            src_element: None,
            page: None,
            client: None,
            arguments: Vec::new(),
        }
    }

    pub fn with_client(mut self, client: Point) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_page(mut self, page: Point) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Portable shape with a guaranteed `type` and `target`. `None` when the
    /// engine gave neither `target` nor `srcElement`.
    pub fn normalize(&self) -> Option<Signal<E>>
    where
        E: Clone,
    {
        let target = self.target.clone().or_else(|| self.src_element.clone())?;
        Some(Signal {
            kind: self.kind.clone(),
            target,
            page: self.page,
            client: self.client,
            arguments: self.arguments.clone(),
        })
    }
}

/// A normalized signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal<E> {
    pub kind: String,
    pub target: SignalTarget<E>,
    pub page: Option<Point>,
    pub client: Option<Point>,
    pub arguments: Vec<Value>,
}

pub type Listener<E> = Rc<dyn Fn(&RawSignal<E>)>;

/// Handle returned when a listener is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The page's global event target (`window`).
pub trait GlobalTarget<E> {
    /// Whether `addEventListener` exists; otherwise only `attachEvent`.
    fn supports_standard_binding(&self) -> bool;
    fn add_event_listener(&self, name: &str, listener: Listener<E>) -> ListenerId;
    fn remove_event_listener(&self, name: &str, id: ListenerId);
    fn attach_event(&self, name: &str, listener: Listener<E>) -> ListenerId;
    fn detach_event(&self, name: &str, id: ListenerId);
    /// Synchronously deliver a signal to every listener bound for its kind,
    /// in registration order.
    fn dispatch(&self, signal: RawSignal<E>);
}

/// Listener binding flavour, detected once per tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingApi {
    Standard,
    Legacy,
}

/// `{bind, unbind}` over the detected binding API.
pub struct Binding<E> {
    api: BindingApi,
    target: Rc<dyn GlobalTarget<E>>,
}

impl<E> Clone for Binding<E> {
    fn clone(&self) -> Self {
        Self {
            api: self.api,
            target: Rc::clone(&self.target),
        }
    }
}

impl<E> Binding<E> {
    pub fn detect(target: Rc<dyn GlobalTarget<E>>) -> Self {
        let api = if target.supports_standard_binding() {
            BindingApi::Standard
        } else {
            BindingApi::Legacy
        };
        Self { api, target }
    }

    pub fn api(&self) -> BindingApi {
        self.api
    }

    pub fn bind(&self, signal: &str, listener: Listener<E>) -> ListenerId {
        match self.api {
            BindingApi::Standard => self.target.add_event_listener(signal, listener),
            BindingApi::Legacy => self.target.attach_event(&format!("on{signal}"), listener),
        }
    }

    pub fn unbind(&self, signal: &str, id: ListenerId) {
        match self.api {
            BindingApi::Standard => self.target.remove_event_listener(signal, id),
            BindingApi::Legacy => self.target.detach_event(&format!("on{signal}"), id),
        }
    }

    pub fn target(&self) -> &Rc<dyn GlobalTarget<E>> {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefers_target() {
        let raw = RawSignal {
            kind: "click".to_string(),
            target: Some(SignalTarget::Element(1u32)),
            src_element: Some(SignalTarget::Element(2u32)),
            page: None,
            client: Some(Point::new(3.0, 4.0)),
            arguments: Vec::new(),
        };
        let signal = raw.normalize().unwrap();
        assert_eq!(signal.kind, "click");
        assert_eq!(signal.target, SignalTarget::Element(1));
        assert_eq!(signal.client, Some(Point::new(3.0, 4.0)));
    }

    #[test]
    fn test_normalize_falls_back_to_src_element() {
        let mut raw = RawSignal::new("click", SignalTarget::Element(9u32));
        raw.target = None;
        raw.src_element = Some(SignalTarget::Element(5));
        assert_eq!(raw.normalize().unwrap().target, SignalTarget::Element(5));
    }

    #[test]
    fn test_normalize_without_any_target_fails() {
        let mut raw: RawSignal<u32> = RawSignal::new("click", SignalTarget::Window);
        raw.target = None;
        assert!(raw.normalize().is_none());
    }
}
