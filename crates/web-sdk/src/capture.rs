//! Signal subscriptions and derivation of captured events.
//!
//! Each subscription binds one listener on the global target. The listener
//! normalizes the raw signal, classifies it by the subscribed name and hands
//! the derived event to the reporter. Derivation failures drop the event.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::debug;
use trackkit_core::{
    BoundaryPayload, BoundaryTag, CapturedEvent, EventPayload, PathMode, PointerPayload,
};

use crate::dom::Dom;
use crate::path::{encode_uri_component, PathResolver};
use crate::reporter::Reporter;
use crate::session::SessionClock;
use crate::signal::{Binding, Listener, ListenerId, RawSignal};

pub const TRACKER_KEY_ATTRIBUTE: &str = "tracker-key";

pub const POINTER_SIGNALS: [&str; 8] = [
    "click",
    "dblclick",
    "contextmenu",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseout",
    "mouseover",
];

pub const BOUNDARY_SIGNALS: [&str; 5] = [
    "popstate",
    "pushState",
    "replaceState",
    "hashchange",
    "beforeunload",
];

pub const LOAD_SIGNAL: &str = "load";
pub const UNLOAD_SIGNAL: &str = "beforeunload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    Pointer,
    Boundary(BoundaryTag),
    Other,
}

pub fn classify(signal: &str) -> SignalClass {
    if POINTER_SIGNALS.contains(&signal) {
        SignalClass::Pointer
    } else if BOUNDARY_SIGNALS.contains(&signal) {
        let tag = if signal == UNLOAD_SIGNAL {
            BoundaryTag::Leaving
        } else {
            BoundaryTag::Entering
        };
        SignalClass::Boundary(tag)
    } else {
        SignalClass::Other
    }
}

/// One bound listener. `tracking_key` is `None` for the attribute-driven
/// click listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub signal: String,
    pub tracking_key: Option<String>,
    pub listener: ListenerId,
}

struct Deriver<E> {
    dom: Rc<dyn Dom<Element = E>>,
    session: Rc<SessionClock>,
    reporter: Rc<Reporter>,
    mode: PathMode,
}

impl<E: Clone + PartialEq + Debug + 'static> Deriver<E> {
    fn derive(&self, subscribed: &str, raw: &RawSignal<E>, key: &str) -> Option<CapturedEvent> {
        let Some(signal) = raw.normalize() else {
            debug!(signal = subscribed, "signal without a target ignored");
            return None;
        };
        if subscribed == LOAD_SIGNAL {
            self.session.mark_boundary();
        }

        let payload = match classify(subscribed) {
            SignalClass::Pointer => {
                let Some(element) = signal.target.element() else {
                    debug!(signal = subscribed, "pointer signal without an element target");
                    return None;
                };
                let resolver = PathResolver::new(self.dom.as_ref(), self.mode);
                let path = resolver.resolve(element);
                let Some(offset) = resolver.relative_offset(element, signal.page, signal.client)
                else {
                    debug!(signal = subscribed, path = %path, "pointer offset unavailable, event dropped");
                    return None;
                };
                let (offset_x, offset_y) = offset.formatted();
                EventPayload::Pointer(PointerPayload {
                    dom_path: encode_uri_component(&path),
                    offset_x,
                    offset_y,
                })
            }
            SignalClass::Boundary(tag) => {
                let interval = self.session.snapshot();
                self.session.mark_boundary();
                EventPayload::Boundary(BoundaryPayload {
                    page_in_time: interval.page_in_time,
                    page_out_time: interval.page_out_time,
                    tag,
                })
            }
            SignalClass::Other => EventPayload::Empty,
        };

        Some(CapturedEvent {
            event_type: signal.kind,
            tracking_key: key.to_string(),
            payload,
        })
    }
}

pub struct CaptureRegistry<E> {
    binding: Binding<E>,
    deriver: Rc<Deriver<E>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl<E: Clone + PartialEq + Debug + 'static> CaptureRegistry<E> {
    pub fn new(
        binding: Binding<E>,
        dom: Rc<dyn Dom<Element = E>>,
        session: Rc<SessionClock>,
        reporter: Rc<Reporter>,
        mode: PathMode,
    ) -> Self {
        Self {
            binding,
            deriver: Rc::new(Deriver {
                dom,
                session,
                reporter,
                mode,
            }),
            subscriptions: RefCell::new(Vec::new()),
        }
    }

    /// Bind one listener per signal name under `tracking_key`. A pair that
    /// is already bound is skipped. Returns the number of new listeners.
    pub fn subscribe(&self, signals: &[&str], tracking_key: &str) -> usize {
        let mut bound = 0;
        for signal in signals {
            if self.is_subscribed(signal, Some(tracking_key)) {
                debug!(signal, tracking_key, "already subscribed");
                continue;
            }

            let deriver = Rc::clone(&self.deriver);
            let subscribed = signal.to_string();
            let key = tracking_key.to_string();
            let listener: Listener<E> = Rc::new(move |raw: &RawSignal<E>| {
                if let Some(event) = deriver.derive(&subscribed, raw, &key) {
                    deriver.reporter.report_event(&event);
                }
            });

            let id = self.binding.bind(signal, listener);
            self.subscriptions.borrow_mut().push(Subscription {
                signal: signal.to_string(),
                tracking_key: Some(tracking_key.to_string()),
                listener: id,
            });
            bound += 1;
        }
        bound
    }

    /// Report every click on an element carrying a non-empty `attribute`,
    /// using the attribute value as the tracking key.
    pub fn subscribe_attribute_clicks(&self, attribute: &str) -> bool {
        if self.is_subscribed("click", None) {
            return false;
        }

        let deriver = Rc::clone(&self.deriver);
        let attribute = attribute.to_string();
        let listener: Listener<E> = Rc::new(move |raw: &RawSignal<E>| {
            let Some(signal) = raw.normalize() else {
                return;
            };
            let Some(element) = signal.target.element() else {
                return;
            };
            match deriver.dom.attribute(element, &attribute) {
                Some(key) if !key.is_empty() => {
                    deriver
                        .reporter
                        .report(&signal.kind, &key, &Value::Object(Map::new()));
                }
                _ => {}
            }
        });

        let id = self.binding.bind("click", listener);
        self.subscriptions.borrow_mut().push(Subscription {
            signal: "click".to_string(),
            tracking_key: None,
            listener: id,
        });
        true
    }

    /// Derive the event a signal would produce under `tracking_key`,
    /// applying the same session side effects as a bound listener.
    pub fn capture(&self, subscribed: &str, raw: &RawSignal<E>, tracking_key: &str) -> Option<CapturedEvent> {
        self.deriver.derive(subscribed, raw, tracking_key)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.borrow().clone()
    }

    /// Remove every listener this registry bound.
    pub fn clear(&self) {
        for sub in self.subscriptions.borrow_mut().drain(..) {
            self.binding.unbind(&sub.signal, sub.listener);
        }
    }

    fn is_subscribed(&self, signal: &str, tracking_key: Option<&str>) -> bool {
        self.subscriptions
            .borrow()
            .iter()
            .any(|s| s.signal == signal && s.tracking_key.as_deref() == tracking_key)
    }
}
