use std::rc::Rc;

use serde_json::Value;
use trackkit_core::{ManualClock, WallClock};

use crate::dom::{Dom, Point};
use crate::environment::Environment;
use crate::history::{HistoryResult, HistorySurface, PUSH_STATE, REPLACE_STATE};
use crate::identity::{KeyValueStore, MemoryStore};
use crate::page::Page;
use crate::signal::{GlobalTarget, RawSignal, SignalTarget};
use crate::sim::document::{NodeRef, SimDocument};
use crate::sim::window::{SimEnvironment, SimHistory, SimWindow};

/// A complete simulated page with a hand-driven clock.
pub struct SimPage {
    pub document: Rc<SimDocument>,
    pub window: Rc<SimWindow>,
    pub history: Rc<SimHistory>,
    pub environment: Rc<SimEnvironment>,
    pub storage: Rc<MemoryStore>,
    pub clock: Rc<ManualClock>,
}

impl SimPage {
    pub fn new(href: &str) -> Self {
        Self::with_window(href, SimWindow::new())
    }

    pub fn with_window(href: &str, window: SimWindow) -> Self {
        let history = Rc::new(SimHistory::new(href));
        Self {
            document: Rc::new(SimDocument::new()),
            window: Rc::new(window),
            environment: Rc::new(SimEnvironment::new(Rc::clone(&history))),
            history,
            storage: Rc::new(MemoryStore::new()),
            clock: Rc::new(ManualClock::new(1_700_000_000_000)),
        }
    }

    /// Host handles for a tracker.
    pub fn page(&self) -> Page<NodeRef> {
        Page {
            dom: Rc::clone(&self.document) as Rc<dyn Dom<Element = NodeRef>>,
            target: Rc::clone(&self.window) as Rc<dyn GlobalTarget<NodeRef>>,
            history: Rc::clone(&self.history) as Rc<dyn HistorySurface>,
            environment: Rc::clone(&self.environment) as Rc<dyn Environment>,
            storage: Some(Rc::clone(&self.storage) as Rc<dyn KeyValueStore>),
            clock: Rc::clone(&self.clock) as Rc<dyn WallClock>,
        }
    }

    pub fn dispatch(&self, signal: RawSignal<NodeRef>) {
        self.window.dispatch(signal);
    }

    pub fn load(&self) {
        self.dispatch(RawSignal::new("load", SignalTarget::Document));
    }

    /// Pointer signal at `client` coordinates; page coordinates include the
    /// current scroll offset.
    pub fn pointer(&self, kind: &str, target: NodeRef, client: Point) {
        let scroll = self.document.scroll_offset();
        self.dispatch(
            RawSignal::new(kind, SignalTarget::Element(target))
                .with_client(client)
                .with_page(Point::new(client.x + scroll.x, client.y + scroll.y)),
        );
    }

    pub fn click(&self, target: NodeRef, client: Point) {
        self.pointer("click", target, client);
    }

    /// Call whatever `history.pushState` currently is.
    pub fn push_state(&self, state: Value, url: &str) -> Option<HistoryResult> {
        self.history
            .call(PUSH_STATE, &[state, Value::String(String::new()), Value::from(url)])
    }

    pub fn replace_state(&self, state: Value, url: &str) -> Option<HistoryResult> {
        self.history
            .call(REPLACE_STATE, &[state, Value::String(String::new()), Value::from(url)])
    }

    /// Change the fragment and fire `hashchange`.
    pub fn change_hash(&self, fragment: &str) {
        let href = self.history.href();
        let base = href.split('#').next().unwrap_or(&href).to_string();
        let fragment = fragment.trim_start_matches('#');
        self.history.set_href(&format!("{base}#{fragment}"));
        self.dispatch(RawSignal::new("hashchange", SignalTarget::Window));
    }

    /// Fire `beforeunload`.
    pub fn close(&self) {
        self.dispatch(RawSignal::new("beforeunload", SignalTarget::Window));
    }
}
