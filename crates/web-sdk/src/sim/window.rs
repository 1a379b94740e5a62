//! In-memory `window`, `history` and environment.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use trackkit_core::{NavigationTiming, PlatformInfo};
use url::Url;

use crate::environment::Environment;
use crate::history::{HistoryFn, HistorySurface, PUSH_STATE, REPLACE_STATE};
use crate::signal::{GlobalTarget, Listener, ListenerId, RawSignal};
use crate::sim::document::NodeRef;

/// Global event target with synchronous, registration-ordered dispatch.
pub struct SimWindow {
    standard: bool,
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(String, ListenerId, Listener<NodeRef>)>>,
}

impl Default for SimWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWindow {
    pub fn new() -> Self {
        Self {
            standard: true,
            next_id: Cell::new(1),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// A window with only `attachEvent`, as old engines had.
    pub fn legacy() -> Self {
        Self {
            standard: false,
            ..Self::new()
        }
    }

    /// Listeners bound for `kind`, under either binding flavour.
    pub fn listener_count(&self, kind: &str) -> usize {
        let legacy = format!("on{kind}");
        self.listeners
            .borrow()
            .iter()
            .filter(|(name, _, _)| name == kind || *name == legacy)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn register(&self, name: &str, listener: Listener<NodeRef>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .push((name.to_string(), id, listener));
        id
    }

    fn deregister(&self, name: &str, id: ListenerId) {
        self.listeners
            .borrow_mut()
            .retain(|(n, i, _)| !(n == name && *i == id));
    }
}

impl GlobalTarget<NodeRef> for SimWindow {
    fn supports_standard_binding(&self) -> bool {
        self.standard
    }

    fn add_event_listener(&self, name: &str, listener: Listener<NodeRef>) -> ListenerId {
        self.register(name, listener)
    }

    fn remove_event_listener(&self, name: &str, id: ListenerId) {
        self.deregister(name, id)
    }

    fn attach_event(&self, name: &str, listener: Listener<NodeRef>) -> ListenerId {
        self.register(name, listener)
    }

    fn detach_event(&self, name: &str, id: ListenerId) {
        self.deregister(name, id)
    }

    fn dispatch(&self, signal: RawSignal<NodeRef>) {
        let legacy = format!("on{}", signal.kind);
        // Snapshot first: listeners may dispatch again synchronously.
        let matching: Vec<Listener<NodeRef>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _, _)| *name == signal.kind || *name == legacy)
            .map(|(_, _, l)| Rc::clone(l))
            .collect();
        for listener in matching {
            listener(&signal);
        }
    }
}

#[derive(Debug)]
struct HistoryState {
    entries: Vec<(Value, String)>,
    href: String,
}

impl HistoryState {
    /// Resolve the target URL; a different origin fails like the native
    /// `SecurityError`.
    fn resolve(&self, args: &[Value]) -> Result<String, Value> {
        let url = match args.get(2).and_then(Value::as_str) {
            Some(url) if !url.is_empty() => url,
            _ => return Ok(self.href.clone()),
        };
        let base = Url::parse(&self.href).map_err(|e| Value::String(e.to_string()))?;
        let next = base.join(url).map_err(|e| Value::String(e.to_string()))?;
        if next.origin() != base.origin() {
            return Err(Value::String(format!(
                "SecurityError: {next} is not same-origin with {base}"
            )));
        }
        Ok(next.to_string())
    }
}

/// Session history with native `pushState`/`replaceState`.
pub struct SimHistory {
    state: Rc<RefCell<HistoryState>>,
    methods: RefCell<HashMap<String, HistoryFn>>,
}

impl SimHistory {
    pub fn new(href: &str) -> Self {
        let state = Rc::new(RefCell::new(HistoryState {
            entries: vec![(Value::Null, href.to_string())],
            href: href.to_string(),
        }));

        let mut methods: HashMap<String, HistoryFn> = HashMap::new();
        let push = Rc::clone(&state);
        methods.insert(
            PUSH_STATE.to_string(),
            Rc::new(move |args: &[Value]| {
                let mut s = push.borrow_mut();
                let href = s.resolve(args)?;
                s.entries
                    .push((args.first().cloned().unwrap_or(Value::Null), href.clone()));
                s.href = href;
                Ok(Value::Null)
            }),
        );
        let replace = Rc::clone(&state);
        methods.insert(
            REPLACE_STATE.to_string(),
            Rc::new(move |args: &[Value]| {
                let mut s = replace.borrow_mut();
                let href = s.resolve(args)?;
                let state = args.first().cloned().unwrap_or(Value::Null);
                if let Some(last) = s.entries.last_mut() {
                    *last = (state, href.clone());
                }
                s.href = href;
                Ok(Value::Null)
            }),
        );

        Self {
            state,
            methods: RefCell::new(methods),
        }
    }

    pub fn href(&self) -> String {
        self.state.borrow().href.clone()
    }

    /// Navigate within the document (e.g. a fragment change).
    pub fn set_href(&self, href: &str) {
        let mut s = self.state.borrow_mut();
        s.entries.push((Value::Null, href.to_string()));
        s.href = href.to_string();
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    pub fn current_state(&self) -> Value {
        self.state
            .borrow()
            .entries
            .last()
            .map(|(state, _)| state.clone())
            .unwrap_or(Value::Null)
    }
}

impl HistorySurface for SimHistory {
    fn method(&self, name: &str) -> Option<HistoryFn> {
        self.methods.borrow().get(name).cloned()
    }

    fn replace_method(&self, name: &str, method: HistoryFn) {
        self.methods.borrow_mut().insert(name.to_string(), method);
    }
}

/// Title, referrer, language, platform and timing of a simulated page.
pub struct SimEnvironment {
    history: Rc<SimHistory>,
    has_location: Cell<bool>,
    title: RefCell<String>,
    referrer: RefCell<String>,
    language: RefCell<Option<String>>,
    platform: RefCell<PlatformInfo>,
    timing: RefCell<NavigationTiming>,
}

impl SimEnvironment {
    pub fn new(history: Rc<SimHistory>) -> Self {
        Self {
            history,
            has_location: Cell::new(true),
            title: RefCell::new(String::new()),
            referrer: RefCell::new(String::new()),
            language: RefCell::new(Some("en-US".to_string())),
            platform: RefCell::new(PlatformInfo::default()),
            timing: RefCell::new(NavigationTiming::default()),
        }
    }

    pub fn set_title(&self, title: &str) {
        *self.title.borrow_mut() = title.to_string();
    }

    pub fn set_referrer(&self, referrer: &str) {
        *self.referrer.borrow_mut() = referrer.to_string();
    }

    pub fn set_language(&self, language: Option<&str>) {
        *self.language.borrow_mut() = language.map(str::to_string);
    }

    pub fn set_platform(&self, platform: PlatformInfo) {
        *self.platform.borrow_mut() = platform;
    }

    pub fn set_timing(&self, timing: NavigationTiming) {
        *self.timing.borrow_mut() = timing;
    }

    /// Model a host without `window.location`.
    pub fn remove_location(&self) {
        self.has_location.set(false);
    }
}

impl Environment for SimEnvironment {
    fn title(&self) -> String {
        self.title.borrow().clone()
    }

    fn href(&self) -> Option<String> {
        self.has_location.get().then(|| self.history.href())
    }

    fn referrer(&self) -> String {
        self.referrer.borrow().clone()
    }

    fn language(&self) -> Option<String> {
        self.language.borrow().clone()
    }

    fn platform(&self) -> PlatformInfo {
        self.platform.borrow().clone()
    }

    fn navigation_timing(&self) -> NavigationTiming {
        self.timing.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalTarget;
    use serde_json::json;

    #[test]
    fn test_dispatch_in_registration_order() {
        let window = SimWindow::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = order.clone();
            window.add_event_listener(
                "click",
                Rc::new(move |_: &RawSignal<NodeRef>| order.borrow_mut().push(tag)),
            );
        }
        window.dispatch(RawSignal::new("click", SignalTarget::Window));
        window.dispatch(RawSignal::new("load", SignalTarget::Window));
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_remove_listener() {
        let window = SimWindow::new();
        let id = window.add_event_listener("load", Rc::new(|_: &RawSignal<NodeRef>| {}));
        assert_eq!(window.listener_count("load"), 1);
        window.remove_event_listener("load", id);
        assert_eq!(window.listener_count("load"), 0);
    }

    #[test]
    fn test_legacy_names_receive_dispatch() {
        let window = SimWindow::legacy();
        assert!(!window.supports_standard_binding());
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        window.attach_event(
            "onclick",
            Rc::new(move |_: &RawSignal<NodeRef>| counter.set(counter.get() + 1)),
        );
        window.dispatch(RawSignal::new("click", SignalTarget::Document));
        assert_eq!(hits.get(), 1);
        assert_eq!(window.listener_count("click"), 1);
    }

    #[test]
    fn test_native_history_methods() {
        let history = SimHistory::new("https://shop.test/a");
        history.call(PUSH_STATE, &[json!({"n": 1}), json!(""), json!("/b?x=1")]);
        assert_eq!(history.href(), "https://shop.test/b?x=1");
        assert_eq!(history.current_state(), json!({"n": 1}));
        assert_eq!(history.len(), 2);

        history.call(REPLACE_STATE, &[json!(null), json!("")]);
        assert_eq!(history.href(), "https://shop.test/b?x=1");
        assert_eq!(history.len(), 2);
        assert_eq!(history.current_state(), Value::Null);

        let rejected = history.call(PUSH_STATE, &[json!({}), json!(""), json!("https://other.test/")]);
        assert!(matches!(rejected, Some(Err(_))));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_environment_tracks_location() {
        let history = Rc::new(SimHistory::new("https://shop.test/"));
        let env = SimEnvironment::new(history.clone());
        history.set_href("https://shop.test/#faq");
        assert_eq!(env.href().as_deref(), Some("https://shop.test/#faq"));
        assert_eq!(env.hostname().as_deref(), Some("shop.test"));
        env.remove_location();
        assert_eq!(env.hostname(), None);
    }
}
