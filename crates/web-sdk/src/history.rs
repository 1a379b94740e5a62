//! History interception.
//!
//! `pushState` and `replaceState` change the URL without emitting any
//! event. The interceptor swaps each for a wrapper that calls the original
//! with the caller's own arguments, dispatches a same-named signal on the
//! global target carrying those arguments once the original has returned,
//! and hands back the original result. A method that throws propagates the
//! error unchanged and dispatches nothing.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::signal::{GlobalTarget, RawSignal, SignalTarget};

pub const PUSH_STATE: &str = "pushState";
pub const REPLACE_STATE: &str = "replaceState";

/// Outcome of a history call; `Err` carries whatever the method threw.
pub type HistoryResult = Result<Value, Value>;

/// A history method as a callable value.
pub type HistoryFn = Rc<dyn Fn(&[Value]) -> HistoryResult>;

/// Runs after an intercepted method returned normally.
pub type CallHook = Rc<dyn Fn(&[Value])>;

/// Read and replace named methods on the `history` object.
pub trait HistorySurface {
    fn method(&self, name: &str) -> Option<HistoryFn>;
    fn replace_method(&self, name: &str, method: HistoryFn);

    /// Replace `name` with a wrapper that runs the current method and then
    /// `after`. Hosts whose native arguments do not survive a `Value`
    /// round trip override this to forward them untouched.
    fn intercept(&self, name: &str, after: CallHook) -> bool {
        match self.method(name) {
            Some(original) => {
                self.replace_method(name, chain(original, after));
                true
            }
            None => false,
        }
    }

    /// Invoke whatever is currently installed under `name`.
    fn call(&self, name: &str, args: &[Value]) -> Option<HistoryResult> {
        self.method(name).map(|m| m(args))
    }
}

/// `original` followed by `after`, skipping `after` when `original` fails.
pub fn chain(original: HistoryFn, after: CallHook) -> HistoryFn {
    Rc::new(move |args: &[Value]| {
        let result = original(args)?;
        after(args);
        Ok(result)
    })
}

pub struct HistoryInterceptor<E> {
    history: Rc<dyn HistorySurface>,
    target: Rc<dyn GlobalTarget<E>>,
    wrapped: RefCell<HashSet<String>>,
}

impl<E: 'static> HistoryInterceptor<E> {
    pub fn new(history: Rc<dyn HistorySurface>, target: Rc<dyn GlobalTarget<E>>) -> Self {
        Self {
            history,
            target,
            wrapped: RefCell::new(HashSet::new()),
        }
    }

    fn dispatcher(&self, name: &str) -> CallHook {
        let target = Rc::clone(&self.target);
        let signal_name = name.to_string();
        Rc::new(move |args: &[Value]| {
            target.dispatch(
                RawSignal::new(signal_name.clone(), SignalTarget::Window)
                    .with_arguments(args.to_vec()),
            );
        })
    }

    /// Build the wrapper for `name` around the currently installed method.
    pub fn wrap(&self, name: &str) -> Option<HistoryFn> {
        let original = self.history.method(name)?;
        Some(chain(original, self.dispatcher(name)))
    }

    /// Install the wrapper for `name`, at most once per method name.
    /// Returns whether a wrapper was installed by this call.
    pub fn install(&self, name: &str) -> bool {
        if self.wrapped.borrow().contains(name) {
            debug!(method = name, "history method already intercepted");
            return false;
        }
        if self.history.intercept(name, self.dispatcher(name)) {
            self.wrapped.borrow_mut().insert(name.to_string());
            debug!(method = name, "history method intercepted");
            true
        } else {
            warn!(method = name, "history method missing, navigation capture skipped");
            false
        }
    }

    pub fn is_wrapped(&self, name: &str) -> bool {
        self.wrapped.borrow().contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{NodeRef, SimHistory, SimWindow};
    use serde_json::json;
    use std::cell::Cell;

    fn setup() -> (Rc<SimHistory>, Rc<SimWindow>, HistoryInterceptor<NodeRef>) {
        let window = Rc::new(SimWindow::new());
        let history = Rc::new(SimHistory::new("https://shop.test/"));
        let interceptor = HistoryInterceptor::new(
            history.clone() as Rc<dyn HistorySurface>,
            window.clone() as Rc<dyn GlobalTarget<NodeRef>>,
        );
        (history, window, interceptor)
    }

    #[test]
    fn test_wrapped_push_state_changes_url_and_emits() {
        let (history, window, interceptor) = setup();
        assert!(interceptor.install(PUSH_STATE));

        let seen: Rc<RefCell<Vec<Vec<Value>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        window.add_event_listener(
            PUSH_STATE,
            Rc::new(move |signal: &RawSignal<NodeRef>| {
                sink.borrow_mut().push(signal.arguments.clone());
            }),
        );

        let args = vec![json!({"step": 2}), json!(""), json!("/next")];
        let result = history.call(PUSH_STATE, &args);

        assert_eq!(result, Some(Ok(Value::Null)));
        assert_eq!(history.href(), "https://shop.test/next");
        assert_eq!(history.len(), 2);
        assert_eq!(*seen.borrow(), vec![args]);
    }

    #[test]
    fn test_install_is_idempotent_per_method() {
        let (history, window, interceptor) = setup();
        assert!(interceptor.install(REPLACE_STATE));
        assert!(!interceptor.install(REPLACE_STATE));
        assert!(interceptor.is_wrapped(REPLACE_STATE));
        assert!(!interceptor.is_wrapped(PUSH_STATE));

        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        window.add_event_listener(
            REPLACE_STATE,
            Rc::new(move |_: &RawSignal<NodeRef>| counter.set(counter.get() + 1)),
        );

        history.call(REPLACE_STATE, &[json!(null), json!(""), json!("/b")]);
        assert_eq!(count.get(), 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.href(), "https://shop.test/b");
    }

    #[test]
    fn test_raw_wrap_twice_double_dispatches() {
        let (history, window, interceptor) = setup();
        let first = interceptor.wrap(PUSH_STATE).unwrap();
        history.replace_method(PUSH_STATE, first);
        let second = interceptor.wrap(PUSH_STATE).unwrap();
        history.replace_method(PUSH_STATE, second);

        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        window.add_event_listener(
            PUSH_STATE,
            Rc::new(move |_: &RawSignal<NodeRef>| counter.set(counter.get() + 1)),
        );

        history.call(PUSH_STATE, &[json!({}), json!(""), json!("/x")]);
        assert_eq!(count.get(), 2);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_failed_call_propagates_and_dispatches_nothing() {
        let (history, window, interceptor) = setup();
        interceptor.install(PUSH_STATE);

        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        window.add_event_listener(
            PUSH_STATE,
            Rc::new(move |_: &RawSignal<NodeRef>| counter.set(counter.get() + 1)),
        );

        let result = history.call(
            PUSH_STATE,
            &[json!({}), json!(""), json!("https://evil.test/x")],
        );

        assert!(matches!(result, Some(Err(_))));
        assert_eq!(count.get(), 0);
        assert_eq!(history.href(), "https://shop.test/");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_signal_fires_after_original_returns() {
        let (history, window, interceptor) = setup();
        interceptor.install(PUSH_STATE);

        let seen_href = Rc::new(RefCell::new(String::new()));
        let sink = seen_href.clone();
        let observed = history.clone();
        window.add_event_listener(
            PUSH_STATE,
            Rc::new(move |_: &RawSignal<NodeRef>| *sink.borrow_mut() = observed.href()),
        );

        history.call(PUSH_STATE, &[json!({}), json!(""), json!("/after")]);
        assert_eq!(*seen_href.borrow(), "https://shop.test/after");
    }

    #[test]
    fn test_missing_method_is_skipped() {
        let (_history, _window, interceptor) = setup();
        assert!(!interceptor.install("go"));
        assert!(interceptor.wrap("go").is_none());
    }
}
