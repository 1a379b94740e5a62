//! Real-browser host handles over `web-sys`, and the `WebTracker` export.
//!
//! Only built for `wasm32`. Listener closures and the history wrappers live
//! as long as the page.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use js_sys::{Array, Function, Reflect};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use trackkit_core::{
    NavigationTiming, OutboundRequest, PlatformInfo, SystemClock, TrackerError, TrackerResult,
    Transport, WallClock,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, HtmlElement, MouseEvent, Window, XmlHttpRequest};

use crate::dom::{Dom, Point, Rect};
use crate::environment::Environment;
use crate::history::{CallHook, HistoryFn, HistorySurface};
use crate::identity::KeyValueStore;
use crate::page::Page;
use crate::signal::{GlobalTarget, Listener, ListenerId, RawSignal, SignalTarget};
use crate::tracker::Tracker;

fn js_error(context: &str, value: JsValue) -> TrackerError {
    TrackerError::Environment(format!("{context}: {value:?}"))
}

fn to_js(value: &Value) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::UNDEFINED)
}

fn from_js(value: JsValue) -> Value {
    if value.is_undefined() {
        return Value::Null;
    }
    serde_wasm_bindgen::from_value(value).unwrap_or(Value::Null)
}

pub struct BrowserDom {
    document: Document,
}

impl Dom for BrowserDom {
    type Element = Element;

    fn is_html_element(&self, el: &Element) -> bool {
        el.dyn_ref::<HtmlElement>().is_some()
    }

    fn tag_name(&self, el: &Element) -> Option<String> {
        Some(el.tag_name())
    }

    fn id(&self, el: &Element) -> Option<String> {
        Some(el.id()).filter(|id| !id.is_empty())
    }

    fn class_name(&self, el: &Element) -> Option<String> {
        el.get_attribute("class")
    }

    fn name(&self, el: &Element) -> Option<String> {
        el.get_attribute("name")
    }

    fn attribute(&self, el: &Element, name: &str) -> Option<String> {
        el.get_attribute(name)
    }

    fn parent(&self, el: &Element) -> Option<Element> {
        el.parent_element()
    }

    fn children(&self, el: &Element) -> Vec<Element> {
        let children = el.children();
        (0..children.length())
            .filter_map(|i| children.item(i))
            .collect()
    }

    fn bounding_rect(&self, el: &Element) -> Option<Rect> {
        let has_rect = Reflect::has(el, &JsValue::from_str("getBoundingClientRect")).unwrap_or(false);
        if !has_rect {
            return None;
        }
        let r = el.get_bounding_client_rect();
        Some(Rect {
            left: r.left(),
            top: r.top(),
            right: r.right(),
            bottom: r.bottom(),
            width: r.width(),
            height: r.height(),
        })
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        self.document.get_element_by_id(id)
    }

    fn elements_by_name(&self, name: &str) -> Vec<Element> {
        let nodes = self.document.get_elements_by_name(name);
        (0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|n| n.dyn_into::<Element>().ok())
            .collect()
    }

    fn query_selector(&self, query: &str) -> Option<Element> {
        self.document.query_selector(query).ok().flatten()
    }

    fn scroll_offset(&self) -> Point {
        let source: Option<Element> = self
            .document
            .document_element()
            .or_else(|| self.document.body().map(Element::from));
        source
            .map(|e| Point::new(e.scroll_left() as f64, e.scroll_top() as f64))
            .unwrap_or_default()
    }
}

type EventClosure = Closure<dyn FnMut(Event)>;

pub struct BrowserWindow {
    window: Window,
    next_id: Cell<u64>,
    closures: RefCell<HashMap<u64, EventClosure>>,
}

impl BrowserWindow {
    fn closure(listener: Listener<Element>) -> EventClosure {
        Closure::wrap(Box::new(move |event: Event| {
            listener(&raw_signal(&event));
        }) as Box<dyn FnMut(Event)>)
    }

    fn store(&self, closure: EventClosure) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.closures.borrow_mut().insert(id, closure);
        ListenerId(id)
    }

    fn legacy_call(&self, method: &str, name: &str, callback: &JsValue) {
        let result = Reflect::get(&self.window, &JsValue::from_str(method))
            .and_then(|f| f.dyn_into::<Function>().map_err(JsValue::from))
            .and_then(|f| f.call2(&self.window, &JsValue::from_str(name), callback));
        if let Err(e) = result {
            warn!(method, signal = name, error = ?e, "legacy binding call failed");
        }
    }
}

impl GlobalTarget<Element> for BrowserWindow {
    fn supports_standard_binding(&self) -> bool {
        Reflect::has(&self.window, &JsValue::from_str("addEventListener")).unwrap_or(false)
    }

    fn add_event_listener(&self, name: &str, listener: Listener<Element>) -> ListenerId {
        let closure = Self::closure(listener);
        if let Err(e) = self
            .window
            .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
        {
            warn!(signal = name, error = ?e, "addEventListener failed");
        }
        self.store(closure)
    }

    fn remove_event_listener(&self, name: &str, id: ListenerId) {
        if let Some(closure) = self.closures.borrow_mut().remove(&id.0) {
            let _ = self
                .window
                .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
    }

    fn attach_event(&self, name: &str, listener: Listener<Element>) -> ListenerId {
        let closure = Self::closure(listener);
        self.legacy_call("attachEvent", name, closure.as_ref());
        self.store(closure)
    }

    fn detach_event(&self, name: &str, id: ListenerId) {
        if let Some(closure) = self.closures.borrow_mut().remove(&id.0) {
            self.legacy_call("detachEvent", name, closure.as_ref());
        }
    }

    fn dispatch(&self, signal: RawSignal<Element>) {
        let init = web_sys::CustomEventInit::new();
        let detail: Array = signal.arguments.iter().map(to_js).collect();
        init.set_detail(&detail);
        match web_sys::CustomEvent::new_with_event_init_dict(&signal.kind, &init) {
            Ok(event) => {
                let _ = self.window.dispatch_event(&event);
            }
            Err(e) => warn!(signal = %signal.kind, error = ?e, "synthetic event not created"),
        }
    }
}

fn signal_target(value: JsValue) -> SignalTarget<Element> {
    if let Some(el) = value.dyn_ref::<Element>() {
        SignalTarget::Element(el.clone())
    } else if value.dyn_ref::<Document>().is_some() {
        SignalTarget::Document
    } else {
        SignalTarget::Window
    }
}

fn raw_signal(event: &Event) -> RawSignal<Element> {
    let kind = event.type_();
    let target = event.target().map(|t| signal_target(t.into()));
    let src_element = Reflect::get(event, &JsValue::from_str("srcElement"))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
        .map(signal_target);

    let mut raw = RawSignal {
        kind,
        target,
        src_element,
        page: None,
        client: None,
        arguments: Vec::new(),
    };
    if let Some(mouse) = event.dyn_ref::<MouseEvent>() {
        raw.page = Some(Point::new(mouse.page_x() as f64, mouse.page_y() as f64));
        raw.client = Some(Point::new(mouse.client_x() as f64, mouse.client_y() as f64));
    }
    if let Some(custom) = event.dyn_ref::<web_sys::CustomEvent>() {
        if let Ok(args) = custom.detail().dyn_into::<Array>() {
            raw.arguments = args.iter().map(from_js).collect();
        }
    }
    raw
}

pub struct BrowserHistory {
    history: JsValue,
}

type HistoryCallback = dyn Fn(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>;
type HistoryClosure = Closure<HistoryCallback>;

impl BrowserHistory {
    fn native(&self, name: &str) -> Option<Function> {
        Reflect::get(&self.history, &JsValue::from_str(name))
            .ok()?
            .dyn_into::<Function>()
            .ok()
    }

    fn install_closure(&self, name: &str, closure: HistoryClosure) -> bool {
        if let Err(e) = Reflect::set(&self.history, &JsValue::from_str(name), closure.as_ref()) {
            warn!(method = name, error = ?e, "history method not replaced");
            return false;
        }
        closure.forget();
        true
    }
}

/// The call's arguments without trailing `undefined`, so the native method
/// sees the same arity as an unwrapped call.
fn call_arguments(state: JsValue, unused: JsValue, url: JsValue) -> Array {
    let mut args = vec![state, unused, url];
    while args.last().is_some_and(JsValue::is_undefined) {
        args.pop();
    }
    args.into_iter().collect()
}

impl HistorySurface for BrowserHistory {
    fn method(&self, name: &str) -> Option<HistoryFn> {
        let function = self.native(name)?;
        let history = self.history.clone();
        Some(Rc::new(move |args: &[Value]| {
            let js_args: Array = args.iter().map(to_js).collect();
            function
                .apply(&history, &js_args)
                .map(from_js)
                .map_err(|e| Value::String(format!("{e:?}")))
        }))
    }

    fn replace_method(&self, name: &str, method: HistoryFn) {
        let wrapper: HistoryClosure = Closure::wrap(Box::new(
            move |state: JsValue, unused: JsValue, url: JsValue| {
                let args: Vec<Value> = call_arguments(state, unused, url)
                    .iter()
                    .map(from_js)
                    .collect();
                method(&args).map(|v| to_js(&v)).map_err(|e| to_js(&e))
            },
        ) as Box<HistoryCallback>);
        self.install_closure(name, wrapper);
    }

    /// Forward the caller's JS values to the native method as they are.
    /// Its exception propagates to the caller before `after` runs, and its
    /// return value is handed back unconverted.
    fn intercept(&self, name: &str, after: CallHook) -> bool {
        let Some(original) = self.native(name) else {
            return false;
        };
        let history = self.history.clone();
        let wrapper: HistoryClosure = Closure::wrap(Box::new(
            move |state: JsValue, unused: JsValue, url: JsValue| {
                let args = call_arguments(state, unused, url);
                let result = original.apply(&history, &args)?;
                let detail: Vec<Value> = args.iter().map(from_js).collect();
                after(&detail);
                Ok(result)
            },
        ) as Box<HistoryCallback>);
        self.install_closure(name, wrapper)
    }
}

pub struct BrowserEnvironment {
    window: Window,
    document: Document,
    platform: PlatformInfo,
}

impl Environment for BrowserEnvironment {
    fn title(&self) -> String {
        self.document.title()
    }

    fn href(&self) -> Option<String> {
        self.window.location().href().ok()
    }

    fn referrer(&self) -> String {
        self.document.referrer()
    }

    fn language(&self) -> Option<String> {
        let navigator = self.window.navigator();
        navigator.language().or_else(|| {
            Reflect::get(&navigator, &JsValue::from_str("browserLanguage"))
                .ok()
                .and_then(|v| v.as_string())
        })
    }

    fn platform(&self) -> PlatformInfo {
        self.platform.clone()
    }

    fn navigation_timing(&self) -> NavigationTiming {
        let Some(t) = self.window.performance().map(|p| p.timing()) else {
            return NavigationTiming::default();
        };
        NavigationTiming {
            navigation_start: t.navigation_start() as i64,
            unload_event_start: t.unload_event_start() as i64,
            unload_event_end: t.unload_event_end() as i64,
            redirect_start: t.redirect_start() as i64,
            redirect_end: t.redirect_end() as i64,
            fetch_start: t.fetch_start() as i64,
            domain_lookup_start: t.domain_lookup_start() as i64,
            domain_lookup_end: t.domain_lookup_end() as i64,
            connect_start: t.connect_start() as i64,
            connect_end: t.connect_end() as i64,
            secure_connection_start: t.secure_connection_start() as i64,
            request_start: t.request_start() as i64,
            response_start: t.response_start() as i64,
            response_end: t.response_end() as i64,
            dom_loading: t.dom_loading() as i64,
            dom_interactive: t.dom_interactive() as i64,
            dom_content_loaded_event_start: t.dom_content_loaded_event_start() as i64,
            dom_content_loaded_event_end: t.dom_content_loaded_event_end() as i64,
            dom_complete: t.dom_complete() as i64,
            load_event_start: t.load_event_start() as i64,
            load_event_end: t.load_event_end() as i64,
        }
    }
}

pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set_item(key, value) {
            warn!(key, error = ?e, "localStorage write failed");
        }
    }
}

/// Synchronous `XMLHttpRequest` POST.
#[derive(Debug, Default, Clone, Copy)]
pub struct XhrTransport;

impl Transport for XhrTransport {
    fn send(&self, request: &OutboundRequest) -> TrackerResult<()> {
        let transport = |e: JsValue| TrackerError::Transport(format!("{e:?}"));
        let xhr = XmlHttpRequest::new().map_err(transport)?;
        xhr.open_with_async("POST", &request.url, false)
            .map_err(transport)?;
        for (name, value) in &request.headers {
            xhr.set_request_header(name, value).map_err(transport)?;
        }
        let body = serde_json::to_string(&request.body)?;
        xhr.send_with_opt_str(Some(&body)).map_err(transport)?;

        let status = xhr.status().map_err(transport)?;
        if !(200..300).contains(&status) {
            return Err(TrackerError::Transport(format!(
                "collector returned status {status}"
            )));
        }
        Ok(())
    }
}

/// Host handles for the current browser page.
pub fn browser_page(platform: PlatformInfo) -> TrackerResult<Page<Element>> {
    let window =
        web_sys::window().ok_or_else(|| TrackerError::Environment("no global window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| TrackerError::Environment("window has no document".into()))?;
    let history = Reflect::get(&window, &JsValue::from_str("history"))
        .map_err(|e| js_error("history unavailable", e))?;
    let storage = match window.local_storage() {
        Ok(Some(storage)) => Some(Rc::new(LocalStorage { storage }) as Rc<dyn KeyValueStore>),
        _ => None,
    };

    Ok(Page {
        dom: Rc::new(BrowserDom {
            document: document.clone(),
        }),
        target: Rc::new(BrowserWindow {
            window: window.clone(),
            next_id: Cell::new(1),
            closures: RefCell::new(HashMap::new()),
        }),
        history: Rc::new(BrowserHistory { history }),
        environment: Rc::new(BrowserEnvironment {
            window,
            document,
            platform,
        }),
        storage,
        clock: Rc::new(SystemClock) as Rc<dyn WallClock>,
    })
}

#[wasm_bindgen]
pub struct WebTracker {
    inner: Tracker<Element>,
}

#[wasm_bindgen]
impl WebTracker {
    /// `options` uses the construction names (`appid`, `requestUrl`,
    /// `reportWhiteList`, ...). `platform` optionally describes the browser,
    /// engine and OS.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue, platform: JsValue) -> Result<WebTracker, JsValue> {
        console_error_panic_hook::set_once();

        let options = from_js(options);
        let platform: PlatformInfo = if platform.is_undefined() || platform.is_null() {
            PlatformInfo::default()
        } else {
            serde_wasm_bindgen::from_value(platform)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse platform: {e}")))?
        };
        let page = browser_page(platform).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let transport: Arc<dyn Transport> = Arc::new(XhrTransport);
        let inner = Tracker::from_options(&options, page, transport)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = setUserId)]
    pub fn set_user_id(&self, user_id: String) {
        self.inner.set_user_id(user_id);
    }

    #[wasm_bindgen(js_name = setUserInfo)]
    pub fn set_user_info(&self, user_info: JsValue) {
        self.inner.set_user_info(from_js(user_info));
    }

    #[wasm_bindgen(js_name = setExtra)]
    pub fn set_extra(&self, extra: JsValue) {
        self.inner.set_extra(from_js(extra));
    }

    pub fn report(&self, event_type: &str, tracking_key: &str, data: JsValue) {
        let data = (!data.is_undefined() && !data.is_null()).then(|| from_js(data));
        self.inner.report(event_type, tracking_key, data);
    }

    #[wasm_bindgen(getter, js_name = deviceId)]
    pub fn device_id(&self) -> String {
        self.inner.device_id()
    }

    #[wasm_bindgen(getter)]
    pub fn installed(&self) -> bool {
        self.inner.is_installed()
    }
}
