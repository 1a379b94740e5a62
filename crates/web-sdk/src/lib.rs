//! Client-side behavioral telemetry: automatic capture of clicks, page
//! loads, virtual navigation and page close, assembled into envelopes and
//! posted to a collection endpoint.
//!
//! # Modules
//!
//! - [`dom`], [`signal`], [`history`], [`environment`], [`identity`] — host seams
//! - [`path`] — structural paths and relative pointer offsets
//! - [`session`] — page-view dwell intervals
//! - [`capture`] — signal subscriptions and event derivation
//! - [`install`] — one-shot installation of the enabled features
//! - [`reporter`] — envelope assembly and delivery
//! - [`tracker`] — the per-page facade
//! - [`sim`] — an in-memory browser for tests and replay
//! - `browser` — `web-sys` host handles and the `WebTracker` export (wasm32)

pub mod capture;
pub mod dom;
pub mod environment;
pub mod history;
pub mod identity;
pub mod install;
pub mod page;
pub mod path;
pub mod reporter;
pub mod session;
pub mod signal;
pub mod sim;
pub mod tracker;

#[cfg(target_arch = "wasm32")]
pub mod browser;

pub use capture::{classify, CaptureRegistry, SignalClass, TRACKER_KEY_ATTRIBUTE};
pub use dom::{Dom, Point, Rect};
pub use environment::Environment;
pub use history::{CallHook, HistoryFn, HistoryInterceptor, HistoryResult, HistorySurface};
pub use identity::{DeviceIdentity, KeyValueStore, MemoryStore, DEVICE_ID_KEY};
pub use install::{InstallCoordinator, InstallState};
pub use page::Page;
pub use path::PathResolver;
pub use reporter::Reporter;
pub use session::SessionClock;
pub use signal::{Binding, BindingApi, GlobalTarget, RawSignal, SignalTarget};
pub use tracker::{InstallOutcome, Tracker};

#[cfg(target_arch = "wasm32")]
pub use browser::{WebTracker, XhrTransport};
