//! Shared building blocks of the trackkit behavioral telemetry SDK:
//! configuration, errors, envelope types and the outbound transport seam.

pub mod clock;
pub mod config;
pub mod error;
pub mod merge;
pub mod transport;
pub mod types;

pub use clock::{ManualClock, SystemClock, WallClock};
pub use config::{CaptureToggles, PathMode, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use merge::{deep_merge, merge_layers};
pub use transport::{
    capture_transport, noop_transport, CaptureTransport, NoopTransport, OutboundRequest,
    Transport,
};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::HttpTransport;
pub use types::{
    BoundaryPayload, BoundaryTag, CapturedEvent, Envelope, EnvelopeIdentity, EventPayload,
    NavigationTiming, PageContext, PlatformInfo, PointerPayload,
};
