//! Captured-event payloads and the outbound envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Position of a pointer event inside its target, plus the target's
/// structural path (URI-component encoded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerPayload {
    pub dom_path: String,
    pub offset_x: String,
    pub offset_y: String,
}

/// Whether a navigation boundary closes the page or enters a new view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BoundaryTag {
    Leaving,
    Entering,
}

impl From<BoundaryTag> for u8 {
    fn from(tag: BoundaryTag) -> u8 {
        match tag {
            BoundaryTag::Leaving => 0,
            BoundaryTag::Entering => 1,
        }
    }
}

impl TryFrom<u8> for BoundaryTag {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BoundaryTag::Leaving),
            1 => Ok(BoundaryTag::Entering),
            other => Err(format!("unknown boundary tag {other}")),
        }
    }
}

/// Dwell interval of the view that a navigation boundary just ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryPayload {
    /// `None` until the first page load marks a boundary.
    pub page_in_time: Option<i64>,
    pub page_out_time: i64,
    pub tag: BoundaryTag,
}

/// Event-class specific data attached to a captured event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Pointer(PointerPayload),
    Boundary(BoundaryPayload),
    Empty,
}

impl EventPayload {
    pub fn to_value(&self) -> Value {
        let value = match self {
            EventPayload::Pointer(p) => serde_json::to_value(p),
            EventPayload::Boundary(b) => serde_json::to_value(b),
            EventPayload::Empty => return Value::Object(Map::new()),
        };
        value.unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// A semantic event derived from one browser signal.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    /// Semantic signal name, e.g. `click` or `pushState`.
    pub event_type: String,
    /// Caller-assigned label for what was instrumented.
    pub tracking_key: String,
    pub payload: EventPayload,
}

/// Browser/engine/OS description supplied by the platform collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub engine: Option<String>,
    pub os_family: Option<String>,
    pub os_version: Option<String>,
}

/// Snapshot of `performance.timing`, epoch milliseconds per mark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    pub navigation_start: i64,
    pub unload_event_start: i64,
    pub unload_event_end: i64,
    pub redirect_start: i64,
    pub redirect_end: i64,
    pub fetch_start: i64,
    pub domain_lookup_start: i64,
    pub domain_lookup_end: i64,
    pub connect_start: i64,
    pub connect_end: i64,
    pub secure_connection_start: i64,
    pub request_start: i64,
    pub response_start: i64,
    pub response_end: i64,
    pub dom_loading: i64,
    pub dom_interactive: i64,
    pub dom_content_loaded_event_start: i64,
    pub dom_content_loaded_event_end: i64,
    pub dom_complete: i64,
    pub load_event_start: i64,
    pub load_event_end: i64,
}

/// Static page context captured at report assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub performance: NavigationTiming,
    pub title: String,
    pub url: String,
    pub event_time: i64,
    pub browser_type: Option<String>,
    pub browser_version: Option<String>,
    pub browser_engine: Option<String>,
    pub os_type: Option<String>,
    pub os_version: Option<String>,
    pub language: Option<String>,
    pub referrer: String,
}

impl PageContext {
    pub fn with_platform(mut self, platform: &PlatformInfo) -> Self {
        self.browser_type = platform.browser_name.clone();
        self.browser_version = platform.browser_version.clone();
        self.browser_engine = platform.engine.clone();
        self.os_type = platform.os_family.clone();
        self.os_version = platform.os_version.clone();
        self
    }
}

/// Identity fields and event labels of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeIdentity {
    pub user_id: Option<String>,
    pub appid: String,
    pub uuid: String,
    pub user_info: Value,
    pub event_type: String,
    pub event_id: String,
}

/// The fully assembled outbound record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    body: Map<String, Value>,
}

impl Envelope {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(body) => Some(Self { body }),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.str_field("eventType")
    }

    pub fn event_id(&self) -> Option<&str> {
        self.str_field("eventId")
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }
}
