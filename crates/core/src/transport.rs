//! Outbound transport: the trait for sending assembled envelopes to the
//! collection endpoint.
//!
//! The reporter holds an `Arc<dyn Transport>`. Sends are synchronous and
//! best-effort: a returned error is logged by the caller and dropped.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::TrackerResult;

/// Header carrying the tracker API key.
pub const APIKEY_HEADER: &str = "apikey";
/// Content type of every outbound body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One HTTP POST of a JSON envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl OutboundRequest {
    pub fn json(url: impl Into<String>, apikey: &str, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: vec![
                ("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()),
                (APIKEY_HEADER.to_string(), apikey.to_string()),
            ],
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends envelopes. Implementations post over HTTP, XHR, or capture in
/// memory for tests.
pub trait Transport: Send + Sync {
    fn send(&self, request: &OutboundRequest) -> TrackerResult<()>;
}

/// Transport that discards everything.
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send(&self, _request: &OutboundRequest) -> TrackerResult<()> {
        Ok(())
    }
}

/// In-memory transport that records every request, for tests and dry runs.
#[derive(Default)]
pub struct CaptureTransport {
    requests: Mutex<Vec<OutboundRequest>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().expect("transport mutex poisoned").clone()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .expect("transport mutex poisoned")
            .iter()
            .map(|r| r.body.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().expect("transport mutex poisoned").len()
    }

    pub fn count_event_id(&self, event_id: &str) -> usize {
        self.requests
            .lock()
            .expect("transport mutex poisoned")
            .iter()
            .filter(|r| r.body.get("eventId").and_then(Value::as_str) == Some(event_id))
            .count()
    }

    pub fn last(&self) -> Option<OutboundRequest> {
        self.requests
            .lock()
            .expect("transport mutex poisoned")
            .last()
            .cloned()
    }

    pub fn clear(&self) {
        self.requests.lock().expect("transport mutex poisoned").clear();
    }
}

impl Transport for CaptureTransport {
    fn send(&self, request: &OutboundRequest) -> TrackerResult<()> {
        self.requests
            .lock()
            .expect("transport mutex poisoned")
            .push(request.clone());
        Ok(())
    }
}

/// Blocking HTTP transport for native targets.
#[cfg(not(target_arch = "wasm32"))]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpTransport {
    pub fn new() -> TrackerResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| crate::error::TrackerError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Transport for HttpTransport {
    fn send(&self, request: &OutboundRequest) -> TrackerResult<()> {
        use crate::error::TrackerError;

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = serde_json::to_vec(&request.body)?;
        let response = builder
            .body(body)
            .send()
            .map_err(|e| TrackerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Transport(format!(
                "collector answered {status}"
            )));
        }
        Ok(())
    }
}

/// Convenience: a transport that drops every request.
pub fn noop_transport() -> Arc<dyn Transport> {
    Arc::new(NoopTransport)
}

/// Convenience: a capturing transport for tests.
pub fn capture_transport() -> Arc<CaptureTransport> {
    Arc::new(CaptureTransport::new())
}
