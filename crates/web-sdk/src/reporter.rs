//! Envelope assembly and best-effort delivery.
//!
//! Layers merge in increasing precedence: static page context, then
//! identity with the configured user context and extra fields, then the
//! event payload. Identity and extra replace whole top-level fields; only
//! the payload merges into nested objects. Delivery failures are logged and
//! dropped.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use trackkit_core::{
    merge_layers, CapturedEvent, Envelope, EnvelopeIdentity, OutboundRequest, TrackerConfig,
    TrackerError, TrackerResult, Transport, WallClock,
};

use crate::environment::{page_context, Environment};

/// The mutable identity and endpoint settings of a reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    pub appid: String,
    pub device_id: String,
    pub user_id: Option<String>,
    pub user_info: Value,
    pub extra: Value,
    pub apikey: String,
    pub request_url: String,
}

impl ReportSettings {
    pub fn from_config(config: &TrackerConfig, device_id: String) -> Self {
        Self {
            appid: config.appid.clone(),
            device_id,
            user_id: config.user_id.clone(),
            user_info: config.user_info.clone(),
            extra: config.extra.clone(),
            apikey: config.apikey.clone(),
            request_url: config.request_url.clone(),
        }
    }
}

pub struct Reporter {
    settings: RefCell<ReportSettings>,
    environment: Rc<dyn Environment>,
    clock: Rc<dyn WallClock>,
    transport: Arc<dyn Transport>,
}

impl Reporter {
    pub fn new(
        settings: ReportSettings,
        environment: Rc<dyn Environment>,
        clock: Rc<dyn WallClock>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            settings: RefCell::new(settings),
            environment,
            clock,
            transport,
        }
    }

    pub fn settings(&self) -> ReportSettings {
        self.settings.borrow().clone()
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.settings.borrow_mut().user_id = Some(user_id.into());
    }

    pub fn set_user_info(&self, user_info: Value) {
        self.settings.borrow_mut().user_info = user_info;
    }

    pub fn set_extra(&self, extra: Value) {
        self.settings.borrow_mut().extra = extra;
    }

    /// Build the envelope for one event without sending it.
    pub fn envelope(
        &self,
        event_type: &str,
        tracking_key: &str,
        payload: &Value,
    ) -> TrackerResult<Envelope> {
        let settings = self.settings.borrow();

        let mut base = serde_json::to_value(page_context(
            self.environment.as_ref(),
            self.clock.now_millis(),
        ))?;

        let identity = serde_json::to_value(EnvelopeIdentity {
            user_id: settings.user_id.clone(),
            appid: settings.appid.clone(),
            uuid: settings.device_id.clone(),
            user_info: settings.user_info.clone(),
            event_type: event_type.to_string(),
            event_id: tracking_key.to_string(),
        })?;
        spread_into(&mut base, &identity, "identity");
        spread_into(&mut base, &settings.extra, "extra");

        let mut event = Value::Object(Default::default());
        merge_object_into(&mut event, payload, "payload");

        Envelope::from_value(merge_layers([&base, &event])).ok_or_else(|| {
            TrackerError::Internal(anyhow::anyhow!("envelope did not assemble to an object"))
        })
    }

    /// Assemble and send, returning the delivered envelope.
    pub fn try_report(
        &self,
        event_type: &str,
        tracking_key: &str,
        payload: &Value,
    ) -> TrackerResult<Envelope> {
        let envelope = self.envelope(event_type, tracking_key, payload)?;
        let (url, apikey) = {
            let settings = self.settings.borrow();
            (settings.request_url.clone(), settings.apikey.clone())
        };
        let request = OutboundRequest::json(url, &apikey, envelope.clone().into_value());
        self.transport.send(&request)?;
        debug!(event_type, event_id = tracking_key, "event reported");
        Ok(envelope)
    }

    /// Fire-and-forget report; failures never reach the caller.
    pub fn report(&self, event_type: &str, tracking_key: &str, payload: &Value) {
        if let Err(e) = self.try_report(event_type, tracking_key, payload) {
            warn!(error = %e, event_type, event_id = tracking_key, "event report dropped");
        }
    }

    pub fn report_event(&self, event: &CapturedEvent) {
        self.report(
            &event.event_type,
            &event.tracking_key,
            &event.payload.to_value(),
        );
    }
}

/// Merge the top-level keys of `source` into `target`; non-object sources
/// contribute nothing.
/// Copy the top-level fields of `source` over `target`.
fn spread_into(target: &mut Value, source: &Value, what: &str) {
    match (target.as_object_mut(), source) {
        (Some(fields), Value::Object(layer)) => {
            for (key, value) in layer {
                fields.insert(key.clone(), value.clone());
            }
        }
        (_, Value::Null) => {}
        (_, other) => debug!(kind = what, value = %other, "ignoring non-object report layer"),
    }
}

fn merge_object_into(target: &mut Value, source: &Value, what: &str) {
    match source {
        Value::Object(_) => trackkit_core::deep_merge(target, source),
        Value::Null => {}
        other => debug!(kind = what, value = %other, "ignoring non-object report layer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPage;
    use serde_json::json;
    use trackkit_core::{capture_transport, NavigationTiming, PlatformInfo};

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(&self, _request: &OutboundRequest) -> TrackerResult<()> {
            Err(TrackerError::Transport("connection refused".into()))
        }
    }

    fn settings() -> ReportSettings {
        ReportSettings {
            appid: "shop".into(),
            device_id: "dev-1".into(),
            user_id: None,
            user_info: json!({"plan": "free"}),
            extra: json!({"release": "1.4.2"}),
            apikey: "key-123".into(),
            request_url: "https://collect.test/track".into(),
        }
    }

    fn reporter(sim: &SimPage, transport: Arc<dyn Transport>) -> Reporter {
        Reporter::new(
            settings(),
            sim.environment.clone(),
            sim.clock.clone(),
            transport,
        )
    }

    #[test]
    fn test_envelope_fields() {
        let sim = SimPage::new("https://shop.test/pricing");
        sim.environment.set_title("Pricing");
        sim.environment.set_referrer("https://search.test/");
        sim.environment.set_platform(PlatformInfo {
            browser_name: Some("Firefox".into()),
            browser_version: Some("128.0".into()),
            engine: Some("Gecko".into()),
            os_family: Some("Linux".into()),
            os_version: None,
        });
        sim.environment.set_timing(NavigationTiming {
            navigation_start: 11,
            ..NavigationTiming::default()
        });
        let reporter = reporter(&sim, capture_transport());

        let envelope = reporter
            .envelope("click", "signup_button", &json!({}))
            .unwrap()
            .into_value();

        assert_eq!(envelope["eventType"], "click");
        assert_eq!(envelope["eventId"], "signup_button");
        assert_eq!(envelope["appid"], "shop");
        assert_eq!(envelope["uuid"], "dev-1");
        assert_eq!(envelope["userId"], Value::Null);
        assert_eq!(envelope["userInfo"], json!({"plan": "free"}));
        assert_eq!(envelope["release"], "1.4.2");
        assert_eq!(envelope["title"], "Pricing");
        assert_eq!(envelope["url"], "https://shop.test/pricing");
        assert_eq!(envelope["referrer"], "https://search.test/");
        assert_eq!(envelope["eventTime"], 1_700_000_000_000i64);
        assert_eq!(envelope["browserType"], "Firefox");
        assert_eq!(envelope["browserEngine"], "Gecko");
        assert_eq!(envelope["osType"], "Linux");
        assert_eq!(envelope["language"], "en-US");
        assert_eq!(envelope["performance"]["navigationStart"], 11);
    }

    #[test]
    fn test_payload_overrides_context_and_identity() {
        let sim = SimPage::new("https://shop.test/");
        sim.environment.set_title("Home");
        let reporter = reporter(&sim, capture_transport());
        reporter.set_extra(json!({"title": "from extra", "channel": "email"}));

        let envelope = reporter
            .envelope(
                "custom",
                "promo",
                &json!({"channel": "sms", "userInfo": {"seats": 3}}),
            )
            .unwrap()
            .into_value();

        assert_eq!(envelope["title"], "from extra");
        assert_eq!(envelope["channel"], "sms");
        assert_eq!(envelope["userInfo"], json!({"plan": "free", "seats": 3}));
    }

    #[test]
    fn test_extra_replaces_whole_fields() {
        let sim = SimPage::new("https://shop.test/");
        sim.environment.set_timing(NavigationTiming {
            navigation_start: 11,
            ..NavigationTiming::default()
        });
        let reporter = reporter(&sim, capture_transport());
        reporter.set_extra(json!({
            "userInfo": {"seats": 5},
            "performance": {"custom": true}
        }));

        let envelope = reporter
            .envelope("custom", "k", &json!({}))
            .unwrap()
            .into_value();

        assert_eq!(envelope["userInfo"], json!({"seats": 5}));
        assert_eq!(envelope["performance"], json!({"custom": true}));
    }

    #[test]
    fn test_setters_apply_to_next_report() {
        let sim = SimPage::new("https://shop.test/");
        let transport = capture_transport();
        let reporter = reporter(&sim, transport.clone());

        reporter.report("custom", "a", &json!({}));
        reporter.set_user_id("u-42");
        reporter.set_user_info(json!({"plan": "pro"}));
        reporter.report("custom", "b", &json!({}));

        let bodies = transport.bodies();
        assert_eq!(bodies[0]["userId"], Value::Null);
        assert_eq!(bodies[1]["userId"], "u-42");
        assert_eq!(bodies[1]["userInfo"], json!({"plan": "pro"}));
    }

    #[test]
    fn test_request_shape() {
        let sim = SimPage::new("https://shop.test/");
        let transport = capture_transport();
        let reporter = reporter(&sim, transport.clone());

        reporter.report("click", "cta", &json!({}));

        let request = transport.last().unwrap();
        assert_eq!(request.url, "https://collect.test/track");
        assert_eq!(
            request.header("Content-Type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(request.header("apikey"), Some("key-123"));
    }

    #[test]
    fn test_transport_failure_is_swallowed() {
        let sim = SimPage::new("https://shop.test/");
        let reporter = reporter(&sim, Arc::new(FailingTransport));
        reporter.report("click", "cta", &json!({}));
        assert!(matches!(
            reporter.try_report("click", "cta", &json!({})),
            Err(TrackerError::Transport(_))
        ));
    }

    #[test]
    fn test_non_object_payload_ignored() {
        let sim = SimPage::new("https://shop.test/");
        let reporter = reporter(&sim, capture_transport());
        let envelope = reporter.envelope("custom", "k", &json!("oops")).unwrap();
        assert_eq!(envelope.event_id(), Some("k"));
        assert!(envelope.get("0").is_none());
    }
}
