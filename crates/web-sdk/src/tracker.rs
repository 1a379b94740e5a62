//! The tracker facade: one instance per page.

use std::fmt::Debug;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;
use trackkit_core::{Envelope, TrackerConfig, TrackerResult, Transport};

use crate::capture::CaptureRegistry;
use crate::history::HistoryInterceptor;
use crate::identity::DeviceIdentity;
use crate::install::{InstallCoordinator, InstallState};
use crate::page::Page;
use crate::reporter::{ReportSettings, Reporter};
use crate::session::SessionClock;
use crate::signal::Binding;

/// Result of an installation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
    /// The page's hostname is not allow-listed.
    Dormant,
}

pub struct Tracker<E> {
    config: TrackerConfig,
    page: Page<E>,
    reporter: Rc<Reporter>,
    registry: CaptureRegistry<E>,
    interceptor: HistoryInterceptor<E>,
    coordinator: InstallCoordinator,
}

impl<E: Clone + PartialEq + Debug + 'static> Tracker<E> {
    /// Build a tracker and install automatic capture when the page's
    /// hostname is allow-listed. Manual [`Tracker::report`] works either way.
    pub fn new(config: TrackerConfig, page: Page<E>, transport: Arc<dyn Transport>) -> Self {
        let device_id = if config.uuid.is_empty() {
            DeviceIdentity::resolve(page.storage.as_deref())
        } else {
            config.uuid.clone()
        };

        let reporter = Rc::new(Reporter::new(
            ReportSettings::from_config(&config, device_id),
            Rc::clone(&page.environment),
            Rc::clone(&page.clock),
            transport,
        ));
        let registry = CaptureRegistry::new(
            Binding::detect(Rc::clone(&page.target)),
            Rc::clone(&page.dom),
            Rc::new(SessionClock::new(Rc::clone(&page.clock))),
            Rc::clone(&reporter),
            config.path_mode(),
        );
        let interceptor = HistoryInterceptor::new(Rc::clone(&page.history), Rc::clone(&page.target));

        let tracker = Self {
            config,
            page,
            reporter,
            registry,
            interceptor,
            coordinator: InstallCoordinator::new(),
        };
        tracker.install();
        tracker
    }

    /// Build from a construction-options object deep-merged over defaults.
    pub fn from_options(
        options: &Value,
        page: Page<E>,
        transport: Arc<dyn Transport>,
    ) -> TrackerResult<Self> {
        let config = TrackerConfig::from_options(options)?;
        Ok(Self::new(config, page, transport))
    }

    pub fn install(&self) -> InstallOutcome {
        let hostname = self.page.environment.hostname().unwrap_or_default();
        if !self.config.allows_host(&hostname) {
            info!(hostname = %hostname, "hostname not allow-listed, tracker dormant");
            return InstallOutcome::Dormant;
        }
        if !self
            .coordinator
            .install(self.config.capture(), &self.registry, &self.interceptor)
        {
            return InstallOutcome::AlreadyInstalled;
        }

        let settings = self.reporter.settings();
        info!(
            appid = %settings.appid,
            device_id = %settings.device_id,
            request_url = %settings.request_url,
            "tracker installed"
        );
        InstallOutcome::Installed
    }

    pub fn is_installed(&self) -> bool {
        self.coordinator.state() == InstallState::Installed
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.reporter.set_user_id(user_id);
    }

    pub fn set_user_info(&self, user_info: Value) {
        self.reporter.set_user_info(user_info);
    }

    pub fn set_extra(&self, extra: Value) {
        self.reporter.set_extra(extra);
    }

    /// Report a custom event. Delivery is best-effort.
    pub fn report(&self, event_type: &str, tracking_key: &str, data: Option<Value>) {
        let data = data.unwrap_or_else(|| Value::Object(Map::new()));
        self.reporter.report(event_type, tracking_key, &data);
    }

    /// Like [`Tracker::report`] but surfaces the envelope or the failure.
    pub fn try_report(
        &self,
        event_type: &str,
        tracking_key: &str,
        data: Option<Value>,
    ) -> TrackerResult<Envelope> {
        let data = data.unwrap_or_else(|| Value::Object(Map::new()));
        self.reporter.try_report(event_type, tracking_key, &data)
    }

    /// Construction-time configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn device_id(&self) -> String {
        self.reporter.settings().device_id
    }

    pub fn registry(&self) -> &CaptureRegistry<E> {
        &self.registry
    }
}
