//! One-shot installation of the enabled capture features.

use std::cell::Cell;
use std::fmt::Debug;

use tracing::{debug, info};
use trackkit_core::CaptureToggles;

use crate::capture::{CaptureRegistry, TRACKER_KEY_ATTRIBUTE};
use crate::history::{HistoryInterceptor, PUSH_STATE, REPLACE_STATE};

pub const HEAT_MAP_KEY: &str = "innerHeatMap";
pub const PAGE_LOAD_KEY: &str = "innerPageLoad";
pub const HISTORY_CHANGE_KEY: &str = "innerHistoryChange";
pub const HASH_CHANGE_KEY: &str = "innerHashChange";
pub const CLOSED_PAGE_KEY: &str = "innerClosedPage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Uninstalled,
    Installed,
}

#[derive(Debug)]
pub struct InstallCoordinator {
    state: Cell<InstallState>,
}

impl Default for InstallCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallCoordinator {
    pub fn new() -> Self {
        Self {
            state: Cell::new(InstallState::Uninstalled),
        }
    }

    pub fn state(&self) -> InstallState {
        self.state.get()
    }

    /// Subscribe every enabled feature. Runs at most once; later calls
    /// return `false` and bind nothing.
    pub fn install<E: Clone + PartialEq + Debug + 'static>(
        &self,
        toggles: CaptureToggles,
        registry: &CaptureRegistry<E>,
        interceptor: &HistoryInterceptor<E>,
    ) -> bool {
        if self.state.get() == InstallState::Installed {
            debug!("capture already installed");
            return false;
        }
        self.state.set(InstallState::Installed);

        if toggles.tracker_key {
            registry.subscribe_attribute_clicks(TRACKER_KEY_ATTRIBUTE);
        }
        if toggles.heat_map {
            registry.subscribe(&["click"], HEAT_MAP_KEY);
        }
        if toggles.page_load {
            registry.subscribe(&["load"], PAGE_LOAD_KEY);
        }
        if toggles.history_change {
            registry.subscribe(&["load"], PAGE_LOAD_KEY);
            interceptor.install(PUSH_STATE);
            interceptor.install(REPLACE_STATE);
            registry.subscribe(&[PUSH_STATE, REPLACE_STATE], HISTORY_CHANGE_KEY);
        }
        if toggles.page_close {
            registry.subscribe(&["beforeunload"], CLOSED_PAGE_KEY);
        }
        if toggles.hash_change {
            registry.subscribe(&["load"], PAGE_LOAD_KEY);
            registry.subscribe(&["hashchange"], HASH_CHANGE_KEY);
        }

        info!(
            listeners = registry.subscriptions().len(),
            "capture features installed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{ReportSettings, Reporter};
    use crate::session::SessionClock;
    use crate::signal::Binding;
    use crate::sim::{NodeRef, SimPage};
    use std::rc::Rc;
    use trackkit_core::{capture_transport, PathMode, TrackerConfig};

    fn parts(sim: &SimPage) -> (CaptureRegistry<NodeRef>, HistoryInterceptor<NodeRef>) {
        let page = sim.page();
        let reporter = Rc::new(Reporter::new(
            ReportSettings::from_config(&TrackerConfig::default(), "dev-1".into()),
            page.environment.clone(),
            page.clock.clone(),
            capture_transport(),
        ));
        let registry = CaptureRegistry::new(
            Binding::detect(page.target.clone()),
            page.dom.clone(),
            Rc::new(SessionClock::new(page.clock.clone())),
            reporter,
            PathMode::TagOnly,
        );
        let interceptor = HistoryInterceptor::new(page.history.clone(), page.target.clone());
        (registry, interceptor)
    }

    fn all() -> CaptureToggles {
        CaptureToggles {
            tracker_key: true,
            heat_map: true,
            page_load: true,
            history_change: true,
            hash_change: true,
            page_close: true,
        }
    }

    #[test]
    fn test_install_everything() {
        let sim = SimPage::new("https://shop.test/");
        let (registry, interceptor) = parts(&sim);
        let coordinator = InstallCoordinator::new();

        assert!(coordinator.install(all(), &registry, &interceptor));
        assert_eq!(coordinator.state(), InstallState::Installed);

        assert_eq!(sim.window.listener_count("click"), 2);
        assert_eq!(sim.window.listener_count("load"), 1);
        assert_eq!(sim.window.listener_count("pushState"), 1);
        assert_eq!(sim.window.listener_count("replaceState"), 1);
        assert_eq!(sim.window.listener_count("beforeunload"), 1);
        assert_eq!(sim.window.listener_count("hashchange"), 1);
        assert!(interceptor.is_wrapped(PUSH_STATE));
        assert!(interceptor.is_wrapped(REPLACE_STATE));
    }

    #[test]
    fn test_second_install_is_noop() {
        let sim = SimPage::new("https://shop.test/");
        let (registry, interceptor) = parts(&sim);
        let coordinator = InstallCoordinator::new();
        coordinator.install(all(), &registry, &interceptor);
        let before = sim.window.total_listeners();

        assert!(!coordinator.install(all(), &registry, &interceptor));
        assert_eq!(sim.window.total_listeners(), before);
    }

    #[test]
    fn test_navigation_features_report_load_under_page_load_key() {
        let sim = SimPage::new("https://shop.test/");
        let page = sim.page();
        let transport = capture_transport();
        let reporter = Rc::new(Reporter::new(
            ReportSettings::from_config(&TrackerConfig::default(), "dev-1".into()),
            page.environment.clone(),
            page.clock.clone(),
            transport.clone(),
        ));
        let registry = CaptureRegistry::new(
            Binding::detect(page.target.clone()),
            page.dom.clone(),
            Rc::new(SessionClock::new(page.clock.clone())),
            reporter,
            PathMode::TagOnly,
        );
        let interceptor = HistoryInterceptor::new(page.history.clone(), page.target.clone());
        let toggles = CaptureToggles {
            history_change: true,
            hash_change: true,
            ..CaptureToggles::default()
        };
        InstallCoordinator::new().install(toggles, &registry, &interceptor);

        assert_eq!(sim.window.listener_count("load"), 1);
        sim.load();

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["eventType"], "load");
        assert_eq!(bodies[0]["eventId"], PAGE_LOAD_KEY);
    }

    #[test]
    fn test_only_enabled_features() {
        let sim = SimPage::new("https://shop.test/");
        let (registry, interceptor) = parts(&sim);
        let toggles = CaptureToggles {
            page_close: true,
            ..CaptureToggles::default()
        };
        InstallCoordinator::new().install(toggles, &registry, &interceptor);
        assert_eq!(sim.window.total_listeners(), 1);
        assert!(!interceptor.is_wrapped(PUSH_STATE));
    }
}
