//! Page environment: location, title, language, platform and timing.

use trackkit_core::{NavigationTiming, PageContext, PlatformInfo};
use url::Url;

/// Read-only view of `window`/`document`/`navigator` state that ends up
/// in every envelope.
pub trait Environment {
    fn title(&self) -> String;
    /// `location.href`; `None` when the page has no location.
    fn href(&self) -> Option<String>;
    fn referrer(&self) -> String;
    /// `navigator.language`, else `navigator.browserLanguage`.
    fn language(&self) -> Option<String>;
    /// Browser/engine/OS description from the platform collaborator.
    fn platform(&self) -> PlatformInfo;
    fn navigation_timing(&self) -> NavigationTiming;

    /// `location.hostname`.
    fn hostname(&self) -> Option<String> {
        let href = self.href()?;
        let url = Url::parse(&href).ok()?;
        url.host_str().map(str::to_string)
    }
}

/// Static context for a report assembled at `event_time`.
pub fn page_context(env: &dyn Environment, event_time: i64) -> PageContext {
    PageContext {
        performance: env.navigation_timing(),
        title: env.title(),
        url: env.href().unwrap_or_default(),
        event_time,
        language: env.language(),
        referrer: env.referrer(),
        ..PageContext::default()
    }
    .with_platform(&env.platform())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEnv {
        href: Option<String>,
    }

    impl Environment for FixedEnv {
        fn title(&self) -> String {
            "Pricing".into()
        }
        fn href(&self) -> Option<String> {
            self.href.clone()
        }
        fn referrer(&self) -> String {
            "https://search.test/".into()
        }
        fn language(&self) -> Option<String> {
            Some("en-GB".into())
        }
        fn platform(&self) -> PlatformInfo {
            PlatformInfo {
                browser_name: Some("Chrome".into()),
                ..PlatformInfo::default()
            }
        }
        fn navigation_timing(&self) -> NavigationTiming {
            NavigationTiming {
                navigation_start: 7,
                ..NavigationTiming::default()
            }
        }
    }

    #[test]
    fn test_hostname_from_href() {
        let env = FixedEnv {
            href: Some("https://shop.test:8443/cart?x=1#top".into()),
        };
        assert_eq!(env.hostname().as_deref(), Some("shop.test"));
    }

    #[test]
    fn test_hostname_absent_without_location() {
        let env = FixedEnv { href: None };
        assert_eq!(env.hostname(), None);
        let env = FixedEnv {
            href: Some("not a url".into()),
        };
        assert_eq!(env.hostname(), None);
    }

    #[test]
    fn test_page_context() {
        let env = FixedEnv {
            href: Some("https://shop.test/pricing".into()),
        };
        let ctx = page_context(&env, 99);
        assert_eq!(ctx.title, "Pricing");
        assert_eq!(ctx.url, "https://shop.test/pricing");
        assert_eq!(ctx.event_time, 99);
        assert_eq!(ctx.browser_type.as_deref(), Some("Chrome"));
        assert_eq!(ctx.language.as_deref(), Some("en-GB"));
        assert_eq!(ctx.performance.navigation_start, 7);
    }
}
