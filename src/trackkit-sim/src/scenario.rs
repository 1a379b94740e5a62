//! Scripted sessions replayed against the simulated browser.

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use trackkit_web::dom::{Dom, Point, Rect};
use trackkit_web::sim::{ElementSpec, NodeRef, SimPage};
use trackkit_web::Tracker;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_href")]
    pub href: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<ElementDef>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_href() -> String {
    "https://localhost/".to_string()
}

/// An element appended under `parent` (a selector; `body` when absent).
#[derive(Debug, Clone, Deserialize)]
pub struct ElementDef {
    pub tag: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// `[left, top, width, height]`
    #[serde(default)]
    pub rect: Option<[f64; 4]>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Step {
    Load,
    Click {
        selector: String,
        x: f64,
        y: f64,
    },
    PushState {
        url: String,
        #[serde(default)]
        state: Value,
    },
    ReplaceState {
        url: String,
        #[serde(default)]
        state: Value,
    },
    #[serde(rename = "hashchange")]
    HashChange {
        fragment: String,
    },
    Close,
    Report {
        #[serde(rename = "eventType")]
        event_type: String,
        key: String,
        #[serde(default)]
        data: Option<Value>,
    },
    Wait {
        millis: i64,
    },
}

impl Scenario {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// A product page with a tagged signup button and a client-side route.
    pub fn demo() -> Self {
        let value = json!({
            "href": "https://localhost/pricing",
            "title": "Pricing",
            "elements": [
                {"tag": "nav", "id": "top", "rect": [0.0, 0.0, 1280.0, 64.0]},
                {"tag": "a", "parent": "#top", "rect": [0.0, 0.0, 120.0, 64.0]},
                {"tag": "a", "parent": "#top", "rect": [120.0, 0.0, 120.0, 64.0]},
                {"tag": "main", "rect": [0.0, 64.0, 1280.0, 900.0]},
                {"tag": "button", "parent": "main", "class": "cta primary",
                 "rect": [540.0, 400.0, 200.0, 48.0],
                 "attributes": {"tracker-key": "signup_button"}}
            ],
            "steps": [
                {"action": "load"},
                {"action": "wait", "millis": 1200},
                {"action": "click", "selector": "#top>a:nth-child(2)", "x": 150.0, "y": 20.0},
                {"action": "click", "selector": "main>button", "x": 640.0, "y": 424.0},
                {"action": "pushState", "url": "/signup", "state": {"from": "pricing"}},
                {"action": "wait", "millis": 3400},
                {"action": "hashchange", "fragment": "terms"},
                {"action": "report", "eventType": "custom", "key": "plan_selected",
                 "data": {"plan": "team"}},
                {"action": "close"}
            ]
        });
        serde_json::from_value(value).unwrap_or_else(|_| Self {
            href: default_href(),
            title: String::new(),
            elements: Vec::new(),
            steps: Vec::new(),
        })
    }

    /// Populate `sim` with this scenario's document.
    pub fn build(&self, sim: &SimPage) -> anyhow::Result<()> {
        sim.environment.set_title(&self.title);
        for def in &self.elements {
            let parent = match &def.parent {
                Some(selector) => find(sim, selector)?,
                None => sim.document.body(),
            };
            let mut spec = ElementSpec::new(&def.tag);
            if let Some(id) = &def.id {
                spec = spec.id(id);
            }
            if let Some(class) = &def.class {
                spec = spec.class(class);
            }
            if let Some(name) = &def.name {
                spec = spec.name(name);
            }
            if let Some([left, top, width, height]) = def.rect {
                spec = spec.rect(Rect::new(left, top, width, height));
            }
            for (attr, value) in &def.attributes {
                spec = spec.attr(attr, value);
            }
            sim.document.append(parent, spec);
        }
        Ok(())
    }

    pub fn replay(&self, sim: &SimPage, tracker: &Tracker<NodeRef>) -> anyhow::Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(step = index, ?step, "replaying step");
            match step {
                Step::Load => sim.load(),
                Step::Click { selector, x, y } => {
                    let target = find(sim, selector)?;
                    sim.click(target, Point::new(*x, *y));
                }
                Step::PushState { url, state } => {
                    sim.push_state(state.clone(), url);
                }
                Step::ReplaceState { url, state } => {
                    sim.replace_state(state.clone(), url);
                }
                Step::HashChange { fragment } => sim.change_hash(fragment),
                Step::Close => sim.close(),
                Step::Report {
                    event_type,
                    key,
                    data,
                } => tracker.report(event_type, key, data.clone()),
                Step::Wait { millis } => sim.clock.advance(*millis),
            }
        }
        info!(steps = self.steps.len(), "scenario replayed");
        Ok(())
    }
}

fn find(sim: &SimPage, selector: &str) -> anyhow::Result<NodeRef> {
    sim.document
        .query_selector(selector)
        .ok_or_else(|| anyhow!("no element matches {selector:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackkit_core::{capture_transport, TrackerConfig};

    #[test]
    fn test_demo_scenario_parses() {
        let demo = Scenario::demo();
        assert_eq!(demo.elements.len(), 5);
        assert_eq!(demo.steps.len(), 9);
        assert!(matches!(demo.steps[4], Step::PushState { .. }));
    }

    #[test]
    fn test_demo_replay_reports() {
        let demo = Scenario::demo();
        let sim = SimPage::new(&demo.href);
        demo.build(&sim).unwrap();

        let mut config = TrackerConfig::default();
        config.report_white_list = vec!["localhost".into()];
        config.enable_tracker_key = true;
        config.enable_heat_map_tracker = true;
        config.enable_history_tracker = true;
        config.enable_hash_tracker = true;
        config.enable_closed_tracker = true;

        let transport = capture_transport();
        let tracker = Tracker::new(config, sim.page(), transport.clone());
        demo.replay(&sim, &tracker).unwrap();

        assert_eq!(transport.count_event_id("signup_button"), 1);
        assert_eq!(transport.count_event_id("innerHeatMap"), 2);
        assert_eq!(transport.count_event_id("plan_selected"), 1);
        assert_eq!(transport.count_event_id("innerClosedPage"), 1);
        assert_eq!(transport.count_event_id("innerPageLoad"), 1);
    }

    #[test]
    fn test_unknown_selector_fails() {
        let scenario: Scenario = serde_json::from_value(json!({
            "steps": [{"action": "click", "selector": "#missing", "x": 0.0, "y": 0.0}]
        }))
        .unwrap();
        let sim = SimPage::new(&scenario.href);
        let tracker = Tracker::new(TrackerConfig::default(), sim.page(), capture_transport());
        assert!(scenario.replay(&sim, &tracker).is_err());
    }
}
