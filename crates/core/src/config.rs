use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};
use crate::merge::deep_merge;

/// Tracker construction options. Field names on the construction surface
/// follow the JavaScript option names (`useClass`, `requestUrl`, ...); the
/// snake_case and lowercase aliases let the same record load from
/// `TRACKKIT__*` environment variables and config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Include class names in structural paths.
    #[serde(rename = "useClass", alias = "use_class", alias = "useclass", default)]
    pub use_class: bool,
    #[serde(default = "default_appid")]
    pub appid: String,
    /// Device id. Empty means "resolve from persisted storage".
    #[serde(default)]
    pub uuid: String,
    #[serde(
        rename = "userId",
        alias = "user_id",
        alias = "userid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(
        rename = "userInfo",
        alias = "user_info",
        alias = "userinfo",
        default = "empty_object"
    )]
    pub user_info: Value,
    #[serde(default = "empty_object")]
    pub extra: Value,
    #[serde(
        rename = "enableTrackerKey",
        alias = "enable_tracker_key",
        alias = "enabletrackerkey",
        default
    )]
    pub enable_tracker_key: bool,
    #[serde(
        rename = "enableHeatMapTracker",
        alias = "enable_heat_map_tracker",
        alias = "enableheatmaptracker",
        default
    )]
    pub enable_heat_map_tracker: bool,
    #[serde(
        rename = "enableLoadTracker",
        alias = "enable_load_tracker",
        alias = "enableloadtracker",
        default
    )]
    pub enable_load_tracker: bool,
    #[serde(
        rename = "enableHistoryTracker",
        alias = "enable_history_tracker",
        alias = "enablehistorytracker",
        default
    )]
    pub enable_history_tracker: bool,
    #[serde(
        rename = "enableHashTracker",
        alias = "enable_hash_tracker",
        alias = "enablehashtracker",
        default
    )]
    pub enable_hash_tracker: bool,
    #[serde(
        rename = "enableClosedTracker",
        alias = "enable_closed_tracker",
        alias = "enableclosedtracker",
        default
    )]
    pub enable_closed_tracker: bool,
    #[serde(default)]
    pub apikey: String,
    /// Collection endpoint.
    #[serde(
        rename = "requestUrl",
        alias = "request_url",
        alias = "requesturl",
        default = "default_request_url"
    )]
    pub request_url: String,
    /// Hostnames on which automatic capture installs.
    #[serde(
        rename = "reportWhiteList",
        alias = "report_white_list",
        alias = "reportwhitelist",
        default
    )]
    pub report_white_list: Vec<String>,
}

/// How element descriptors in a structural path are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    TagOnly,
    IncludeClass,
}

/// The capture features enabled for one tracker instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureToggles {
    pub tracker_key: bool,
    pub heat_map: bool,
    pub page_load: bool,
    pub history_change: bool,
    pub hash_change: bool,
    pub page_close: bool,
}

impl CaptureToggles {
    pub fn any(&self) -> bool {
        self.tracker_key
            || self.heat_map
            || self.page_load
            || self.history_change
            || self.hash_change
            || self.page_close
    }
}

fn default_appid() -> String {
    "default".to_string()
}
fn default_request_url() -> String {
    "http://localhost:3000".to_string()
}
fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            use_class: false,
            appid: default_appid(),
            uuid: String::new(),
            user_id: None,
            user_info: empty_object(),
            extra: empty_object(),
            enable_tracker_key: false,
            enable_heat_map_tracker: false,
            enable_load_tracker: false,
            enable_history_tracker: false,
            enable_hash_tracker: false,
            enable_closed_tracker: false,
            apikey: String::new(),
            request_url: default_request_url(),
            report_white_list: Vec::new(),
        }
    }
}

/// Option names, indexed by their lowercase spelling without underscores.
const OPTION_NAMES: &[&str] = &[
    "useClass",
    "appid",
    "uuid",
    "userId",
    "userInfo",
    "extra",
    "enableTrackerKey",
    "enableHeatMapTracker",
    "enableLoadTracker",
    "enableHistoryTracker",
    "enableHashTracker",
    "enableClosedTracker",
    "apikey",
    "requestUrl",
    "reportWhiteList",
];

/// Options whose value is text even when a source parsed it as a number
/// or boolean.
const TEXT_OPTIONS: &[&str] = &["appid", "uuid", "userId", "apikey", "requestUrl"];

fn option_name(key: &str) -> Option<&'static str> {
    let folded: String = key
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    OPTION_NAMES
        .iter()
        .copied()
        .find(|name| name.to_lowercase() == folded)
}

/// Rename the top-level keys of one source to option names. Unknown keys
/// are dropped.
fn canonical_options(source: Value) -> TrackerResult<Value> {
    let entries = match source {
        Value::Object(entries) => entries,
        Value::Null => return Ok(empty_object()),
        other => {
            return Err(TrackerError::Config(format!(
                "configuration must be a table, got {other}"
            )))
        }
    };
    let mut options = serde_json::Map::new();
    for (key, value) in entries {
        let Some(name) = option_name(&key) else {
            debug!(key = %key, "ignoring unknown configuration key");
            continue;
        };
        let value = match value {
            Value::Number(_) | Value::Bool(_) if TEXT_OPTIONS.contains(&name) => {
                Value::String(value.to_string())
            }
            Value::String(text) if name == "reportWhiteList" => Value::Array(
                text.split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(|h| Value::String(h.to_string()))
                    .collect(),
            ),
            value => value,
        };
        options.insert(name.to_string(), value);
    }
    Ok(Value::Object(options))
}

fn read_file(path: &Path) -> TrackerResult<Value> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let fail = |e: String| TrackerError::Config(format!("{}: {e}", path.display()));
    let text = || std::fs::read_to_string(path).map_err(|e| fail(e.to_string()));
    match format.as_deref() {
        Some("json") => serde_json::from_str(&text()?).map_err(|e| fail(e.to_string())),
        Some("toml") => toml::from_str(&text()?).map_err(|e| fail(e.to_string())),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&text()?).map_err(|e| fail(e.to_string()))
        }
        _ => Ok(config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .build()?
            .try_deserialize::<Value>()?),
    }
}

impl TrackerConfig {
    /// Deep-merge caller options over the defaults.
    ///
    /// `options` uses the construction names (`useClass`, `requestUrl`, ...).
    pub fn from_options(options: &Value) -> TrackerResult<Self> {
        if !options.is_object() && !options.is_null() {
            return Err(TrackerError::Config(format!(
                "options must be an object, got {options}"
            )));
        }
        let mut merged = serde_json::to_value(Self::default())?;
        if !options.is_null() {
            deep_merge(&mut merged, options);
        }
        serde_json::from_value(merged).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Load configuration from an optional file and `TRACKKIT__*`
    /// environment variables, the latter taking precedence.
    ///
    /// Both sources are reduced to option names before merging, so a key
    /// may be spelled `reportWhiteList`, `report_white_list` or
    /// `reportwhitelist` in either. JSON, TOML and YAML files keep the case
    /// of nested `userInfo`/`extra` keys.
    pub fn load(path: Option<&Path>) -> TrackerResult<Self> {
        debug!(file = ?path, "loading tracker configuration");
        let mut options = match path {
            Some(path) => canonical_options(read_file(path)?)?,
            None => empty_object(),
        };

        let env = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("TRACKKIT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("report_white_list"),
            )
            .build()?
            .try_deserialize::<Value>()?;
        let env = canonical_options(env)?;
        if let (Value::Object(options), Value::Object(env)) = (&mut options, env) {
            for (name, value) in env {
                debug!(option = %name, "environment override");
                match options.get_mut(&name) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, &value)
                    }
                    _ => {
                        options.insert(name, value);
                    }
                }
            }
        }

        Self::from_options(&options)
    }

    pub fn path_mode(&self) -> PathMode {
        if self.use_class {
            PathMode::IncludeClass
        } else {
            PathMode::TagOnly
        }
    }

    pub fn capture(&self) -> CaptureToggles {
        CaptureToggles {
            tracker_key: self.enable_tracker_key,
            heat_map: self.enable_heat_map_tracker,
            page_load: self.enable_load_tracker,
            history_change: self.enable_history_tracker,
            hash_change: self.enable_hash_tracker,
            page_close: self.enable_closed_tracker,
        }
    }

    /// Whether automatic capture may install on `hostname`.
    pub fn allows_host(&self, hostname: &str) -> bool {
        self.report_white_list.iter().any(|h| h == hostname)
    }
}
