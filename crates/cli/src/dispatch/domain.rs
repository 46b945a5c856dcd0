use crate::report::SearchHit;
use super::SearchHistoryEntry;
use crate::settings::SearchOverrides;
use cleats_protocol::{IndexMode, MapFormat, MapScope, MapType};
use cleats_runner::WindowKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Where an action was triggered from: the editor window, the active file
/// (if any) and the folders the window has open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTarget {
    pub window: WindowKey,
    #[serde(default)]
    pub hint: Option<PathBuf>,
    #[serde(default)]
    pub open_folders: Vec<PathBuf>,
}

impl DispatchTarget {
    pub fn new(window: impl Into<String>) -> Self {
        Self {
            window: WindowKey::new(window),
            hint: None,
            open_folders: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<PathBuf>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_folders(mut self, folders: Vec<PathBuf>) -> Self {
        self.open_folders = folders;
        self
    }
}

/// What the map should cover. `focus` may be an absolute path; it is made
/// relative to the project root before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSelection {
    pub scope: MapScope,
    #[serde(default)]
    pub focus: Option<PathBuf>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub map_type: Option<MapType>,
    #[serde(default)]
    pub format: Option<MapFormat>,
}

impl MapSelection {
    pub fn repo() -> Self {
        Self {
            scope: MapScope::Repo,
            focus: None,
            symbol: None,
            map_type: None,
            format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Build {
        #[serde(default)]
        mode: Option<IndexMode>,
    },
    Watch,
    WatchStop,
    Validate,
    ConfigDump,
    Search {
        query: String,
        #[serde(flatten)]
        overrides: SearchOverrides,
    },
    RepeatLastSearch,
    SearchHistory,
    Map(MapSelection),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub root: PathBuf,
    pub mode: IndexMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateOutcome {
    pub root: PathBuf,
    pub ok: bool,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub root: PathBuf,
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSource {
    Api,
    Cli,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOutcome {
    pub root: PathBuf,
    pub source: MapSource,
    pub out_path: String,
    pub format: MapFormat,
    pub model_path: Option<String>,
    pub node_list_path: Option<String>,
    pub cache_key: Option<String>,
    /// html, html-iso and svg open in a browser; other formats open as files.
    pub open_in_browser: bool,
    pub report: String,
    pub warnings: Vec<String>,
    pub suggest_rebuild: bool,
}

impl MapOutcome {
    /// URL to hand to a browser: remote and `file:` URLs as-is, local paths as `file:` URLs.
    pub fn browser_url(&self) -> String {
        let lowered = self.out_path.to_ascii_lowercase();
        if ["http://", "https://", "file://"]
            .iter()
            .any(|scheme| lowered.starts_with(scheme))
        {
            return self.out_path.clone();
        }
        format!("file://{}", self.out_path.replace('\\', "/"))
    }
}

/// Result of any action, for callers that handle actions generically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Built(BuildOutcome),
    WatchStarted { root: PathBuf },
    WatchAlreadyRunning { root: Option<PathBuf> },
    WatchStopped { existed: bool },
    Validated(ValidateOutcome),
    CacheRoot { path: PathBuf },
    Searched(SearchOutcome),
    NothingToRepeat,
    SearchHistory { entries: Vec<SearchHistoryEntry> },
    Mapped(MapOutcome),
}

impl Outcome {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn actions_parse_from_session_requests() {
        let action: Action = serde_json::from_value(json!({
            "action": "search", "query": "parse config", "mode": "code", "limit": 10
        }))
        .unwrap();
        assert_eq!(
            action,
            Action::Search {
                query: "parse config".into(),
                overrides: SearchOverrides {
                    mode: Some(cleats_protocol::SearchMode::Code),
                    limit: Some(10),
                    ..SearchOverrides::default()
                },
            }
        );

        let action: Action = serde_json::from_value(json!({
            "action": "map", "scope": "file", "focus": "/r/src/a.js", "format": "dot"
        }))
        .unwrap();
        let Action::Map(selection) = action else {
            panic!("expected map");
        };
        assert_eq!(selection.scope, MapScope::File);
        assert_eq!(selection.format, Some(MapFormat::Dot));

        let action: Action = serde_json::from_value(json!({"action": "build"})).unwrap();
        assert_eq!(action, Action::Build { mode: None });

        let action: Action = serde_json::from_value(json!({"action": "repeat_last_search"})).unwrap();
        assert_eq!(action, Action::RepeatLastSearch);
    }

    #[test]
    fn browser_url_wraps_local_paths() {
        let mut outcome = MapOutcome {
            root: PathBuf::from("/r"),
            source: MapSource::Cli,
            out_path: "/r/.pairofcleats/maps/map-repo-combined.html".into(),
            format: MapFormat::Html,
            model_path: None,
            node_list_path: None,
            cache_key: None,
            open_in_browser: true,
            report: String::new(),
            warnings: Vec::new(),
            suggest_rebuild: false,
        };
        assert_eq!(
            outcome.browser_url(),
            "file:///r/.pairofcleats/maps/map-repo-combined.html"
        );
        outcome.out_path = "http://127.0.0.1:7345/map?format=html".into();
        assert_eq!(outcome.browser_url(), outcome.out_path);
    }
}
