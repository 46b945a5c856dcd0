use anyhow::{Context as AnyhowContext, Result};
use cleats_protocol::args::{MapRequest, SearchOptions, WatchOptions};
use cleats_protocol::{
    IndexMode, MapFormat, MapScope, MapType, ProtocolError, SearchBackend, SearchMode,
};
use cleats_runner::ToolConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const SETTINGS_ENV: &str = "CLEATS_BRIDGE_SETTINGS";
const SETTINGS_DIR: &str = "cleats-bridge";
const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_SEARCH_LIMIT: u32 = 25;
const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAP_DIR: &[&str] = &[".pairofcleats", "maps"];

/// User settings for the bridge. Every key is optional; unknown keys are ignored.
///
/// Enumerated values are kept as strings so that [`BridgeSettings::validate`]
/// can report every bad value at once instead of failing on the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub tool_path: Option<PathBuf>,
    pub tool_args: Vec<String>,
    pub interpreter_path: Option<PathBuf>,
    pub env: BTreeMap<String, Value>,
    pub api_server_url: Option<String>,
    pub api_timeout_ms: u64,
    pub index_mode_default: Option<String>,
    pub index_watch_mode: Option<String>,
    pub index_watch_poll_ms: Option<i64>,
    pub index_watch_debounce_ms: Option<i64>,
    pub watch_root: Option<PathBuf>,
    pub search_mode_default: Option<String>,
    pub search_backend_default: Option<String>,
    pub search_limit: Option<i64>,
    pub history_limit: Option<i64>,
    pub map_type: Option<String>,
    pub map_format: Option<String>,
    pub map_output_dir: Option<PathBuf>,
    pub map_collapse: Option<String>,
    pub map_include_override: Option<String>,
    pub map_only_exported: bool,
    pub map_max_files: Option<i64>,
    pub map_max_members_per_file: Option<i64>,
    pub map_max_edges: Option<i64>,
    pub map_top_k_by_degree: bool,
    pub map_viewer_args: Vec<String>,
    pub map_stream_output: bool,
    pub map_show_report_panel: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            tool_path: None,
            tool_args: Vec::new(),
            interpreter_path: None,
            env: BTreeMap::new(),
            api_server_url: None,
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            index_mode_default: None,
            index_watch_mode: None,
            index_watch_poll_ms: None,
            index_watch_debounce_ms: None,
            watch_root: None,
            search_mode_default: None,
            search_backend_default: None,
            search_limit: None,
            history_limit: None,
            map_type: None,
            map_format: None,
            map_output_dir: None,
            map_collapse: None,
            map_include_override: None,
            map_only_exported: false,
            map_max_files: None,
            map_max_members_per_file: None,
            map_max_edges: None,
            map_top_k_by_degree: false,
            map_viewer_args: Vec::new(),
            map_stream_output: false,
            map_show_report_panel: true,
        }
    }
}

/// Per-request search choices that win over the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOverrides {
    pub mode: Option<SearchMode>,
    pub backend: Option<SearchBackend>,
    pub limit: Option<u32>,
    pub explain: bool,
}

impl BridgeSettings {
    /// Loads the first settings file found: `explicit`, then
    /// `$CLEATS_BRIDGE_SETTINGS`, then the user config directory.
    /// No file at all yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        let candidates = env::var_os(SETTINGS_ENV)
            .map(PathBuf::from)
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE)));
        for candidate in candidates {
            if candidate.is_file() {
                return Ok((Self::from_file(&candidate)?, Some(candidate)));
            }
        }
        log::debug!("No settings file found; using defaults");
        Ok((Self::default(), None))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings {}", path.display()))
    }

    /// Every configuration problem for `root`, in a stable order.
    pub fn validate(&self, root: &Path) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(path) = self.tool_config().configured_tool_path(root) {
            if !path.exists() {
                errors.push(format!("tool_path does not exist: {}", path.display()));
            }
        }
        if let Some(interpreter) = self.interpreter_path.as_deref() {
            if interpreter.components().count() > 1 && !interpreter.exists() {
                errors.push(format!(
                    "interpreter_path does not exist: {}",
                    interpreter.display()
                ));
            }
        }
        if self.env.keys().any(|key| key.trim().is_empty()) {
            errors.push("env keys must not be empty".to_string());
        }
        if let Some(url) = self.api_url() {
            let lowered = url.to_ascii_lowercase();
            if !lowered.starts_with("http://") && !lowered.starts_with("https://") {
                errors.push(format!("api_server_url must start with http:// or https://: {url}"));
            }
        }
        if self.api_timeout_ms == 0 {
            errors.push("api_timeout_ms must be at least 1".to_string());
        }

        check_value::<IndexMode>(&mut errors, &self.index_mode_default);
        check_value::<IndexMode>(&mut errors, &self.index_watch_mode);
        check_value::<SearchMode>(&mut errors, &self.search_mode_default);
        check_value::<SearchBackend>(&mut errors, &self.search_backend_default);
        check_value::<MapType>(&mut errors, &self.map_type);
        check_value::<MapFormat>(&mut errors, &self.map_format);

        for (key, value) in [
            ("index_watch_poll_ms", self.index_watch_poll_ms),
            ("index_watch_debounce_ms", self.index_watch_debounce_ms),
            ("search_limit", self.search_limit),
            ("history_limit", self.history_limit),
            ("map_max_files", self.map_max_files),
            ("map_max_members_per_file", self.map_max_members_per_file),
            ("map_max_edges", self.map_max_edges),
        ] {
            if matches!(value, Some(v) if v < 1) {
                errors.push(ProtocolError::NonPositive(key).to_string());
            }
        }

        if self.watch_root.is_some() {
            let watch_root = self.resolve_watch_root(root);
            if !watch_root.is_dir() {
                errors.push(format!("watch_root does not exist: {}", watch_root.display()));
            }
        }
        errors
    }

    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            tool_path: self.tool_path.clone(),
            tool_args: self.tool_args.clone(),
            interpreter: self.interpreter_path.clone(),
        }
    }

    /// Environment overrides for the child; values are stringified.
    pub fn child_env(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .filter(|(key, _)| !key.trim().is_empty())
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    pub fn api_url(&self) -> Option<&str> {
        self.api_server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms.max(1))
    }

    pub fn index_mode(&self) -> IndexMode {
        parse_or_default(&self.index_mode_default)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            mode: parse_or_default(&self.index_watch_mode),
            poll_ms: positive(self.index_watch_poll_ms),
            debounce_ms: positive(self.index_watch_debounce_ms),
        }
    }

    /// `watch_root` taken relative to the project root; the root itself when unset.
    pub fn resolve_watch_root(&self, root: &Path) -> PathBuf {
        match self.watch_root.as_deref() {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) if !path.as_os_str().is_empty() => root.join(path),
            _ => root.to_path_buf(),
        }
    }

    pub fn search_options(&self, overrides: &SearchOverrides) -> SearchOptions {
        SearchOptions {
            mode: overrides
                .mode
                .unwrap_or_else(|| parse_or_default(&self.search_mode_default)),
            backend: overrides
                .backend
                .or_else(|| parse_optional(&self.search_backend_default)),
            limit: Some(
                overrides
                    .limit
                    .filter(|limit| *limit > 0)
                    .or_else(|| positive(self.search_limit).and_then(|v| u32::try_from(v).ok()))
                    .unwrap_or(DEFAULT_SEARCH_LIMIT),
            ),
            explain: overrides.explain,
        }
    }

    /// How many searches each window remembers.
    pub fn history_limit(&self) -> usize {
        positive(self.history_limit)
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    /// A map request carrying the configured defaults; explicit type and
    /// format choices win.
    pub fn map_request(
        &self,
        scope: MapScope,
        focus: impl Into<String>,
        map_type: Option<MapType>,
        format: Option<MapFormat>,
    ) -> MapRequest {
        let mut request = MapRequest::new(scope, focus);
        request.map_type = map_type.unwrap_or_else(|| parse_or_default(&self.map_type));
        request.format = format.unwrap_or_else(|| parse_or_default(&self.map_format));
        request.include_override = non_empty(&self.map_include_override);
        request.collapse = non_empty(&self.map_collapse);
        request.only_exported = self.map_only_exported;
        request.max_files = positive_u32(self.map_max_files);
        request.max_members_per_file = positive_u32(self.map_max_members_per_file);
        request.max_edges = positive_u32(self.map_max_edges);
        request.top_k_by_degree = self.map_top_k_by_degree;
        request.viewer_args = self.map_viewer_args.clone();
        request
    }

    pub fn map_output_dir(&self, root: &Path) -> PathBuf {
        match self.map_output_dir.as_deref() {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) if !dir.as_os_str().is_empty() => root.join(dir),
            _ => DEFAULT_MAP_DIR
                .iter()
                .fold(root.to_path_buf(), |acc, part| acc.join(part)),
        }
    }
}

fn check_value<T>(errors: &mut Vec<String>, raw: &Option<String>)
where
    T: FromStr<Err = ProtocolError>,
{
    if let Some(raw) = raw.as_deref().filter(|raw| !raw.trim().is_empty()) {
        if let Err(err) = raw.parse::<T>() {
            errors.push(err.to_string());
        }
    }
}

fn parse_optional<T: FromStr>(raw: &Option<String>) -> Option<T> {
    raw.as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| raw.parse().ok())
}

fn parse_or_default<T: FromStr + Default>(raw: &Option<String>) -> T {
    parse_optional(raw).unwrap_or_default()
}

fn positive(value: Option<i64>) -> Option<u64> {
    value.filter(|v| *v > 0).and_then(|v| u64::try_from(v).ok())
}

fn positive_u32(value: Option<i64>) -> Option<u32> {
    value.filter(|v| *v > 0).and_then(|v| u32::try_from(v).ok())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn validate_collects_every_problem() {
        let dir = tempdir().unwrap();
        let settings: BridgeSettings = serde_json::from_value(json!({
            "tool_path": "missing/tool",
            "api_server_url": "ftp://host",
            "index_watch_mode": "everything",
            "search_limit": 0,
            "map_format": "png",
            "env": {"": "x"}
        }))
        .unwrap();

        let errors = settings.validate(dir.path());
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors[0].starts_with("tool_path does not exist"));
        assert!(errors.iter().any(|e| e.contains("unknown index mode 'everything'")));
        assert!(errors.iter().any(|e| e == "search_limit must be at least 1"));
        assert!(errors.iter().any(|e| e.contains("unknown map format 'png'")));
    }

    #[test]
    fn defaults_validate_cleanly() {
        let dir = tempdir().unwrap();
        assert_eq!(BridgeSettings::default().validate(dir.path()), Vec::<String>::new());
    }

    #[test]
    fn env_values_are_stringified() {
        let settings: BridgeSettings = serde_json::from_value(json!({
            "env": {"PAIROFCLEATS_THREADS": 4, "PAIROFCLEATS_DEBUG": true, "NAME": "x", "EMPTY": null}
        }))
        .unwrap();
        let env = settings.child_env();
        assert_eq!(env["PAIROFCLEATS_THREADS"], "4");
        assert_eq!(env["PAIROFCLEATS_DEBUG"], "true");
        assert_eq!(env["NAME"], "x");
        assert_eq!(env["EMPTY"], "");
    }

    #[test]
    fn history_limit_defaults_and_must_be_positive() {
        let dir = tempdir().unwrap();
        assert_eq!(BridgeSettings::default().history_limit(), 20);

        let settings = BridgeSettings {
            history_limit: Some(0),
            ..BridgeSettings::default()
        };
        assert_eq!(settings.history_limit(), 20);
        assert_eq!(settings.validate(dir.path()), vec!["history_limit must be at least 1"]);

        let settings = BridgeSettings {
            history_limit: Some(3),
            ..BridgeSettings::default()
        };
        assert_eq!(settings.history_limit(), 3);
    }

    #[test]
    fn search_defaults_and_overrides() {
        let settings = BridgeSettings {
            search_backend_default: Some("sqlite".into()),
            search_limit: Some(50),
            ..BridgeSettings::default()
        };
        let options = settings.search_options(&SearchOverrides::default());
        assert_eq!(options.mode, SearchMode::Both);
        assert_eq!(options.backend, Some(SearchBackend::Sqlite));
        assert_eq!(options.limit, Some(50));

        let options = settings.search_options(&SearchOverrides {
            limit: Some(10),
            explain: true,
            ..SearchOverrides::default()
        });
        assert_eq!(options.limit, Some(10));
        assert!(options.explain);

        assert_eq!(
            BridgeSettings::default()
                .search_options(&SearchOverrides::default())
                .limit,
            Some(DEFAULT_SEARCH_LIMIT)
        );
    }

    #[test]
    fn map_output_dir_defaults_under_root() {
        let root = Path::new("/work/repo");
        assert_eq!(
            BridgeSettings::default().map_output_dir(root),
            root.join(".pairofcleats").join("maps")
        );
        let settings = BridgeSettings {
            map_output_dir: Some(PathBuf::from("out/maps")),
            ..BridgeSettings::default()
        };
        assert_eq!(settings.map_output_dir(root), root.join("out/maps"));
    }

    #[test]
    fn explicit_settings_file_must_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = BridgeSettings::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid settings"));

        std::fs::write(&path, r#"{"search_limit": 7, "unknown_key": 1}"#).unwrap();
        let (settings, source) = BridgeSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.search_limit, Some(7));
        assert_eq!(source, Some(path));
    }
}
