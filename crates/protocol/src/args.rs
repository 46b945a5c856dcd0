//! Argument vectors for the tool's subcommands.
//!
//! Token order matters to the tool's own parser; every builder ends with
//! `--repo <root>` except `report map`, which carries its output paths last.

use crate::{
    IndexMode, MapFormat, MapScope, MapType, ProtocolError, ProtocolResult, SearchBackend,
    SearchMode,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn index_build(mode: IndexMode, repo: &Path) -> Vec<String> {
    vec![
        "index".into(),
        "build".into(),
        "--mode".into(),
        mode.as_str().into(),
        "--repo".into(),
        path_arg(repo),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub mode: IndexMode,
    pub poll_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
}

pub fn index_watch(options: &WatchOptions, watch_root: &Path) -> Vec<String> {
    let mut args = vec![
        "index".to_string(),
        "watch".into(),
        "--mode".into(),
        options.mode.as_str().into(),
    ];
    if let Some(poll) = options.poll_ms {
        args.push("--watch-poll".into());
        args.push(poll.to_string());
    }
    if let Some(debounce) = options.debounce_ms {
        args.push("--watch-debounce".into());
        args.push(debounce.to_string());
    }
    args.push("--repo".into());
    args.push(path_arg(watch_root));
    args
}

pub fn index_validate(mode: Option<IndexMode>, repo: &Path) -> Vec<String> {
    let mut args = vec!["index".to_string(), "validate".into(), "--json".into()];
    if let Some(mode) = mode {
        args.push("--mode".into());
        args.push(mode.as_str().into());
    }
    args.push("--repo".into());
    args.push(path_arg(repo));
    args
}

pub fn config_dump(repo: &Path) -> Vec<String> {
    vec![
        "config".into(),
        "dump".into(),
        "--json".into(),
        "--repo".into(),
        path_arg(repo),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub backend: Option<SearchBackend>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub explain: bool,
}

pub fn search(query: &str, options: &SearchOptions, repo: &Path) -> ProtocolResult<Vec<String>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ProtocolError::EmptyQuery);
    }
    let mut args = vec!["search".to_string(), query.to_string(), "--json".into()];
    if let Some(mode) = options.mode.as_flag() {
        args.push("--mode".into());
        args.push(mode.into());
    }
    if let Some(backend) = options.backend {
        args.push("--backend".into());
        args.push(backend.as_str().into());
    }
    if let Some(limit) = options.limit {
        if limit == 0 {
            return Err(ProtocolError::NonPositive("search limit"));
        }
        args.push("--top".into());
        args.push(limit.to_string());
    }
    if options.explain {
        args.push("--explain".into());
    }
    args.push("--repo".into());
    args.push(path_arg(repo));
    Ok(args)
}

/// Everything that shapes one dependency map, independent of how it is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRequest {
    pub scope: MapScope,
    #[serde(default)]
    pub focus: String,
    #[serde(default = "default_map_mode")]
    pub mode: IndexMode,
    #[serde(default)]
    pub map_type: MapType,
    #[serde(default)]
    pub format: MapFormat,
    /// Replaces the include list derived from `map_type`.
    #[serde(default)]
    pub include_override: Option<String>,
    #[serde(default)]
    pub only_exported: bool,
    #[serde(default)]
    pub collapse: Option<String>,
    #[serde(default)]
    pub max_files: Option<u32>,
    #[serde(default)]
    pub max_members_per_file: Option<u32>,
    #[serde(default)]
    pub max_edges: Option<u32>,
    #[serde(default)]
    pub top_k_by_degree: bool,
    /// Viewer tuning flags passed through verbatim.
    #[serde(default)]
    pub viewer_args: Vec<String>,
}

fn default_map_mode() -> IndexMode {
    IndexMode::Code
}

impl MapRequest {
    pub fn new(scope: MapScope, focus: impl Into<String>) -> Self {
        Self {
            scope,
            focus: focus.into(),
            mode: default_map_mode(),
            map_type: MapType::default(),
            format: MapFormat::default(),
            include_override: None,
            only_exported: false,
            collapse: None,
            max_files: None,
            max_members_per_file: None,
            max_edges: None,
            top_k_by_degree: false,
            viewer_args: Vec::new(),
        }
    }

    pub fn include(&self) -> String {
        self.include_override
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.map_type.include())
            .to_string()
    }
}

/// Files a map run writes to. Deterministic for a given root, scope, type and format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapOutputs {
    pub out: PathBuf,
    pub model: PathBuf,
    pub node_list: PathBuf,
}

impl MapOutputs {
    pub fn in_dir(dir: &Path, request: &MapRequest) -> Self {
        let stem = format!("map-{}-{}", request.scope, request.map_type);
        Self {
            out: dir.join(format!("{stem}.{}", request.format.extension())),
            model: dir.join(format!("{stem}.model.json")),
            node_list: dir.join(format!("{stem}.nodes.json")),
        }
    }
}

pub fn report_map(request: &MapRequest, repo: &Path, outputs: &MapOutputs) -> Vec<String> {
    let mut args = vec![
        "report".to_string(),
        "map".into(),
        "--repo".into(),
        path_arg(repo),
        "--mode".into(),
        request.mode.as_str().into(),
        "--scope".into(),
        request.scope.as_str().into(),
    ];
    if !request.focus.trim().is_empty() {
        args.push("--focus".into());
        args.push(request.focus.trim().into());
    }
    args.push("--include".into());
    args.push(request.include());
    if request.only_exported {
        args.push("--only-exported".into());
    }
    if let Some(collapse) = request.collapse.as_deref().filter(|c| !c.trim().is_empty()) {
        args.push("--collapse".into());
        args.push(collapse.trim().into());
    }
    for (flag, value) in [
        ("--max-files", request.max_files),
        ("--max-members-per-file", request.max_members_per_file),
        ("--max-edges", request.max_edges),
    ] {
        if let Some(value) = value {
            args.push(flag.into());
            args.push(value.to_string());
        }
    }
    if request.top_k_by_degree {
        args.push("--top-k-by-degree".into());
    }
    args.extend([
        "--format".to_string(),
        request.format.as_str().into(),
        "--out".into(),
        path_arg(&outputs.out),
        "--model-out".into(),
        path_arg(&outputs.model),
        "--node-list-out".into(),
        path_arg(&outputs.node_list),
    ]);
    args.extend(request.viewer_args.iter().cloned());
    args.push("--json".into());
    args
}

/// Query parameters for the map HTTP API, minus `format`.
pub fn map_query(request: &MapRequest, repo: &Path) -> Vec<(String, String)> {
    let mut params = vec![
        ("repo".to_string(), path_arg(repo)),
        ("mode".into(), request.mode.as_str().into()),
        ("scope".into(), request.scope.as_str().into()),
    ];
    if !request.focus.trim().is_empty() {
        params.push(("focus".into(), request.focus.trim().into()));
    }
    params.push(("include".into(), request.include()));
    if let Some(collapse) = request.collapse.as_deref().filter(|c| !c.trim().is_empty()) {
        params.push(("collapse".into(), collapse.trim().into()));
    }
    if request.only_exported {
        params.push(("onlyExported".into(), "true".into()));
    }
    for (key, value) in [
        ("maxFiles", request.max_files),
        ("maxMembersPerFile", request.max_members_per_file),
        ("maxEdges", request.max_edges),
    ] {
        if let Some(value) = value {
            params.push((key.into(), value.to_string()));
        }
    }
    if request.top_k_by_degree {
        params.push(("topKByDegree".into(), "true".into()));
    }
    params
}
