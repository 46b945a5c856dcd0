use cleats_protocol::{
    ToolInvocation, ToolSource, DEFAULT_INTERPRETER, LOCAL_BIN_DIR, REPO_ENTRYPOINT,
    SCRIPT_EXTENSIONS, TOOL_COMMAND,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filename variants tried in the local dependency-binaries directory.
const LOCAL_BIN_SUFFIXES: &[&str] = &["", ".cmd", ".ps1"];

/// The part of the bridge settings that decides which executable runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Explicit executable or script; relative paths are taken from the project root.
    #[serde(default)]
    pub tool_path: Option<PathBuf>,
    /// Extra arguments placed before every action's arguments. Not applied
    /// to the repo-local script, which belongs to the checkout.
    #[serde(default)]
    pub tool_args: Vec<String>,
    /// Interpreter for script entrypoints (defaults to `node`).
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
}

impl ToolConfig {
    pub fn configured_tool_path(&self, root: &Path) -> Option<PathBuf> {
        let raw = self.tool_path.as_ref()?;
        if raw.as_os_str().is_empty() {
            return None;
        }
        Some(if raw.is_absolute() {
            raw.clone()
        } else {
            root.join(raw)
        })
    }
}

/// Decides the executable for a dispatch.
///
/// Precedence: explicit config, then a locally installed binary, then a
/// repo-local script, then the bare command name on `PATH`. Nothing is cached;
/// every call re-reads the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolResolver;

impl ToolResolver {
    pub fn resolve(&self, config: &ToolConfig, root: &Path) -> ToolInvocation {
        if let Some(path) = config.configured_tool_path(root) {
            return self.invocation_for(config, path, ToolSource::ExplicitConfig);
        }

        let bin_dir = LOCAL_BIN_DIR
            .iter()
            .fold(root.to_path_buf(), |acc, part| acc.join(part));
        for suffix in LOCAL_BIN_SUFFIXES {
            let candidate = bin_dir.join(format!("{TOOL_COMMAND}{suffix}"));
            if candidate.is_file() {
                return self.invocation_for(config, candidate, ToolSource::LocalInstall);
            }
        }

        let entrypoint = REPO_ENTRYPOINT
            .iter()
            .fold(root.to_path_buf(), |acc, part| acc.join(part));
        if entrypoint.is_file() {
            return self.invocation_for(config, entrypoint, ToolSource::RepoLocal);
        }

        self.invocation_for(config, PathBuf::from(TOOL_COMMAND), ToolSource::SystemPath)
    }

    fn invocation_for(&self, config: &ToolConfig, target: PathBuf, source: ToolSource) -> ToolInvocation {
        let extra_args: &[String] = match source {
            ToolSource::RepoLocal => &[],
            _ => config.tool_args.as_slice(),
        };
        if needs_interpreter(&target) {
            let interpreter = config
                .interpreter
                .clone()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERPRETER));
            let mut prefix = vec![target.to_string_lossy().into_owned()];
            prefix.extend(extra_args.iter().cloned());
            return ToolInvocation::new(interpreter, prefix, source);
        }
        ToolInvocation::new(target, extra_args.to_vec(), source)
    }
}

pub fn needs_interpreter(target: &Path) -> bool {
    target
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SCRIPT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
