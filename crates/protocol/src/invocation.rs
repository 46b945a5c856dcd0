use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a [`ToolInvocation`] came from, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    ExplicitConfig,
    LocalInstall,
    RepoLocal,
    SystemPath,
}

/// Executable plus the arguments that precede every action-specific argument.
///
/// Built fresh for each dispatch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    executable: PathBuf,
    args_prefix: Vec<String>,
    source: ToolSource,
}

impl ToolInvocation {
    pub fn new(executable: impl Into<PathBuf>, args_prefix: Vec<String>, source: ToolSource) -> Self {
        Self {
            executable: executable.into(),
            args_prefix,
            source,
        }
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    pub fn args_prefix(&self) -> &[String] {
        &self.args_prefix
    }

    pub fn source(&self) -> ToolSource {
        self.source
    }

    /// Full argument vector: prefix followed by `args`.
    pub fn argv<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args_prefix
            .iter()
            .cloned()
            .chain(args.into_iter().map(Into::into))
            .collect()
    }
}
