//! # Cleats Protocol
//!
//! Vocabulary shared by the bridge crates for talking to the external
//! `pairofcleats` tool: the actions it understands, the exact argument vectors
//! it expects, how an executable invocation is described, and the immutable
//! record of one finished tool process.
//!
//! Nothing in this crate touches the filesystem or spawns processes.

use anyhow::Result;
use serde::Serialize;

pub mod args;
mod error;
pub mod focus;
mod invocation;
mod modes;
mod result;

pub use error::{ProtocolError, ProtocolResult};
pub use invocation::{ToolInvocation, ToolSource};
pub use modes::{IndexMode, MapFormat, MapScope, MapType, SearchBackend, SearchMode};
pub use result::{CapturedJson, ProcessResult};

/// Bare command name resolved through `PATH` when nothing more specific exists.
pub const TOOL_COMMAND: &str = "pairofcleats";

/// Per-project configuration file that marks a project root.
pub const PROJECT_MARKER_FILE: &str = ".pairofcleats.json";

/// Version-control directories that mark a project root when no marker file exists.
pub const VCS_DIRS: &[&str] = &[".git"];

/// Script entrypoint of a repo-local checkout of the tool.
pub const REPO_ENTRYPOINT: &[&str] = &["bin", "pairofcleats.js"];

/// Directory holding locally installed dependency binaries.
pub const LOCAL_BIN_DIR: &[&str] = &["node_modules", ".bin"];

/// Default interpreter for script entrypoints.
pub const DEFAULT_INTERPRETER: &str = "node";

/// Script extensions that require [`DEFAULT_INTERPRETER`].
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Response header carrying the server-side cache key of a generated map.
pub const MAP_CACHE_KEY_HEADER: &str = "X-PairOfCleats-Map-CacheKey";

/// Exit code the tool uses for "ran fine, found issues" (index validate).
pub const EXIT_FOUND_ISSUES: i32 = 1;

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}
