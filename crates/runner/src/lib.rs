//! # Cleats Runner
//!
//! Filesystem and process layer of the bridge.
//!
//! ## Flow
//!
//! ```text
//! hint path / open folders
//!     │
//!     ├──> ProjectLocator (marker file, then .git, walking up)
//!     │      └─> project root
//!     │
//!     ├──> ToolResolver (config → node_modules/.bin → bin/*.js → PATH)
//!     │      └─> ToolInvocation
//!     │
//!     └──> ProcessRunner (merged streaming output, two-phase cancel)
//!            ├─> ProcessHandle ──> SessionRegistry (watch sessions)
//!            └─> Completion ──> ProcessResult
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use cleats_runner::{ProcessRunner, ProjectLocator, RunSpec, ToolConfig, ToolResolver};
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let located = ProjectLocator::default().locate(Some("src/main.js".as_ref()), &[]);
//!     let root = located.root.expect("project root");
//!     let invocation = ToolResolver.resolve(&ToolConfig::default(), &root);
//!     let spec = RunSpec {
//!         invocation,
//!         args: vec!["index".into(), "build".into(), "--repo".into(), root.display().to_string()],
//!         cwd: root,
//!         env: BTreeMap::new(),
//!         capture_json: false,
//!     };
//!     let (_handle, completion) = ProcessRunner::default().run(spec, None)?;
//!     println!("exit {}", completion.wait().await?.exit_code());
//!     Ok(())
//! }
//! ```

mod error;
mod locator;
mod platform;
mod process;
mod registry;
mod resolver;

pub use error::{Result, RunnerError};
pub use locator::{Located, ProjectLocator, RootDiagnostic};
pub use platform::wrap_for_platform;
pub use process::{
    Completion, HandleState, LineSink, ProcessHandle, ProcessRunner, RunSpec, DEFAULT_GRACE,
};
pub use registry::{
    SessionRegistry, Terminated, WatchProcess, WatchReservation, WatchSession, WindowKey,
};
pub use resolver::{needs_interpreter, ToolConfig, ToolResolver};
