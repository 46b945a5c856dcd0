mod domain;
mod error;
mod history;
mod index;
mod map;
mod search;

pub use domain::{
    Action, BuildOutcome, DispatchTarget, MapOutcome, MapSelection, MapSource, Outcome,
    SearchOutcome, ValidateOutcome,
};
pub use error::{DispatchError, DispatchResult};
pub use history::SearchHistoryEntry;
pub use index::WatchStart;

use crate::port::{EditorPort, Panel};
use crate::settings::BridgeSettings;
use cleats_protocol::ProcessResult;
use cleats_runner::{
    Completion, LineSink, ProcessHandle, ProcessRunner, ProjectLocator, RootDiagnostic, RunSpec,
    RunnerError, SessionRegistry, ToolResolver,
};
use history::SearchHistory;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Extra wait on shutdown beyond the forced-kill deadline.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// Turns editor actions into tool runs.
///
/// Every dispatch re-locates the project root and re-resolves the tool, so a
/// moved checkout or a freshly installed binary is picked up immediately.
/// Watch processes live in a [`SessionRegistry`] that may be shared between
/// dispatchers.
pub struct Dispatcher {
    settings: BridgeSettings,
    locator: ProjectLocator,
    resolver: ToolResolver,
    runner: ProcessRunner,
    registry: Arc<SessionRegistry>,
    history: SearchHistory,
    port: Arc<dyn EditorPort>,
}

impl Dispatcher {
    pub fn new(settings: BridgeSettings, port: Arc<dyn EditorPort>) -> Self {
        Self {
            settings,
            locator: ProjectLocator::default(),
            resolver: ToolResolver,
            runner: ProcessRunner::default(),
            registry: Arc::new(SessionRegistry::new()),
            history: SearchHistory::default(),
            port,
        }
    }

    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn port(&self) -> &Arc<dyn EditorPort> {
        &self.port
    }

    pub async fn dispatch(&self, target: &DispatchTarget, action: Action) -> DispatchResult<Outcome> {
        log::debug!("Dispatching {action:?} for window {}", target.window);
        match action {
            Action::Build { mode } => self.build(target, mode).await.map(Outcome::Built),
            Action::Watch => self.start_watch(target).map(|start| start.outcome()),
            Action::WatchStop => Ok(Outcome::WatchStopped {
                existed: self.stop_watch(target),
            }),
            Action::Validate => self.validate(target).await.map(Outcome::Validated),
            Action::ConfigDump => self
                .config_dump(target)
                .await
                .map(|path| Outcome::CacheRoot { path }),
            Action::Search { query, overrides } => self
                .search(target, &query, &overrides)
                .await
                .map(Outcome::Searched),
            Action::RepeatLastSearch => Ok(match self.repeat_last_search(target).await? {
                Some(outcome) => Outcome::Searched(outcome),
                None => Outcome::NothingToRepeat,
            }),
            Action::SearchHistory => Ok(Outcome::SearchHistory {
                entries: self.search_history(target),
            }),
            Action::Map(selection) => self.map(target, &selection).await.map(Outcome::Mapped),
        }
    }

    /// Cancels every watch and waits until the processes are gone, or until
    /// the forced kill should long have landed. Called once when the editor
    /// goes away.
    pub async fn shutdown(&self) {
        let windows = self.registry.active_windows();
        if windows.is_empty() {
            return;
        }
        log::info!("Stopping {} watch session(s)", windows.len());
        let deadline = self.runner.grace() + SHUTDOWN_MARGIN;
        if !self.registry.stop_all_and_wait(deadline).await {
            log::error!("Some watch processes did not exit within {deadline:?}");
        }
    }

    /// Locates the project root and validates settings against it.
    fn prepare(&self, target: &DispatchTarget) -> DispatchResult<PathBuf> {
        let located = self
            .locator
            .locate(target.hint.as_deref(), &target.open_folders);
        let Some(root) = located.root else {
            let reason = located
                .diagnostic
                .unwrap_or(RootDiagnostic::NoFoldersOpen)
                .to_string();
            return Err(DispatchError::NoProjectRoot(reason));
        };
        if let Some(diagnostic) = located.diagnostic {
            self.port.show_status(&target.window, &diagnostic.to_string());
        }

        let errors = self.settings.validate(&root);
        if !errors.is_empty() {
            return Err(DispatchError::InvalidConfiguration(errors));
        }
        Ok(root)
    }

    fn spawn(
        &self,
        target: &DispatchTarget,
        root: &Path,
        cwd: &Path,
        args: Vec<String>,
        capture_json: bool,
        panel: Option<Panel>,
    ) -> DispatchResult<(ProcessHandle, Completion)> {
        let invocation = self.resolver.resolve(&self.settings.tool_config(), root);
        log::debug!(
            "Resolved tool {} ({:?})",
            invocation.executable().display(),
            invocation.source()
        );
        let program = invocation.executable().display().to_string();
        let sink = panel.map(|panel| {
            let port = Arc::clone(&self.port);
            let window = target.window.clone();
            Box::new(move |line: &str| port.append_panel_line(&window, panel, line)) as LineSink
        });
        let spec = RunSpec {
            invocation,
            args,
            cwd: cwd.to_path_buf(),
            env: self.settings.child_env(),
            capture_json,
        };
        self.runner
            .run(spec, sink)
            .map_err(|err| launch_failed(program, err))
    }

    async fn run_to_completion(
        &self,
        target: &DispatchTarget,
        root: &Path,
        args: Vec<String>,
        capture_json: bool,
        panel: Option<Panel>,
    ) -> DispatchResult<ProcessResult> {
        let (_handle, completion) = self.spawn(target, root, root, args, capture_json, panel)?;
        let result = completion
            .wait()
            .await
            .map_err(|err| DispatchError::exited(-1, &err.to_string(), "tool run was interrupted."))?;
        log::debug!("Tool exited with {}", result.exit_code());
        Ok(result)
    }
}

fn launch_failed(program: String, err: RunnerError) -> DispatchError {
    match err {
        RunnerError::Launch { program, source } => DispatchError::ToolLaunchFailed { program, source },
        RunnerError::IoError(source) => DispatchError::ToolLaunchFailed { program, source },
        other => DispatchError::ToolLaunchFailed {
            program,
            source: std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        },
    }
}
