use super::{
    BuildOutcome, DispatchError, DispatchResult, DispatchTarget, Dispatcher, Outcome, ValidateOutcome,
};
use crate::port::Panel;
use crate::report::format_validate_report;
use cleats_protocol::{args, IndexMode, ProcessResult, EXIT_FOUND_ISSUES};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Result of asking for a watch.
#[derive(Debug)]
pub enum WatchStart {
    /// A watch for this window is still alive; nothing was spawned.
    AlreadyRunning { root: Option<PathBuf> },
    /// The watch was spawned and registered. `monitor` finishes once the
    /// process exits and its session has been cleared.
    Started { root: PathBuf, monitor: JoinHandle<()> },
}

impl WatchStart {
    pub fn outcome(&self) -> Outcome {
        match self {
            WatchStart::AlreadyRunning { root } => Outcome::WatchAlreadyRunning { root: root.clone() },
            WatchStart::Started { root, .. } => Outcome::WatchStarted { root: root.clone() },
        }
    }
}

impl Dispatcher {
    pub async fn build(&self, target: &DispatchTarget, mode: Option<IndexMode>) -> DispatchResult<BuildOutcome> {
        let root = self.prepare(target)?;
        let mode = mode.unwrap_or_else(|| self.settings.index_mode());
        let window = &target.window;

        self.port
            .show_status(window, &format!("index build started ({mode})."));
        let result = self
            .run_to_completion(target, &root, args::index_build(mode, &root), false, Some(Panel::Index))
            .await?;
        if !result.success() {
            return Err(DispatchError::exited(
                result.exit_code(),
                result.raw_output(),
                "index build failed.",
            ));
        }
        self.port
            .show_status(window, &format!("index build complete ({mode})."));
        Ok(BuildOutcome { root, mode })
    }

    /// Starts a watch unless the window already has a live one. Returns as
    /// soon as the process is spawned.
    ///
    /// The window is claimed before spawning, so concurrent requests for the
    /// same window start at most one process.
    pub fn start_watch(&self, target: &DispatchTarget) -> DispatchResult<WatchStart> {
        let root = self.prepare(target)?;
        let window = &target.window;
        let watch_root = self.settings.resolve_watch_root(&root);

        let reservation = match self.registry.reserve(window, watch_root.clone()) {
            Ok(reservation) => reservation,
            Err(active) => {
                self.port
                    .show_status(window, &format!("watch already running. ({})", active.display()));
                return Ok(WatchStart::AlreadyRunning { root: Some(active) });
            }
        };

        let watch_args = args::index_watch(&self.settings.watch_options(), &watch_root);
        let (handle, completion) =
            self.spawn(target, &root, &watch_root, watch_args, false, Some(Panel::Index))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        handle.on_cancel(move || flag.store(true, Ordering::SeqCst));

        self.port
            .show_status(window, &format!("watch started ({}).", watch_root.display()));
        reservation.complete(Arc::new(handle));

        let registry = Arc::clone(&self.registry);
        let port = Arc::clone(&self.port);
        let window = window.clone();
        let monitor = tokio::spawn(async move {
            let result = completion.wait().await;
            registry.clear_if_done(&window);
            match result {
                Ok(result) if result.success() || cancelled.load(Ordering::SeqCst) => {
                    port.show_status(&window, "watch stopped.");
                }
                Ok(result) => {
                    let err = DispatchError::exited(result.exit_code(), result.raw_output(), "watch failed.");
                    port.show_error(&window, &err.to_string());
                }
                Err(err) => port.show_error(&window, &err.to_string()),
            }
        });

        Ok(WatchStart::Started {
            root: watch_root,
            monitor,
        })
    }

    /// Stops the window's watch. Returns whether one was registered.
    pub fn stop_watch(&self, target: &DispatchTarget) -> bool {
        let existed = self.registry.stop(&target.window);
        let message = if existed {
            "watch stopping..."
        } else {
            "no watch to stop."
        };
        self.port.show_status(&target.window, message);
        existed
    }

    pub async fn validate(&self, target: &DispatchTarget) -> DispatchResult<ValidateOutcome> {
        let root = self.prepare(target)?;
        let window = &target.window;

        self.port.show_status(window, "validating index...");
        let result = self
            .run_to_completion(target, &root, args::index_validate(None, &root), true, None)
            .await?;
        if !matches!(result.exit_code(), 0 | EXIT_FOUND_ISSUES) {
            return Err(DispatchError::exited(
                result.exit_code(),
                result.raw_output(),
                "index validate failed.",
            ));
        }
        let payload = json_object(&result, "index validate returned invalid JSON.")?;

        let report = format_validate_report(payload);
        self.port.write_panel(window, Panel::Validate, &report);
        let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if ok {
            self.port.show_status(window, "index validation ok.");
        } else {
            self.port.show_error(window, "index validation found issues.");
        }
        Ok(ValidateOutcome { root, ok, report })
    }

    /// The tool's cache directory for this repo (`derived.repoCacheRoot`).
    pub async fn config_dump(&self, target: &DispatchTarget) -> DispatchResult<PathBuf> {
        let root = self.prepare(target)?;
        let result = self
            .run_to_completion(target, &root, args::config_dump(&root), true, None)
            .await?;
        if !result.success() {
            return Err(DispatchError::exited(
                result.exit_code(),
                result.raw_output(),
                "config dump failed.",
            ));
        }
        let payload = json_object(&result, "config dump returned invalid JSON.")?;
        payload
            .get("derived")
            .and_then(|derived| derived.get("repoCacheRoot"))
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| DispatchError::ToolReportedFailure("repo cache root unavailable.".into()))
    }
}

/// The parsed payload as a JSON object, or the matching parse error.
pub(super) fn json_object<'a>(result: &'a ProcessResult, invalid: &str) -> DispatchResult<&'a Map<String, Value>> {
    if let Some(err) = result.parse_error() {
        return Err(DispatchError::ResultParseError(err.to_string()));
    }
    result
        .parsed_payload()
        .and_then(Value::as_object)
        .ok_or_else(|| DispatchError::ResultParseError(invalid.to_string()))
}
