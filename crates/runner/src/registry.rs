use crate::process::ProcessHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Boxed future returned by [`WatchProcess::terminated`].
pub type Terminated<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// What the registry needs from a watch process.
pub trait WatchProcess: Send + Sync {
    /// Live check, not a cached flag.
    fn is_running(&self) -> bool;
    /// Idempotent; returns whether a cancel was actually started.
    fn cancel(&self) -> bool;
    /// Resolves once the process is gone.
    fn terminated(&self) -> Terminated<'_> {
        Box::pin(std::future::ready(()))
    }
}

impl WatchProcess for ProcessHandle {
    fn is_running(&self) -> bool {
        ProcessHandle::is_running(self)
    }

    fn cancel(&self) -> bool {
        ProcessHandle::cancel(self)
    }

    fn terminated(&self) -> Terminated<'_> {
        Box::pin(ProcessHandle::terminated(self))
    }
}

/// Opaque editor-window identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowKey(String);

impl WindowKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone)]
pub struct WatchSession {
    pub window: WindowKey,
    pub handle: Arc<dyn WatchProcess>,
    pub root: PathBuf,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("window", &self.window)
            .field("root", &self.root)
            .field("running", &self.handle.is_running())
            .finish()
    }
}

#[derive(Debug)]
enum Slot {
    /// Claimed by a [`WatchReservation`] whose process is being spawned.
    Starting { root: PathBuf, token: u64 },
    Live(WatchSession),
}

impl Slot {
    fn root(&self) -> &Path {
        match self {
            Slot::Starting { root, .. } => root,
            Slot::Live(session) => &session.root,
        }
    }

    fn is_running(&self) -> bool {
        match self {
            Slot::Starting { .. } => true,
            Slot::Live(session) => session.handle.is_running(),
        }
    }

    fn is_reserved_by(&self, token: u64) -> bool {
        matches!(self, Slot::Starting { token: held, .. } if *held == token)
    }
}

/// Long-lived watch processes, at most one per editor window.
///
/// Holds shared references to handles; the dispatch that spawned a process
/// keeps its own. Safe to call from any task or thread.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<WindowKey, Slot>>,
    next_token: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WindowKey, Slot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `window` for a watch that is about to be spawned. Fails with
    /// the current root while another watch for the window is live or
    /// starting. Dropping the reservation without completing it frees the
    /// window again.
    pub fn reserve(&self, window: &WindowKey, root: PathBuf) -> Result<WatchReservation<'_>, PathBuf> {
        let mut sessions = self.lock();
        if let Some(slot) = sessions.get(window).filter(|slot| slot.is_running()) {
            return Err(slot.root().to_path_buf());
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        sessions.insert(window.clone(), Slot::Starting { root: root.clone(), token });
        log::debug!("Reserved window {window} for a watch at {}", root.display());
        Ok(WatchReservation {
            registry: self,
            window: window.clone(),
            root,
            token,
            settled: false,
        })
    }

    /// Stores the session. A still-running session under the same key is
    /// cancelled rather than leaked.
    pub fn register(&self, window: WindowKey, handle: Arc<dyn WatchProcess>, root: PathBuf) {
        log::info!("Watch registered for window {window} at {}", root.display());
        let session = WatchSession {
            window: window.clone(),
            handle,
            root,
        };
        let previous = self.lock().insert(window, Slot::Live(session));
        if let Some(Slot::Live(previous)) = previous {
            if previous.handle.is_running() {
                log::warn!(
                    "Window {} already had a live watch at {}; cancelling it",
                    previous.window,
                    previous.root.display()
                );
                previous.handle.cancel();
            }
        }
    }

    /// True while the window's watch is live or still starting.
    pub fn is_running(&self, window: &WindowKey) -> bool {
        self.lock().get(window).map(Slot::is_running).unwrap_or(false)
    }

    /// Removes the session and cancels its process. Returns whether one existed.
    ///
    /// A watch that is still starting is cancelled as soon as its process
    /// is handed over.
    pub fn stop(&self, window: &WindowKey) -> bool {
        let removed = self.lock().remove(window);
        match removed {
            Some(Slot::Live(session)) => {
                log::info!("Stopping watch for window {window}");
                session.handle.cancel();
                true
            }
            Some(Slot::Starting { .. }) => {
                log::info!("Withdrawing starting watch for window {window}");
                true
            }
            None => false,
        }
    }

    /// Cancels every session. Never panics, even if a cancel does.
    pub fn stop_all(&self) {
        self.cancel_all();
    }

    /// Cancels every session, then waits up to `timeout` for their processes
    /// to exit. Returns false when some process outlived the timeout.
    pub async fn stop_all_and_wait(&self, timeout: Duration) -> bool {
        let handles = self.cancel_all();
        if handles.is_empty() {
            return true;
        }
        let exits = async {
            for handle in &handles {
                handle.terminated().await;
            }
        };
        match tokio::time::timeout(timeout, exits).await {
            Ok(()) => true,
            Err(_) => {
                let alive = handles.iter().filter(|handle| handle.is_running()).count();
                log::warn!("{alive} watch process(es) still running after {timeout:?}");
                false
            }
        }
    }

    fn cancel_all(&self) -> Vec<Arc<dyn WatchProcess>> {
        let drained: Vec<(WindowKey, Slot)> = self.lock().drain().collect();
        let mut handles = Vec::with_capacity(drained.len());
        for (window, slot) in drained {
            let Slot::Live(session) = slot else {
                continue;
            };
            let handle = Arc::clone(&session.handle);
            if catch_unwind(AssertUnwindSafe(|| handle.cancel())).is_err() {
                log::error!("Cancelling watch for window {window} panicked");
            }
            handles.push(handle);
        }
        handles
    }

    /// Drops the session if its process has exited.
    pub fn clear_if_done(&self, window: &WindowKey) {
        let mut sessions = self.lock();
        let finished = match sessions.get(window) {
            Some(Slot::Live(session)) => !session.handle.is_running(),
            _ => false,
        };
        if finished {
            sessions.remove(window);
            log::debug!("Cleared finished watch for window {window}");
        }
    }

    pub fn current_root(&self, window: &WindowKey) -> Option<PathBuf> {
        self.lock().get(window).map(|slot| slot.root().to_path_buf())
    }

    pub fn active_windows(&self) -> Vec<WindowKey> {
        let mut windows: Vec<WindowKey> = self.lock().keys().cloned().collect();
        windows.sort();
        windows
    }
}

/// A window claimed by [`SessionRegistry::reserve`].
#[must_use = "dropping a reservation frees the window"]
#[derive(Debug)]
pub struct WatchReservation<'a> {
    registry: &'a SessionRegistry,
    window: WindowKey,
    root: PathBuf,
    token: u64,
    settled: bool,
}

impl WatchReservation<'_> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installs the spawned process. If the window was stopped while the
    /// process was starting, cancels it instead and returns false.
    pub fn complete(mut self, handle: Arc<dyn WatchProcess>) -> bool {
        self.settled = true;
        let mut sessions = self.registry.lock();
        let still_reserved = sessions
            .get(&self.window)
            .map(|slot| slot.is_reserved_by(self.token))
            .unwrap_or(false);
        if still_reserved {
            let session = WatchSession {
                window: self.window.clone(),
                handle,
                root: self.root.clone(),
            };
            sessions.insert(self.window.clone(), Slot::Live(session));
            log::info!("Watch registered for window {} at {}", self.window, self.root.display());
            return true;
        }
        drop(sessions);
        log::info!("Watch for window {} was stopped while starting", self.window);
        handle.cancel();
        false
    }
}

impl Drop for WatchReservation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut sessions = self.registry.lock();
        let still_reserved = sessions
            .get(&self.window)
            .map(|slot| slot.is_reserved_by(self.token))
            .unwrap_or(false);
        if still_reserved {
            sessions.remove(&self.window);
            log::debug!("Released watch reservation for window {}", self.window);
        }
    }
}
