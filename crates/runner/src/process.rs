//! Asynchronous child-process execution with streamed, merged output and
//! two-phase cancellation.
//!
//! [`ProcessRunner::run`] spawns the child and returns immediately with a
//! [`ProcessHandle`] (for cancellation and liveness) and a [`Completion`]
//! (resolves to the [`ProcessResult`]). One driver task per child reads both
//! output streams and waits for exit; the completion resolves strictly after
//! the last line was forwarded and the process has exited.

use crate::error::{Result, RunnerError};
use crate::platform::wrap_for_platform;
use cleats_protocol::{ProcessResult, ToolInvocation};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Notify};

/// Time between the terminate request and the forced kill.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(1500);

/// Receives every output line, in order, without its trailing newline.
pub type LineSink = Box<dyn FnMut(&str) + Send>;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Everything needed to launch one tool process.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub invocation: ToolInvocation,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Overrides applied on top of the inherited process environment.
    pub env: BTreeMap<String, String>,
    pub capture_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Running,
    Cancelling,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
        }
    }
}

impl ProcessRunner {
    pub fn with_grace(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Spawns the tool. Must be called from inside a tokio runtime.
    pub fn run(&self, spec: RunSpec, sink: Option<LineSink>) -> Result<(ProcessHandle, Completion)> {
        if !spec.cwd.is_dir() {
            return Err(RunnerError::InvalidPath(spec.cwd.display().to_string()));
        }

        let argv = spec.invocation.argv(spec.args.iter().cloned());
        let (program, argv) = wrap_for_platform(spec.invocation.executable(), argv, cfg!(windows));
        log::debug!(
            "Spawning {} {:?} in {}",
            program.display(),
            argv,
            spec.cwd.display()
        );

        let mut command = Command::new(&program);
        command
            .args(&argv)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RunnerError::Launch {
            program: program.display().to_string(),
            source,
        })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(HandleState::Running),
            pid: child.id(),
            kill_tx: Mutex::new(Some(kill_tx)),
            on_cancel: Mutex::new(None),
            grace: self.grace,
            exited: Notify::new(),
        });

        let (done_tx, done_rx) = oneshot::channel();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let driver_shared = Arc::clone(&shared);
        let capture_json = spec.capture_json;
        tokio::spawn(async move {
            let mut sink = sink;
            let waiter = wait_for_exit(&mut child, kill_rx, &driver_shared);
            let reader = read_merged(stdout, stderr, &mut sink);
            let (status, output) = tokio::join!(waiter, reader);

            let exit_code = match status {
                Ok(status) => exit_code_of(status),
                Err(err) => {
                    log::warn!("Failed to wait for tool process: {err}");
                    -1
                }
            };
            log::debug!("Tool process {:?} exited with {exit_code}", driver_shared.pid);
            let _ = done_tx.send(ProcessResult::new(exit_code, output, capture_json));
        });

        Ok((ProcessHandle { shared }, Completion { rx: done_rx }))
    }
}

/// Resolves once the process has exited and all of its output was read.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<ProcessResult>,
}

impl Completion {
    pub async fn wait(self) -> Result<ProcessResult> {
        self.rx
            .await
            .map_err(|_| RunnerError::Other("tool process driver stopped before reporting".into()))
    }
}

struct Shared {
    state: Mutex<HandleState>,
    pid: Option<u32>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    on_cancel: Mutex<Option<CancelHook>>,
    grace: Duration,
    exited: Notify,
}

impl Shared {
    fn state(&self) -> HandleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_exited(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = HandleState::Terminated;
        self.kill_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.exited.notify_waiters();
    }

    fn force_kill(&self) {
        let sender = self
            .kill_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            log::info!("Force-killing tool process {:?}", self.pid);
            let _ = sender.send(());
        }
    }

    #[cfg(unix)]
    fn terminate(&self) -> bool {
        let Some(pid) = self.pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return false;
        };
        let sent = unsafe { libc::kill(pid, libc::SIGTERM) } == 0;
        if sent {
            log::debug!("Sent SIGTERM to tool process {pid}");
        }
        sent
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> bool {
        false
    }
}

/// Cancellation and liveness handle for one spawned process.
///
/// Clones share the same process. Cancelling is idempotent.
#[derive(Clone)]
pub struct ProcessHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.shared.pid)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.shared.pid
    }

    pub fn state(&self) -> HandleState {
        self.shared.state()
    }

    /// True until the process has been reaped, including while cancelling.
    pub fn is_running(&self) -> bool {
        self.state() != HandleState::Terminated
    }

    /// Resolves once the process has been reaped.
    pub async fn terminated(&self) {
        loop {
            // Registered on creation, so an exit between the check and the
            // await still wakes it.
            let exited = self.shared.exited.notified();
            if self.state() == HandleState::Terminated {
                return;
            }
            exited.await;
        }
    }

    /// Registers bookkeeping to run once, on the first effective `cancel`.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        *self
            .shared
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Asks the process to terminate and schedules a forced kill after the
    /// grace period. Returns false when the process already exited or a
    /// cancel is in progress. Never blocks.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != HandleState::Running {
                return false;
            }
            *state = HandleState::Cancelling;
        }

        if !self.shared.terminate() {
            self.shared.force_kill();
        }

        let hook = self
            .shared
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(&self.shared);
                runtime.spawn(async move {
                    tokio::time::sleep(shared.grace).await;
                    if shared.state() != HandleState::Terminated {
                        log::warn!(
                            "Tool process {:?} ignored terminate for {:?}",
                            shared.pid,
                            shared.grace
                        );
                        shared.force_kill();
                    }
                });
            }
            Err(_) => self.shared.force_kill(),
        }
        true
    }
}

async fn wait_for_exit(
    child: &mut Child,
    mut kill_rx: oneshot::Receiver<()>,
    shared: &Shared,
) -> std::io::Result<ExitStatus> {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(err) = child.start_kill() {
                log::debug!("Kill request failed: {err}");
            }
            child.wait().await
        }
    };
    shared.mark_exited();
    status
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
        log::debug!("Tool process terminated by signal {signal}");
    }
    status.code().unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Reads stdout and stderr concurrently, forwarding whole lines as they
/// complete, and returns the accumulated output.
async fn read_merged<O, E>(stdout: Option<O>, stderr: Option<E>, sink: &mut Option<LineSink>) -> String
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = stdout.map(BufReader::new);
    let mut err = stderr.map(BufReader::new);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut collected = String::new();

    while out.is_some() || err.is_some() {
        tokio::select! {
            read = next_line(&mut out, &mut out_buf) => {
                drain(read, &mut out, &mut out_buf, sink, &mut collected);
            }
            read = next_line(&mut err, &mut err_buf) => {
                drain(read, &mut err, &mut err_buf, sink, &mut collected);
            }
        }
    }
    collected
}

// `read_until` appends partial reads to `buf`, so a cancelled branch loses nothing.
async fn next_line<R>(reader: &mut Option<BufReader<R>>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}

fn drain<R>(
    read: std::io::Result<usize>,
    reader: &mut Option<R>,
    buf: &mut Vec<u8>,
    sink: &mut Option<LineSink>,
    collected: &mut String,
) {
    match read {
        Ok(0) => {
            emit_line(buf, sink, collected);
            *reader = None;
        }
        Ok(_) => emit_line(buf, sink, collected),
        Err(err) => {
            log::warn!("Error reading tool output: {err}");
            emit_line(buf, sink, collected);
            *reader = None;
        }
    }
}

fn emit_line(buf: &mut Vec<u8>, sink: &mut Option<LineSink>, collected: &mut String) {
    if buf.is_empty() {
        return;
    }
    {
        let text = String::from_utf8_lossy(buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if let Some(sink) = sink.as_mut() {
            (*sink)(line);
        }
        collected.push_str(line);
        collected.push('\n');
    }
    buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merged_reader_keeps_per_stream_order_and_final_partial_line() {
        let stdout: &[u8] = b"one\r\ntwo\nthree";
        let stderr: &[u8] = b"";
        let lines = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&lines);
        let mut sink: Option<LineSink> = Some(Box::new(move |line: &str| {
            seen.lock().unwrap().push(line.to_string());
        }));

        let output = read_merged(Some(stdout), Some(stderr), &mut sink).await;
        assert_eq!(output, "one\ntwo\nthree\n");
        assert_eq!(*lines.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn missing_cwd_is_rejected_before_spawn() {
        let spec = RunSpec {
            invocation: ToolInvocation::new("true", Vec::new(), cleats_protocol::ToolSource::SystemPath),
            args: Vec::new(),
            cwd: PathBuf::from("/definitely/not/a/dir/cleats"),
            env: BTreeMap::new(),
            capture_json: false,
        };
        let err = ProcessRunner::default().run(spec, None).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidPath(_)));
    }
}
