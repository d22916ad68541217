//! Lifecycle management for an auto-started `thv serve` API process.
//!
//! The supervisor owns at most one child: the API server it launched itself.
//! An API server that was already running when we probed it is never touched.
//! Termination always targets the child's process group so worker processes
//! forked by `thv` go down with it.
//!
//! No method here escalates a failure: a server that cannot be started only
//! degrades the API-backed operations, which will report transport errors on
//! their own.

use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use toolhive_mcp_core::Settings;

use crate::api::ControlPlane;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
/// Upper bound on retained child stderr; older output is discarded.
const STDERR_TAIL_LIMIT: usize = 8 * 1024;

/// What `ensure_running` found or did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnsureOutcome {
    /// The API answered the health probe before we spawned anything.
    AlreadyRunning,
    /// We spawned `thv serve` and it became healthy.
    Started { pid: u32 },
    /// The API is unreachable and could not be brought up. The reason has
    /// been logged.
    Failed,
}

impl EnsureOutcome {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, EnsureOutcome::Failed)
    }
}

/// Point-in-time view of the supervised child, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorStatus {
    pub auto_started: bool,
    pub pid: Option<u32>,
}

struct SupervisedProcess {
    child: Child,
    pid: u32,
    /// Tail of the child's stderr, filled by a background reader task.
    stderr_tail: Arc<StdMutex<String>>,
}

impl SupervisedProcess {
    fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|buf| buf.trim().to_string())
            .unwrap_or_default()
    }
}

/// Append one stderr line to the tail buffer, dropping the oldest output
/// once the buffer exceeds its limit.
fn push_tail(buf: &mut String, line: &str) {
    buf.push_str(line);
    buf.push('\n');
    if buf.len() > STDERR_TAIL_LIMIT {
        let cut = buf.len() - STDERR_TAIL_LIMIT;
        buf.drain(..cut);
    }
}

pub struct ApiSupervisor {
    settings: Settings,
    api: Arc<dyn ControlPlane>,
    slot: Mutex<Option<SupervisedProcess>>,
}

/// Host and port the API should listen on, taken from the configured base
/// URL. Falls back to the ToolHive defaults when the URL is unparseable.
fn listen_address(api_base: &str) -> (String, u16) {
    match Url::parse(api_base) {
        Ok(url) => {
            let host = url
                .host_str()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
                .unwrap_or_else(|| "127.0.0.1".to_string());
            (host, url.port().unwrap_or(8080))
        }
        Err(_) => ("127.0.0.1".to_string(), 8080),
    }
}

impl ApiSupervisor {
    pub fn new(settings: Settings, api: Arc<dyn ControlPlane>) -> Self {
        Self {
            settings,
            api,
            slot: Mutex::new(None),
        }
    }

    /// Make sure the control-plane API is reachable, auto-starting
    /// `thv serve` when allowed. Every failure path resolves to
    /// [`EnsureOutcome::Failed`] with a logged reason.
    ///
    /// A child that spawned but never turned healthy within the startup
    /// timeout is left running and untracked: it may still become healthy
    /// later, and keeping it alive preserves its logs for diagnosis.
    pub async fn ensure_running(&self) -> EnsureOutcome {
        if self.api.health().await.unwrap_or(false) {
            debug!("API already healthy, nothing to start");
            return EnsureOutcome::AlreadyRunning;
        }
        if !self.settings.auto_start {
            warn!(
                api_base = %self.settings.api_base,
                "API not reachable and auto-start is disabled"
            );
            return EnsureOutcome::Failed;
        }

        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.as_ref() {
            warn!(
                pid = existing.pid,
                "auto-started API server is tracked but unhealthy, not starting another"
            );
            return EnsureOutcome::Failed;
        }

        let mut process = match self.spawn_serve() {
            Ok(process) => process,
            Err(reason) => {
                error!("{reason}");
                return EnsureOutcome::Failed;
            }
        };
        info!(pid = process.pid, "started thv serve");

        let deadline = Instant::now() + self.settings.startup_timeout();
        loop {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    // Let the reader task drain what the child wrote on the
                    // way out.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let stderr = process.stderr_tail();
                    if stderr.is_empty() {
                        error!(%status, "thv serve exited during startup");
                    } else {
                        error!(%status, "thv serve exited during startup, stderr: {stderr}");
                    }
                    return EnsureOutcome::Failed;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("failed to poll thv serve: {e}");
                    return EnsureOutcome::Failed;
                }
            }
            if Instant::now() >= deadline {
                error!(
                    pid = process.pid,
                    timeout_secs = self.settings.startup_timeout_secs,
                    "API never became healthy; leaving the child running for diagnosis"
                );
                let stderr = process.stderr_tail();
                if !stderr.is_empty() {
                    error!(pid = process.pid, "thv serve stderr so far: {stderr}");
                }
                return EnsureOutcome::Failed;
            }
            if self.api.health().await.unwrap_or(false) {
                let pid = process.pid;
                *slot = Some(process);
                return EnsureOutcome::Started { pid };
            }
            tokio::time::sleep(self.settings.poll_interval()).await;
        }
    }

    fn spawn_serve(&self) -> Result<SupervisedProcess, String> {
        let (host, port) = listen_address(&self.settings.api_base);
        let mut cmd = Command::new(&self.settings.cli_path);
        cmd.arg("serve")
            .arg("--host")
            .arg(&host)
            .arg("--port")
            .arg(port.to_string())
            .args(&self.settings.serve_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to start `{} serve`: {e}", self.settings.cli_path))?;
        let pid = child
            .id()
            .ok_or_else(|| "thv serve exited before it was tracked".to_string())?;

        let stderr_tail = Arc::new(StdMutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let sink = stderr_tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "thv_serve", "{line}");
                    if let Ok(mut buf) = sink.lock() {
                        push_tail(&mut buf, &line);
                    }
                }
            });
        }

        Ok(SupervisedProcess {
            child,
            pid,
            stderr_tail,
        })
    }

    /// Stop the auto-started API server, if any. Safe to call repeatedly and
    /// when nothing was ever started; the tracked handle is cleared even when
    /// signaling fails.
    pub async fn shut_down(&self) {
        let Some(mut process) = self.slot.lock().await.take() else {
            return;
        };
        info!(pid = process.pid, "shutting down auto-started API server");
        terminate(&mut process).await;
    }

    pub async fn status(&self) -> SupervisorStatus {
        let slot = self.slot.lock().await;
        SupervisorStatus {
            auto_started: slot.is_some(),
            pid: slot.as_ref().map(|p| p.pid),
        }
    }

    #[cfg(test)]
    async fn adopt(&self, child: Child) {
        let pid = child.id().expect("child has a pid");
        *self.slot.lock().await = Some(SupervisedProcess {
            child,
            pid,
            stderr_tail: Arc::new(StdMutex::new(String::new())),
        });
    }
}

impl Drop for ApiSupervisor {
    fn drop(&mut self) {
        // Emergency path when shut_down was never awaited.
        if let Ok(mut slot) = self.slot.try_lock() {
            if let Some(process) = slot.take() {
                warn!(
                    pid = process.pid,
                    "supervisor dropped with live child, sending SIGTERM"
                );
                signal_group(process.pid, TermSignal::Term);
            }
        }
    }
}

/// Graceful group termination: SIGTERM, bounded wait, then SIGKILL. A group
/// that cannot be signaled is treated as already gone.
async fn terminate(process: &mut SupervisedProcess) {
    signal_group(process.pid, TermSignal::Term);
    match tokio::time::timeout(SHUTDOWN_GRACE, process.child.wait()).await {
        Ok(Ok(status)) => debug!(pid = process.pid, %status, "API server exited"),
        Ok(Err(e)) => warn!(pid = process.pid, "failed to reap API server: {e}"),
        Err(_) => {
            warn!(pid = process.pid, "API server ignored SIGTERM, escalating");
            signal_group(process.pid, TermSignal::Kill);
            if let Err(e) = process.child.wait().await {
                warn!(pid = process.pid, "failed to reap API server: {e}");
            }
        }
    }
}

#[derive(Clone, Copy)]
enum TermSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: TermSignal) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let signal = match signal {
        TermSignal::Term => Signal::SIGTERM,
        TermSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH: the group is already gone, which is the state we want.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("failed to signal process group {pid}: {e}"),
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: TermSignal) {}
