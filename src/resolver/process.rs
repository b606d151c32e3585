//! Child process execution
//!
//! Spawns the resolver binary with captured output and a hard wall-clock
//! limit. Every live child is tied to a [`ProcessTracker`] so shutdown can
//! kill them all at once.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ResolveError;

/// Captured result of a finished child
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, absent when killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Seam over process spawning
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` to completion, or fail after `limit`
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> Result<ProcessOutput, ResolveError>;
}

/// Shutdown handle shared by every spawned child
#[derive(Debug, Clone, Default)]
pub struct ProcessTracker {
    token: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill every live child and refuse new ones
    pub fn terminate_all(&self) {
        let active = self.active();
        if active > 0 {
            warn!("Terminating {} running resolver process(es)", active);
        }
        self.token.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of children currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no tracked child is running, up to `limit`
    pub async fn drained(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            while self.active() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    fn register(&self) -> ActiveChild {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveChild(self.active.clone())
    }
}

struct ActiveChild(Arc<AtomicUsize>);

impl Drop for ActiveChild {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Finish {
    Exited(std::io::Result<std::process::ExitStatus>, Vec<u8>, Vec<u8>),
    TimedOut,
    Terminated,
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    tracker: ProcessTracker,
}

impl TokioProcessRunner {
    pub fn new(tracker: ProcessTracker) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &ProcessTracker {
        &self.tracker
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> Result<ProcessOutput, ResolveError> {
        if self.tracker.is_terminated() {
            return Err(ResolveError::Terminated);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| ResolveError::spawn_failure(format!("{program}: {e}")))?;
        let _active = self.tracker.register();
        let pid = child.id();
        debug!("Spawned {} (pid {:?})", program, pid);

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ResolveError::spawn_failure("stdout not captured"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ResolveError::spawn_failure("stderr not captured"))?;

        // Both pipes must reach EOF inside the deadline: a grandchild that
        // inherited them keeps the run alive even after the child exits.
        let collect = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let (status, out, err) = tokio::join!(
                child.wait(),
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr),
            );
            if let Err(e) = out.and(err) {
                debug!("Output of {} truncated: {}", program, e);
            }
            (status, stdout, stderr)
        };

        let finish = tokio::select! {
            (status, stdout, stderr) = collect => Finish::Exited(status, stdout, stderr),
            _ = tokio::time::sleep(limit) => Finish::TimedOut,
            _ = self.tracker.token.cancelled() => Finish::Terminated,
        };

        match finish {
            Finish::Exited(status, stdout, stderr) => {
                let status = status
                    .map_err(|e| ResolveError::spawn_failure(format!("wait failed: {e}")))?;
                Ok(ProcessOutput {
                    code: status.code(),
                    stdout,
                    stderr,
                })
            }
            interrupted => {
                kill_group(pid);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", program, e);
                }
                Err(match interrupted {
                    Finish::TimedOut => ResolveError::timeout(limit.as_secs()),
                    _ => ResolveError::Terminated,
                })
            }
        }
    }
}

/// SIGKILL the child's process group, reaching anything it started
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!("Process group {} not signalled: {}", pgid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
