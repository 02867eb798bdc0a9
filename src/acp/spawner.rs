//! ACP agent process spawner and exit monitor.
//!
//! Agents inherit the parent environment plus a per-launch overlay, run in
//! the conversation workspace, and on Unix lead their own process group so a
//! kill reaches the whole tree (ACP bridges commonly fork the real CLI).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Fully resolved launch parameters for one agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory.
    pub cwd: PathBuf,
}

/// A freshly spawned agent with its stdio pipes detached.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; `kill_on_drop` is set.
    pub child: Child,
    /// Agent stdin.
    pub stdin: ChildStdin,
    /// Agent stdout.
    pub stdout: ChildStdout,
}

/// Spawn the agent described by `spec`.
///
/// Stderr is drained into `DEBUG` logs so a chatty agent never blocks on a
/// full pipe.
///
/// # Errors
///
/// - `AppError::Launch("failed to spawn agent: ...")` on OS spawn failure.
/// - `AppError::Launch("failed to capture agent ...")` if a pipe is missing.
pub fn spawn_agent(spec: &LaunchSpec, label: &str) -> Result<AgentProcess> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .current_dir(&spec.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Launch(format!("failed to spawn agent '{}': {err}", spec.program))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture agent stdout".into()))?;

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(label, line, "agent stderr");
            }
        });
    }

    info!(
        label,
        program = spec.program.as_str(),
        pid = child.id(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdin,
        stdout,
    })
}

/// Control handle for a monitored agent process.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pid: Option<u32>,
    kill: CancellationToken,
    exited: CancellationToken,
}

impl ProcessControl {
    /// Ask the process tree to terminate (`SIGTERM` on Unix).
    pub fn terminate(&self) {
        #[cfg(unix)]
        signal_group(self.pid, nix::sys::signal::Signal::SIGTERM);
    }

    /// Force-terminate the process tree. Idempotent.
    pub fn force_kill(&self) {
        self.kill.cancel();
    }

    /// Whether the process has exited.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Resolve once the process has exited.
    pub async fn wait_exited(&self) {
        self.exited.cancelled().await;
    }
}

/// Spawn a task that owns `child`, reaps it on exit, and force-kills it
/// when [`ProcessControl::force_kill`] is called.
#[must_use]
pub fn monitor_exit(label: String, mut child: Child) -> ProcessControl {
    let control = ProcessControl {
        pid: child.id(),
        kill: CancellationToken::new(),
        exited: CancellationToken::new(),
    };
    let task_control = control.clone();

    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => match result {
                Ok(status) => info!(label, %status, "agent process exited"),
                Err(err) => warn!(label, %err, "error waiting for agent process"),
            },
            () = task_control.kill.cancelled() => {
                #[cfg(unix)]
                signal_group(task_control.pid, nix::sys::signal::Signal::SIGKILL);
                if let Err(err) = child.kill().await {
                    debug!(label, %err, "agent kill after group signal");
                }
                warn!(label, "agent process force-killed");
            }
        }
        task_control.exited.cancel();
    });

    control
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid), signal) {
        debug!(pid, ?signal, %err, "process group signal failed");
    }
}
