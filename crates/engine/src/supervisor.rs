// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process Supervisor: spawns, signals, and waits on one managed child.
//!
//! Grounded on `examples/original_source/internal/supervisor/manager.go`.
//! The Go `ProcessManager` tracks a single `*exec.Cmd`; per
//! `spec.md` §3 ("at most one current and at most one candidate") the
//! Orchestration Engine instantiates two `ManagedProcess` values rather
//! than teaching this type about process identity — it stays
//! single-process per instance, same shape as the Go type.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use aeterna_core::error::EngineError;

use crate::socket::{ENV_INHERITED_FDS, INHERITED_FD_BASE};

/// One supervised child process.
pub struct ManagedProcess {
    child: Option<tokio::process::Child>,
}

impl ManagedProcess {
    pub fn new() -> Self {
        Self { child: None }
    }

    /// Spawn `command[0]` with `command[1..]` as arguments. `env` is a
    /// list of `KEY=VALUE` pairs merged on top of the current
    /// environment. `extra_files` are attached starting at
    /// [`INHERITED_FD_BASE`] and announced to the child via
    /// [`ENV_INHERITED_FDS`]. An empty `command` is a no-op, matching
    /// the Go prototype's early return (used by tests that only
    /// exercise the socket/FSM layers).
    pub fn start(
        &mut self,
        command: &[String],
        env: &[String],
        extra_files: Vec<OwnedFd>,
    ) -> Result<(), EngineError> {
        if command.is_empty() {
            return Ok(());
        }

        let mut cmd = tokio::process::Command::new(&command[0]);
        cmd.args(&command[1..]);
        cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
        cmd.kill_on_drop(false);

        for pair in env {
            if let Some((key, value)) = pair.split_once('=') {
                cmd.env(key, value);
            }
        }

        if !extra_files.is_empty() {
            cmd.env(ENV_INHERITED_FDS, extra_files.len().to_string());
            let source_fds: Vec<RawFd> = extra_files.iter().map(|f| f.as_raw_fd()).collect();
            // SAFETY: runs in the forked child before exec, async-signal-safe
            // (only dup2, no allocation). `source_fds` are still open in the
            // parent (and therefore in the freshly forked child) because
            // `extra_files` is held alive in this function's scope past
            // `spawn()`.
            unsafe {
                cmd.pre_exec(move || {
                    for (i, fd) in source_fds.iter().enumerate() {
                        let target = INHERITED_FD_BASE + i as RawFd;
                        if *fd != target {
                            nix::unistd::dup2(*fd, target).map_err(std::io::Error::from)?;
                        }
                    }
                    Ok(())
                });
            }
        }

        let child = cmd.spawn().map_err(EngineError::ProcessStartFailed)?;
        drop(extra_files);
        self.child = Some(child);
        Ok(())
    }

    /// The child's pid, if one is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Send a graceful termination signal.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.signal(Signal::SIGTERM)
    }

    /// Send an immediate termination signal (used on the rollback path).
    pub fn kill(&self) -> Result<(), EngineError> {
        self.signal(Signal::SIGKILL)
    }

    fn signal(&self, sig: Signal) -> Result<(), EngineError> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        signal::kill(Pid::from_raw(pid as i32), sig).map_err(|e| {
            EngineError::ProcessStartFailed(std::io::Error::from_raw_os_error(e as i32))
        })
    }

    /// Block until the child exits and return its status. A no-op
    /// process (never started) returns a synthetic success status.
    pub async fn wait(&mut self) -> Result<ExitStatus, EngineError> {
        match self.child.as_mut() {
            Some(child) => child.wait().await.map_err(EngineError::Io),
            None => Ok(success_status()),
        }
    }

    /// Non-blocking liveness check: `true` if the child has not yet
    /// exited (or was never started as a no-op). Used by the default
    /// soak predicate.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }
}

impl Default for ManagedProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn success_status() -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_command_is_a_no_op() {
        let mut proc = ManagedProcess::new();
        proc.start(&[], &[], Vec::new()).unwrap();
        assert!(proc.pid().is_none());
        assert!(proc.is_alive());
        let status = proc.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn stop_and_kill_on_a_never_started_process_are_harmless() {
        let proc = ManagedProcess::new();
        proc.stop().unwrap();
        proc.kill().unwrap();
    }

    #[tokio::test]
    async fn spawns_a_real_child_and_waits_on_it() {
        let mut proc = ManagedProcess::new();
        proc.start(&["/bin/true".to_string()], &[], Vec::new()).unwrap();
        assert!(proc.pid().is_some());
        let status = proc.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn sigterm_reaches_a_sleeping_child() {
        let mut proc = ManagedProcess::new();
        proc.start(&["/bin/sleep".to_string(), "30".to_string()], &[], Vec::new()).unwrap();
        assert!(proc.is_alive());
        proc.stop().unwrap();
        let status = proc.wait().await.unwrap();
        assert!(!status.success());
    }
}
