// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle phase and event vocabulary for the UPHR-O reload workflow.

use std::fmt;

/// A named lifecycle position of the reload workflow.
///
/// Exactly one phase holds at all times; transitions are a total
/// function of `(phase, event)`, enforced by the phase state machine in
/// `aeterna-engine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    PreChecking,
    Starting,
    Handshaking,
    Soaking,
    Running,
    Draining,
    Stopped,
    Failed,
}

impl Phase {
    /// `STOPPED` and `FAILED` accept no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopped | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pending => "PENDING",
            Phase::PreChecking => "PRE_CHECKING",
            Phase::Starting => "STARTING",
            Phase::Handshaking => "HANDSHAKING",
            Phase::Soaking => "SOAKING",
            Phase::Running => "RUNNING",
            Phase::Draining => "DRAINING",
            Phase::Stopped => "STOPPED",
            Phase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Events that drive phase transitions.
///
/// The original `turtacn/Aeterna` prototype (see
/// `examples/original_source/pkg/fsm/machine.go`) represents events as
/// bare strings; this is typed instead so an unrecognized event is a
/// compile error rather than a silent no-transition at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Start,
    Stable,
    Reload,
    Abort,
    Proceed,
    Rollback,
    Success,
    /// `DRAINING → RUNNING`: the drained predecessor has been fully
    /// terminated and post-success hooks have run. Not named in the
    /// reload-flow table (which ends at `success`/`DRAINING`), but
    /// required for a second `reload` to ever become legal again,
    /// since `reload` only fires from `RUNNING`.
    Drained,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Event::Start => "start",
            Event::Stable => "stable",
            Event::Reload => "reload",
            Event::Abort => "abort",
            Event::Proceed => "proceed",
            Event::Rollback => "rollback",
            Event::Success => "success",
            Event::Drained => "drained",
        };
        f.write_str(s)
    }
}
