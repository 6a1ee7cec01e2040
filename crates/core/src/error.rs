// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the UPHR-O engine.
//!
//! Numeric codes are carried for boundary compatibility (log
//! correlation, metrics labels) and are never matched on by string; the
//! enum variant is the thing code should branch on.

use std::path::PathBuf;
use thiserror::Error;

/// Stable numeric error code, matching `examples/original_source/pkg/errors/codes.go`.
pub type ErrorCode = u32;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("pre-flight hook {hook:?} failed: {reason}")]
    PreCheckFailed { hook: String, reason: String },

    #[error("failed to bind listener at {0}: {1}")]
    SocketBindFailed(String, #[source] std::io::Error),

    #[error("failed to start process: {0}")]
    ProcessStartFailed(#[source] std::io::Error),

    #[error("state dump timed out after {0:?}")]
    StateDumpTimeout(std::time::Duration),

    #[error("failed to decode relayed state at {0}: {1}")]
    StateLoadFailed(PathBuf, String),

    #[error("candidate failed soak observation: {0}")]
    SoakFailed(String),

    #[error("no transition from {from} via {event}")]
    NoTransition { from: String, event: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Numeric code space from `spec.md` §7, kept for log/metric correlation.
    pub const fn code(&self) -> ErrorCode {
        match self {
            EngineError::ConfigInvalid(_) => 1001,
            EngineError::PreCheckFailed { .. } => 2001,
            EngineError::SocketBindFailed(_, _) => 3001,
            EngineError::ProcessStartFailed(_) => 3002,
            EngineError::StateDumpTimeout(_) => 3003,
            EngineError::StateLoadFailed(_, _) => 3004,
            EngineError::SoakFailed(_) => 4001,
            EngineError::NoTransition { .. } => 0,
            EngineError::Io(_) => 0,
        }
    }

    /// Whether this error is fatal to the orchestrator process (terminates
    /// with non-zero exit) or is caught by the engine and folded back into
    /// a phase transition back to `RUNNING`.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigInvalid(_)
                | EngineError::SocketBindFailed(_, _)
                | EngineError::ProcessStartFailed(_)
        )
    }
}
