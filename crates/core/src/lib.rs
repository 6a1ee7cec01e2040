// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aeterna-core: shared types for the UPHR-O process orchestrator.
//!
//! This crate holds the data model every other crate builds on: the
//! reload phase/event vocabulary, the configuration document, the error
//! taxonomy, the opaque state-context value type exchanged by the relay,
//! address canonicalization, and the `Clock`/`Telemetry` facades the
//! engine is driven through instead of touching globals.

pub mod address;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod phase;
pub mod telemetry;

pub use address::{CanonicalAddr, ParsedAddr};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::Config;
pub use context::{StateContext, Value};
pub use error::{EngineError, ErrorCode};
pub use phase::{Event, Phase};
pub use telemetry::{RecordingTelemetry, RestartReason, Telemetry};
