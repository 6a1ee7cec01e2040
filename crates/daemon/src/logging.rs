// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging initialization.
//!
//! `tracing` + `tracing-subscriber` with an `EnvFilter`, the same stack
//! `oj-daemon` uses. `observability.log_level` sets the default
//! directive; `RUST_LOG` always takes precedence when set, matching
//! `EnvFilter::from_default_env`'s usual behavior.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber. `default_level` comes from
/// `observability.log_level`; absent, `info` is used.
pub fn init_tracing(default_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
}
