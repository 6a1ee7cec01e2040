// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration document for the UPHR-O orchestrator.
//!
//! Parsed from YAML (the CLI's documented default file is
//! `aeterna.yaml`, see `spec.md` §6). Unknown fields are ignored; every
//! section defaults when absent. Duration fields accept human strings
//! (`"30s"`, `"2m"`) via `humantime_serde`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load and parse a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigInvalid(format!("reading {}: {}", path.display(), e))
        })?;
        Self::parse(&data)
    }

    /// Parse a YAML configuration document from a string.
    pub fn parse(data: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(data).map_err(|e| EngineError::ConfigInvalid(e.to_string()))
    }
}

/// Identity and invocation of the managed business process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    /// Addresses to bind/inherit on cold/warm start (`host:port`, or
    /// `:port` for the wildcard host).
    #[serde(default)]
    pub listen: Vec<String>,
    /// argv, with `command[0]` as the program. Empty means no-op start
    /// (dry-run / test configurations).
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
}

/// Reload lifecycle configuration: hooks, timings, state handoff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default)]
    pub pre_flight: Vec<Hook>,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub canary: CanaryConfig,
    #[serde(default)]
    pub drain: DrainConfig,
    #[serde(default)]
    pub post_process: PostProcessConfig,
    #[serde(default)]
    pub state_handoff: StateHandoffConfig,
}

/// A user-supplied hook program run during `PRE_CHECKING` or after a
/// terminal transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hook {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

/// Default warmup delay before a cold-started process is considered
/// stable, matching `consts.DefaultSoakTime`'s sibling in the original
/// source (the warmup delay was a literal 2s sleep there).
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_secs(2);

/// Default soak duration, matching `consts.DefaultSoakTime`.
pub const DEFAULT_SOAK_TIME: Duration = Duration::from_secs(30);

/// Default drain timeout before escalating from graceful to forceful
/// termination of the outgoing process.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default SRP receive timeout, matching `consts.DefaultSRPTimeout`.
pub const DEFAULT_SRP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupConfig {
    #[serde(default, with = "humantime_serde::option")]
    pub warmup_delay: Option<Duration>,
}

impl StartupConfig {
    pub fn warmup_delay(&self) -> Duration {
        self.warmup_delay.unwrap_or(DEFAULT_WARMUP_DELAY)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanaryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, with = "humantime_serde::option")]
    pub soak_time: Option<Duration>,
}

impl CanaryConfig {
    pub fn soak_time(&self) -> Duration {
        self.soak_time.unwrap_or(DEFAULT_SOAK_TIME)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrainConfig {
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

impl DrainConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostProcessConfig {
    #[serde(default)]
    pub on_success: Vec<Hook>,
    #[serde(default)]
    pub on_failure: Vec<Hook>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateHandoffConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub socket_path: String,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

impl StateHandoffConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_SRP_TIMEOUT)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let cfg = Config::parse("service:\n  name: demo\n").unwrap();
        assert_eq!(cfg.service.name, "demo");
        assert_eq!(cfg.orchestration.canary.soak_time(), DEFAULT_SOAK_TIME);
        assert_eq!(cfg.orchestration.startup.warmup_delay(), DEFAULT_WARMUP_DELAY);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let cfg = Config::parse("service:\n  name: demo\nsome_future_field: true\n").unwrap();
        assert_eq!(cfg.service.name, "demo");
    }

    #[test]
    fn human_durations_parse() {
        let cfg = Config::parse(
            "orchestration:\n  canary:\n    soak_time: \"45s\"\n  drain:\n    timeout: \"2m\"\n",
        )
        .unwrap();
        assert_eq!(cfg.orchestration.canary.soak_time(), Duration::from_secs(45));
        assert_eq!(cfg.orchestration.drain.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn malformed_yaml_is_config_invalid() {
        let err = Config::parse(": not: valid: yaml:").unwrap_err();
        assert_eq!(err.code(), 1001);
    }

    #[test]
    fn full_document_round_trips_representative_shape() {
        let yaml = r#"
service:
  name: web
  listen: [":8080"]
  command: ["./web-server"]
orchestration:
  pre_flight:
    - name: config-check
      command: ["./check.sh"]
      timeout: "5s"
  startup:
    warmup_delay: "1s"
  canary:
    enabled: true
    soak_time: "30s"
  drain:
    timeout: "10s"
  post_process:
    on_success:
      - name: notify
        command: ["./notify.sh"]
  state_handoff:
    enabled: true
    socket_path: "/tmp/aeterna.sock"
    timeout: "5s"
observability:
  metrics_port: 9090
  log_level: info
"#;
        let cfg = Config::parse(yaml).unwrap();
        assert_eq!(cfg.service.listen, vec![":8080".to_string()]);
        assert_eq!(cfg.orchestration.pre_flight.len(), 1);
        assert_eq!(cfg.orchestration.pre_flight[0].timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.observability.metrics_port, Some(9090));
    }
}
