// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: signal wiring and the metrics endpoint around one
//! [`Orchestrator`].
//!
//! Grounded on `examples/original_source/internal/orchestrator/engine.go`'s
//! `Engine.Start`, which registers `SIGHUP`/`SIGINT`/`SIGTERM` on a
//! channel and serializes them onto the state machine from a single
//! goroutine — reproduced here as one `tokio::select!` over three
//! `tokio::signal::unix::Signal` streams, preserving the *serialized
//! dispatch* ordering guarantee from `spec.md` §5.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use aeterna_core::clock::SystemClock;
use aeterna_core::config::Config;
use aeterna_core::error::EngineError;
use aeterna_core::phase::Event;
use aeterna_engine::orchestrator::{DefaultSoakPredicate, Orchestrator};

use crate::metrics::{metrics_router, PrometheusTelemetry};

/// A running daemon: one orchestrator plus its ambient services.
pub struct Daemon {
    orchestrator: Orchestrator<SystemClock>,
    telemetry: Arc<PrometheusTelemetry>,
    metrics_port: Option<u16>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let metrics_port = config.observability.metrics_port;
        let telemetry = PrometheusTelemetry::new();
        let orchestrator = Orchestrator::new(
            config,
            SystemClock,
            telemetry.clone(),
            Arc::new(DefaultSoakPredicate),
        );
        Self { orchestrator, telemetry, metrics_port }
    }

    /// Cold-start the engine, serve `/metrics` if configured, and block
    /// dispatching signals until a stop request is received.
    pub async fn run(self) -> Result<(), EngineError> {
        if let Some(port) = self.metrics_port {
            let router = metrics_router(self.telemetry.clone());
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
            tokio::spawn(async move {
                match tokio::net::TcpListener::bind(addr).await {
                    Ok(listener) => {
                        info!(%addr, "metrics endpoint listening");
                        if let Err(err) = axum::serve(listener, router).await {
                            warn!(%err, "metrics endpoint exited");
                        }
                    }
                    Err(err) => warn!(%err, %addr, "failed to bind metrics endpoint"),
                }
            });
        }

        self.orchestrator.fire(Event::Start).await?;

        let mut sighup = signal(SignalKind::hangup()).map_err(EngineError::Io)?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(EngineError::Io)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(EngineError::Io)?;

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("SIGHUP received, initiating reload");
                    if let Err(err) = self.orchestrator.fire(Event::Reload).await {
                        warn!(%err, "reload rejected");
                    }
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, shutting down");
                    self.orchestrator.shutdown()?;
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down");
                    self.orchestrator.shutdown()?;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeterna_core::config::ServiceConfig;
    use aeterna_core::phase::Phase;

    fn test_config() -> Config {
        Config {
            service: ServiceConfig { name: "demo".into(), listen: vec![], command: vec![], env: vec![] },
            ..Default::default()
        }
    }

    #[test]
    fn new_daemon_starts_pending() {
        let daemon = Daemon::new(test_config());
        assert_eq!(daemon.orchestrator.phase(), Phase::Pending);
    }

    #[test]
    fn shutdown_on_a_never_started_process_is_harmless() {
        let daemon = Daemon::new(test_config());
        daemon.orchestrator.shutdown().unwrap();
    }
}
