// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration Engine: binds the Phase State Machine, Socket Manager,
//! two Process Supervisor slots, and the State Relay into the UPHR-O
//! reload workflow.
//!
//! Grounded on `examples/original_source/internal/orchestrator/engine.go`.
//! The Go prototype's `onSoakStart` is a comment admitting it only
//! *simulates* forking a second process ("we need to manage Two
//! ProcessManagers... we simulate the decision logic"); this is where
//! that simulation is replaced with the real `candidate` slot.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use aeterna_core::clock::Clock;
use aeterna_core::config::{Config, Hook};
use aeterna_core::error::EngineError;
use aeterna_core::phase::{Event, Phase};
use aeterna_core::telemetry::{RestartReason, Telemetry};

use crate::fsm::StateMachine;
use crate::socket::SocketManager;
use crate::srp::StateRelay;
use crate::supervisor::ManagedProcess;

/// Decides whether the candidate has soaked successfully.
///
/// `spec.md` §9 leaves the health criterion an Open Question ("a
/// specific metric threshold is not part of the core contract"); this
/// trait is the pluggable seam, with [`DefaultSoakPredicate`]
/// implementing the weakest conformant default — liveness.
pub trait SoakPredicate: Send + Sync + 'static {
    fn healthy(&self, candidate: &Mutex<ManagedProcess>) -> bool;
}

/// "Still alive" — the default when no external metrics feed is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSoakPredicate;

impl SoakPredicate for DefaultSoakPredicate {
    fn healthy(&self, candidate: &Mutex<ManagedProcess>) -> bool {
        candidate.lock().is_alive()
    }
}

struct Inner<C: Clock> {
    config: Config,
    socket: SocketManager,
    current: Mutex<ManagedProcess>,
    candidate: Mutex<ManagedProcess>,
    telemetry: Arc<dyn Telemetry>,
    clock: C,
    soak_predicate: Arc<dyn SoakPredicate>,
    reload_started_at: Mutex<Option<std::time::Instant>>,
}

/// The orchestrator. `C` is the clock implementation — generic rather
/// than boxed because `Clock: Clone` is not object-safe, and tests
/// substitute `FakeClock` for real time.
pub struct Orchestrator<C: Clock> {
    inner: Arc<Inner<C>>,
    fsm: Arc<StateMachine>,
}

impl<C: Clock> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), fsm: self.fsm.clone() }
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        config: Config,
        clock: C,
        telemetry: Arc<dyn Telemetry>,
        soak_predicate: Arc<dyn SoakPredicate>,
    ) -> Self {
        let inner = Arc::new(Inner {
            config,
            socket: SocketManager::new(),
            current: Mutex::new(ManagedProcess::new()),
            candidate: Mutex::new(ManagedProcess::new()),
            telemetry,
            clock,
            soak_predicate,
            reload_started_at: Mutex::new(None),
        });
        let fsm = Arc::new(StateMachine::new(Phase::Pending));
        let orchestrator = Self { inner, fsm };
        orchestrator.setup_transitions();
        orchestrator
    }

    pub fn phase(&self) -> Phase {
        self.fsm.current()
    }

    /// Fire an event directly — used by the daemon's signal loop and by
    /// tests driving the workflow without going through a real cold
    /// start.
    pub async fn fire(&self, event: Event) -> Result<Phase, EngineError> {
        self.fsm.fire(event).await
    }

    /// Graceful shutdown: send the serving process a termination
    /// signal. Does not touch the FSM — the caller is expected to exit
    /// the process afterward, matching the Go prototype's
    /// `os.Exit(0)` immediately following `supervisor.Stop()`.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.inner.current.lock().stop()
    }

    fn setup_transitions(&self) {
        let me = self.clone();
        self.fsm.add_transition(
            Phase::Pending,
            Event::Start,
            Phase::Starting,
            Some(Arc::new(move |event| {
                let me = me.clone();
                Box::pin(async move { me.on_start(event).await })
            })),
        );

        self.fsm.add_transition(Phase::Starting, Event::Stable, Phase::Running, None);

        let me = self.clone();
        self.fsm.add_transition(
            Phase::Running,
            Event::Reload,
            Phase::PreChecking,
            Some(Arc::new(move |event| {
                let me = me.clone();
                Box::pin(async move { me.on_reload_triggered(event).await })
            })),
        );

        self.fsm.add_transition(Phase::PreChecking, Event::Abort, Phase::Running, None);

        let me = self.clone();
        self.fsm.add_transition(
            Phase::PreChecking,
            Event::Proceed,
            Phase::Soaking,
            Some(Arc::new(move |event| {
                let me = me.clone();
                Box::pin(async move { me.on_soak_start(event).await })
            })),
        );

        let me = self.clone();
        self.fsm.add_transition(
            Phase::Soaking,
            Event::Rollback,
            Phase::Running,
            Some(Arc::new(move |event| {
                let me = me.clone();
                Box::pin(async move { me.on_rollback(event).await })
            })),
        );

        let me = self.clone();
        self.fsm.add_transition(
            Phase::Soaking,
            Event::Success,
            Phase::Draining,
            Some(Arc::new(move |event| {
                let me = me.clone();
                Box::pin(async move { me.on_drain_old(event).await })
            })),
        );

        self.fsm.add_transition(Phase::Draining, Event::Drained, Phase::Running, None);
    }

    /// `PENDING → STARTING`: cold start.
    async fn on_start(&self, _event: Event) -> Result<(), EngineError> {
        info!("cold start");
        for addr in &self.inner.config.service.listen {
            self.inner.socket.ensure_listener(addr)?;
        }
        let files = self.inner.socket.get_files()?;
        self.inner.current.lock().start(
            &self.inner.config.service.command,
            &self.inner.config.service.env,
            files,
        )?;

        let warmup = self.inner.config.orchestration.startup.warmup_delay();
        let me = self.clone();
        tokio::spawn(async move {
            me.inner.clock.sleep(warmup).await;
            if let Err(err) = me.fsm.fire(Event::Stable).await {
                warn!(%err, "failed to fire stable after warmup");
            }
        });
        Ok(())
    }

    /// `RUNNING → PRE_CHECKING`: run pre-flight hooks sequentially.
    async fn on_reload_triggered(&self, _event: Event) -> Result<(), EngineError> {
        info!("reload triggered: running pre-flight hooks");
        *self.inner.reload_started_at.lock() = Some(self.inner.clock.now());

        for hook in &self.inner.config.orchestration.pre_flight {
            if let Err(reason) = run_hook(hook).await {
                warn!(hook = %hook.name, %reason, "pre-flight hook failed, aborting reload");
                self.inner.telemetry.record_restart(RestartReason::PreCheckFailed);
                if let Err(err) = self.fsm.fire(Event::Abort).await {
                    warn!(%err, "failed to fire abort");
                }
                return Ok(());
            }
        }

        info!("pre-flight checks passed");
        self.fsm.fire(Event::Proceed).await?;
        Ok(())
    }

    /// `PRE_CHECKING → SOAKING`: fork the candidate, optionally hand
    /// off state, then start the soak timer.
    async fn on_soak_start(&self, _event: Event) -> Result<(), EngineError> {
        info!("forking candidate and soaking");
        let files = self.inner.socket.get_files()?;
        self.inner.candidate.lock().start(
            &self.inner.config.service.command,
            &self.inner.config.service.env,
            files,
        )?;

        let handoff = &self.inner.config.orchestration.state_handoff;
        if handoff.enabled {
            let relay = StateRelay::new(handoff.socket_path.clone());
            match relay.wait_state_transfer(handoff.timeout()).await {
                Ok(state) => info!(keys = state.len(), "state handover received"),
                Err(err) => warn!(%err, "state handover failed, continuing without it"),
            }
        }

        let soak_time = self.inner.config.orchestration.canary.soak_time();
        let me = self.clone();
        tokio::spawn(async move {
            me.inner.clock.sleep(soak_time).await;
            let healthy = me.inner.soak_predicate.healthy(&me.inner.candidate);
            let event = if healthy { Event::Success } else { Event::Rollback };
            if let Err(err) = me.fsm.fire(event).await {
                warn!(%err, "failed to fire soak outcome");
            }
        });
        Ok(())
    }

    /// `SOAKING → RUNNING` via `rollback`: candidate failed observation.
    async fn on_rollback(&self, _event: Event) -> Result<(), EngineError> {
        warn!("rollback: killing candidate");
        self.inner.candidate.lock().kill()?;
        self.inner.telemetry.record_restart(RestartReason::Rollback);
        for hook in &self.inner.config.orchestration.post_process.on_failure {
            let _ = run_hook(hook).await;
        }
        Ok(())
    }

    /// `SOAKING → DRAINING` via `success`: candidate becomes current.
    async fn on_drain_old(&self, _event: Event) -> Result<(), EngineError> {
        info!("draining predecessor");
        let drain_timeout = self.inner.config.orchestration.drain.timeout();

        self.inner.current.lock().stop()?;
        {
            let mut current = self.inner.current.lock();
            let mut candidate = self.inner.candidate.lock();
            std::mem::swap(&mut *current, &mut *candidate);
        }

        if let Some(started) = self.inner.reload_started_at.lock().take() {
            self.inner.telemetry.record_handover(self.inner.clock.now() - started);
        }
        self.inner.telemetry.record_restart(RestartReason::Success);

        for hook in &self.inner.config.orchestration.post_process.on_success {
            let _ = run_hook(hook).await;
        }

        let me = self.clone();
        tokio::spawn(async move {
            me.inner.clock.sleep(drain_timeout).await;
            let still_alive = me.inner.candidate.lock().is_alive();
            if still_alive {
                warn!("predecessor did not exit within drain timeout, escalating to SIGKILL");
                let _ = me.inner.candidate.lock().kill();
            }
            let mut old = std::mem::replace(&mut *me.inner.candidate.lock(), ManagedProcess::new());
            tokio::spawn(async move {
                let _ = old.wait().await;
            });
            if let Err(err) = me.fsm.fire(Event::Drained).await {
                warn!(%err, "failed to fire drained");
            }
        });
        Ok(())
    }
}

async fn run_hook(hook: &Hook) -> Result<(), String> {
    if hook.command.is_empty() {
        return Ok(());
    }
    let mut cmd = tokio::process::Command::new(&hook.command[0]);
    cmd.args(&hook.command[1..]);
    let run = cmd.status();
    let status = match hook.timeout {
        Some(timeout) => tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| format!("hook {:?} timed out after {:?}", hook.name, timeout))?
            .map_err(|e| e.to_string())?,
        None => run.await.map_err(|e| e.to_string())?,
    };
    if status.success() {
        Ok(())
    } else {
        Err(format!("exited with {status}"))
    }
}
