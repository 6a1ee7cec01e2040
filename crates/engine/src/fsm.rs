// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase state machine: a total `(Phase, Event) -> Phase` transition
//! table plus an optional async handler per transition.
//!
//! Two invariants are non-negotiable, carried straight from the Go
//! prototype's FSM (`examples/original_source/pkg/fsm/machine.go`):
//!
//! - **Commit-before-callback**: the phase is updated to `to` before the
//!   registered handler runs, so the handler (and anything it calls)
//!   observes the new phase.
//! - **Lock-released-before-callback**: the internal lock is dropped
//!   before the handler is awaited, so a handler may legally call
//!   `fire` again (e.g. `STARTING`'s handler firing `stable` once the
//!   child is warm) without deadlocking on itself.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use aeterna_core::error::EngineError;
use aeterna_core::phase::{Event, Phase};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A transition handler: runs after the phase has already changed.
pub type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<(), EngineError>> + Send + Sync>;

type Key = (Phase, Event);

struct Inner {
    phase: Phase,
    transitions: HashMap<Key, Phase>,
    handlers: HashMap<Key, Handler>,
}

/// The phase state machine. One instance drives one orchestrator.
pub struct StateMachine {
    inner: Mutex<Inner>,
}

impl StateMachine {
    pub fn new(initial: Phase) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: initial,
                transitions: HashMap::new(),
                handlers: HashMap::new(),
            }),
        }
    }

    /// The phase currently held.
    pub fn current(&self) -> Phase {
        self.inner.lock().phase
    }

    /// Register `(from, event) -> to`, with an optional handler run
    /// once the transition commits.
    pub fn add_transition(&self, from: Phase, event: Event, to: Phase, handler: Option<Handler>) {
        let mut inner = self.inner.lock();
        let key = (from, event);
        inner.transitions.insert(key, to);
        match handler {
            Some(h) => {
                inner.handlers.insert(key, h);
            }
            None => {
                inner.handlers.remove(&key);
            }
        }
    }

    /// Fire `event` against the current phase. On success the phase is
    /// already `to` by the time this returns (and was already `to`
    /// while the handler ran). `STOPPED`/`FAILED` accept no events.
    pub async fn fire(&self, event: Event) -> Result<Phase, EngineError> {
        let (to, handler) = {
            let mut inner = self.inner.lock();
            let from = inner.phase;
            if from.is_terminal() {
                return Err(EngineError::NoTransition {
                    from: from.to_string(),
                    event: event.to_string(),
                });
            }
            let key = (from, event);
            let to = *inner.transitions.get(&key).ok_or_else(|| EngineError::NoTransition {
                from: from.to_string(),
                event: event.to_string(),
            })?;
            inner.phase = to;
            let handler = inner.handlers.get(&key).cloned();
            (to, handler)
            // lock dropped here, before the handler runs
        };

        if let Some(handler) = handler {
            handler(event).await?;
        }

        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handler_of<F>(f: F) -> Handler
    where
        F: Fn(Event) -> BoxFuture<'static, Result<(), EngineError>> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[tokio::test]
    async fn fire_updates_phase_and_runs_handler() {
        let fsm = Arc::new(StateMachine::new(Phase::Pending));
        fsm.add_transition(Phase::Pending, Event::Start, Phase::Starting, None);
        fsm.add_transition(Phase::Starting, Event::Stable, Phase::Running, None);

        let to = fsm.fire(Event::Start).await.unwrap();
        assert_eq!(to, Phase::Starting);
        assert_eq!(fsm.current(), Phase::Starting);
    }

    #[tokio::test]
    async fn handler_may_fire_the_next_event_without_deadlocking() {
        let fsm = Arc::new(StateMachine::new(Phase::Pending));
        fsm.add_transition(Phase::Starting, Event::Stable, Phase::Running, None);

        let inner_fsm = fsm.clone();
        fsm.add_transition(
            Phase::Pending,
            Event::Start,
            Phase::Starting,
            Some(handler_of(move |_event| {
                let fsm = inner_fsm.clone();
                Box::pin(async move {
                    fsm.fire(Event::Stable).await?;
                    Ok(())
                })
            })),
        );

        fsm.fire(Event::Start).await.unwrap();
        assert_eq!(fsm.current(), Phase::Running);
    }

    #[tokio::test]
    async fn handler_observes_the_committed_phase_not_the_old_one() {
        let fsm = Arc::new(StateMachine::new(Phase::Pending));
        let observed = Arc::new(AtomicUsize::new(0));
        let inner_fsm = fsm.clone();
        let inner_observed = observed.clone();
        fsm.add_transition(
            Phase::Pending,
            Event::Start,
            Phase::Starting,
            Some(handler_of(move |_event| {
                let fsm = inner_fsm.clone();
                let observed = inner_observed.clone();
                Box::pin(async move {
                    observed.store(fsm.current() as usize, Ordering::SeqCst);
                    Ok(())
                })
            })),
        );
        fsm.fire(Event::Start).await.unwrap();
        assert_eq!(fsm.current(), Phase::Starting);
        assert_eq!(fsm.current() as usize, observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn missing_transition_is_rejected_and_phase_is_unchanged() {
        let fsm = StateMachine::new(Phase::Running);
        let err = fsm.fire(Event::Proceed).await.unwrap_err();
        assert!(matches!(err, EngineError::NoTransition { .. }));
        assert_eq!(fsm.current(), Phase::Running);
    }

    #[tokio::test]
    async fn terminal_phases_reject_every_event() {
        let fsm = StateMachine::new(Phase::Stopped);
        fsm.add_transition(Phase::Stopped, Event::Start, Phase::Starting, None);
        let err = fsm.fire(Event::Start).await.unwrap_err();
        assert!(matches!(err, EngineError::NoTransition { .. }));
    }

    #[tokio::test]
    async fn a_second_reload_is_rejected_while_one_is_in_flight() {
        let fsm = StateMachine::new(Phase::PreChecking);
        fsm.add_transition(Phase::Running, Event::Reload, Phase::PreChecking, None);
        let err = fsm.fire(Event::Reload).await.unwrap_err();
        assert!(matches!(err, EngineError::NoTransition { .. }));
    }
}
