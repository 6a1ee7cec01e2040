// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus-compatible `/metrics` endpoint.
//!
//! Grounded on `tempo-greptile-tempo`'s `commonware-node::metrics::install`
//! for the axum router shape (a single `GET /metrics` route returning the
//! text exposition format). The registry itself uses `prometheus-client`
//! rather than a hand-rolled encoder, exposing exactly the two series
//! named in `spec.md` §6: `handover_duration_seconds` and
//! `restarts_total{reason}`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use aeterna_core::telemetry::{RestartReason, Telemetry};

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
struct RestartLabels {
    reason: RestartReasonLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
enum RestartReasonLabel {
    Success,
    Rollback,
    PreCheckFailed,
    Crash,
}

impl From<RestartReason> for RestartReasonLabel {
    fn from(reason: RestartReason) -> Self {
        match reason {
            RestartReason::Success => RestartReasonLabel::Success,
            RestartReason::Rollback => RestartReasonLabel::Rollback,
            RestartReason::PreCheckFailed => RestartReasonLabel::PreCheckFailed,
            RestartReason::Crash => RestartReasonLabel::Crash,
        }
    }
}

/// `prometheus-client`-backed implementation of the engine's
/// [`Telemetry`] facade.
pub struct PrometheusTelemetry {
    registry: Mutex<Registry>,
    handover_duration_seconds: Histogram,
    restarts_total: Family<RestartLabels, Counter>,
}

impl PrometheusTelemetry {
    pub fn new() -> Arc<Self> {
        let mut registry = Registry::default();

        let handover_duration_seconds =
            Histogram::new([0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0].into_iter());
        registry.register(
            "handover_duration_seconds",
            "Seconds from reload event to successful DRAINING",
            handover_duration_seconds.clone(),
        );

        let restarts_total = Family::<RestartLabels, Counter>::default();
        registry.register(
            "restarts_total",
            "Reload outcomes by reason",
            restarts_total.clone(),
        );

        Arc::new(Self {
            registry: Mutex::new(registry),
            handover_duration_seconds,
            restarts_total,
        })
    }

    /// Render the current registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        let _ = prometheus_client::encoding::text::encode(&mut buf, &self.registry.lock());
        buf
    }
}

impl Telemetry for PrometheusTelemetry {
    fn record_handover(&self, duration: std::time::Duration) {
        self.handover_duration_seconds.observe(duration.as_secs_f64());
    }

    fn record_restart(&self, reason: RestartReason) {
        self.restarts_total.get_or_create(&RestartLabels { reason: reason.into() }).inc();
    }
}

/// Router exposing `GET /metrics` against `telemetry`'s registry.
pub fn metrics_router(telemetry: Arc<PrometheusTelemetry>) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let telemetry = telemetry.clone();
            async move {
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                    .body(Body::from(telemetry.encode()))
                    .unwrap_or_else(|_| Response::new(Body::empty()))
            }
        }),
    )
}
