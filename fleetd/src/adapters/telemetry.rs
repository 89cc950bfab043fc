// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::ports::{TelemetryEvent, TelemetryPort};

/// Writes lifecycle events to the `fleetd::telemetry` tracing target.
#[derive(Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryPort for TracingTelemetry {
    fn event(&self, name: &'static str, fields: TelemetryEvent) {
        let TelemetryEvent {
            tenant,
            cluster,
            job_kind,
            job_id,
            container,
            status,
        } = fields;

        tracing::info!(
            target: "fleetd::telemetry",
            event = name,
            tenant = tenant.as_deref(),
            cluster = cluster.as_deref(),
            job_kind = job_kind,
            job_id = job_id,
            container = container.as_deref(),
            status = status.as_deref(),
        );
    }
}
