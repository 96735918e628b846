// crates/sitegate-server/src/tracing_sink.rs
// ============================================================================
// Module: Tracing Log Sink
// Description: Publication log sink backed by `tracing` events.
// Purpose: Route publication events into the process subscriber.
// Dependencies: sitegate-core, tracing, serde_json
// ============================================================================

//! ## Overview
//! Emits one `info` event per publication under the `sitegate::publication`
//! target. Telemetry fields are rendered as a single JSON object field.

use sitegate_core::PublicationLogEvent;
use sitegate_core::PublicationLogSink;

/// Log sink that emits `tracing` events.
pub struct TracingLogSink;

impl PublicationLogSink for TracingLogSink {
    fn record(&self, event: &PublicationLogEvent) {
        let telemetry = serde_json::to_string(&event.telemetry).unwrap_or_default();
        tracing::info!(
            target: "sitegate::publication",
            site = event.site.as_deref().unwrap_or_default(),
            method = %event.method,
            host = event.host.as_deref().unwrap_or_default(),
            path = %event.path,
            status = event.status,
            outcome = event.outcome,
            attempts = event.attempts,
            principal = %event.principal,
            error = event.error.as_deref().unwrap_or_default(),
            telemetry = %telemetry,
            "publication"
        );
    }
}
