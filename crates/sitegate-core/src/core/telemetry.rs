// crates/sitegate-core/src/core/telemetry.rs
// ============================================================================
// Module: Request Telemetry
// Description: Per-request timers, telemetry context, and publication log events.
// Purpose: Record phase durations and page identity for one dispatch attempt.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each dispatch attempt owns one [`TelemetryContext`]; it is never shared
//! between requests. Phase timestamps in [`RequestTelemetry`] are monotonic
//! within an attempt and the context is cleared, not merged, when an attempt
//! is retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

// ============================================================================
// SECTION: Clock Readings
// ============================================================================

/// One clock observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockReading {
    /// Monotonic wall-clock offset.
    pub wall: Duration,
    /// Thread CPU time, when the platform exposes it.
    pub thread_cpu: Option<Duration>,
}

impl ClockReading {
    /// Returns the wall-clock and CPU durations elapsed since `start`.
    #[must_use]
    pub fn since(&self, start: &Self) -> (Duration, Option<Duration>) {
        let wall = self.wall.saturating_sub(start.wall);
        let cpu = match (self.thread_cpu, start.thread_cpu) {
            (Some(end), Some(begin)) => Some(end.saturating_sub(begin)),
            _ => None,
        };
        (wall, cpu)
    }
}

/// Phase timestamps for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTelemetry {
    /// Start of traversal.
    pub traversal_started_at: Option<ClockReading>,
    /// End of traversal.
    pub traversal_ended_at: Option<ClockReading>,
    /// Start of view invocation.
    pub publication_started_at: Option<ClockReading>,
    /// End of view invocation.
    pub publication_ended_at: Option<ClockReading>,
    /// Page identifier (`<context>:<view>`).
    pub page_id: Option<String>,
}

// ============================================================================
// SECTION: Telemetry Context
// ============================================================================

/// Keys pushed into the telemetry context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TelemetryKey {
    /// Page identifier.
    PageId,
    /// Traversal wall-clock duration.
    TraversalDurationMs,
    /// Traversal thread CPU duration.
    TraversalThreadDurationMs,
    /// Publication wall-clock duration.
    PublicationDurationMs,
    /// Publication thread CPU duration.
    PublicationThreadDurationMs,
}

impl TelemetryKey {
    /// Every key an attempt may push.
    pub const ALL: [Self; 5] = [
        Self::PageId,
        Self::TraversalDurationMs,
        Self::TraversalThreadDurationMs,
        Self::PublicationDurationMs,
        Self::PublicationThreadDurationMs,
    ];

    /// Returns the structured log field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PageId => "pageid",
            Self::TraversalDurationMs => "traversal_duration_ms",
            Self::TraversalThreadDurationMs => "traversal_thread_duration_ms",
            Self::PublicationDurationMs => "publication_duration_ms",
            Self::PublicationThreadDurationMs => "publication_thread_duration_ms",
        }
    }
}

/// Telemetry value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    /// Text value.
    Text(String),
    /// Duration in whole milliseconds.
    Millis(u64),
}

impl TelemetryValue {
    /// Builds a millisecond value from a duration, saturating on overflow.
    #[must_use]
    pub fn millis(duration: Duration) -> Self {
        Self::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Per-request telemetry slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryContext {
    /// Pushed entries.
    entries: BTreeMap<TelemetryKey, TelemetryValue>,
}

impl TelemetryContext {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Pushes a value, replacing any previous value for the key.
    pub fn push(&mut self, key: TelemetryKey, value: TelemetryValue) {
        self.entries.insert(key, value);
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: TelemetryKey) -> Option<&TelemetryValue> {
        self.entries.get(&key)
    }

    /// Removes every key an attempt may have pushed.
    pub fn clear_attempt(&mut self) {
        for key in TelemetryKey::ALL {
            self.entries.remove(&key);
        }
    }

    /// Returns true when nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries keyed by log field name.
    #[must_use]
    pub fn fields(&self) -> BTreeMap<String, TelemetryValue> {
        self.entries.iter().map(|(key, value)| (key.as_str().to_string(), value.clone())).collect()
    }
}

// ============================================================================
// SECTION: Log Events
// ============================================================================

/// Structured log event emitted once per published request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationLogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i128,
    /// Matched site name, when classification succeeded.
    pub site: Option<String>,
    /// Request method.
    pub method: String,
    /// Raw `Host` header.
    pub host: Option<String>,
    /// Request path.
    pub path: String,
    /// Final HTTP status.
    pub status: u16,
    /// Outcome label (`ok`, `protocol_error`, `auth_error`, `error`).
    pub outcome: &'static str,
    /// Attempts performed.
    pub attempts: u32,
    /// Principal user id; empty when anonymous or unresolved.
    pub principal: String,
    /// Terminal error description.
    pub error: Option<String>,
    /// Telemetry fields from the final attempt.
    #[serde(flatten)]
    pub telemetry: BTreeMap<String, TelemetryValue>,
}
