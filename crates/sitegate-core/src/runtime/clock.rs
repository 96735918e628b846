// crates/sitegate-core/src/runtime/clock.rs
// ============================================================================
// Module: System Clock
// Description: Wall-clock and monotonic time source for production use.
// Purpose: Back token expiry checks and lifecycle phase timers.
// Dependencies: crate::interfaces, cpu-time, time
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads UTC wall-clock time and a monotonic offset from the
//! instant it was created. Thread-CPU time comes from the platform's per-thread
//! clock; where none exists it is `None` and the `*_thread_duration_ms`
//! telemetry keys are omitted.

use std::time::Duration;
use std::time::Instant;

use cpu_time::ThreadTime;
use time::OffsetDateTime;

use crate::interfaces::Clock;

/// Production clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    /// Monotonic origin.
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn thread_cpu_time(&self) -> Option<Duration> {
        ThreadTime::try_now().ok().map(|time| time.as_duration())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the production clock.
    #![allow(clippy::panic, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn monotonic_offset_does_not_go_backwards() {
        let clock = SystemClock::new();
        let first = clock.monotonic();
        assert!(clock.monotonic() >= first);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn thread_cpu_time_is_reported_on_linux() {
        let clock = SystemClock::new();
        let Some(before) = clock.thread_cpu_time() else {
            panic!("thread cpu time unavailable");
        };
        let spun = (0..200_000_u64).fold(0_u64, |acc, n| acc.wrapping_add(n * n));
        assert!(spun > 0);
        let Some(after) = clock.thread_cpu_time() else {
            panic!("thread cpu time unavailable");
        };
        assert!(after >= before);
    }
}
