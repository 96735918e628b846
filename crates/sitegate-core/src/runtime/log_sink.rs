// crates/sitegate-core/src/runtime/log_sink.rs
// ============================================================================
// Module: Publication Log Sinks
// Description: JSON-lines sinks for per-request publication events.
// Purpose: Route publication events to stderr, a file, or nowhere.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Each sink serializes [`PublicationLogEvent`] as one JSON object per line.
//! Serialization and write failures are dropped so logging never fails a
//! request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::core::PublicationLogEvent;
use crate::interfaces::PublicationLogSink;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Log sink that writes JSON lines to stderr.
pub struct StderrLogSink;

impl PublicationLogSink for StderrLogSink {
    fn record(&self, event: &PublicationLogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Log sink that appends JSON lines to a file.
pub struct FileLogSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileLogSink {
    /// Opens the log file in append mode, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl PublicationLogSink for FileLogSink {
    fn record(&self, event: &PublicationLogEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op log sink.
pub struct NoopLogSink;

impl PublicationLogSink for NoopLogSink {
    fn record(&self, _event: &PublicationLogEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
