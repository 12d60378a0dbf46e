//! Diagnostic sink injected into the parser and the composer.
//!
//! Severities follow the recoverable/fatal split: fatal problems are returned
//! as [`Error`](crate::Error), everything the pipeline survives is reported
//! here.
//!
//! - `Error`: a single track had to be ignored
//! - `Warning`: unsupported or duplicate track, stale offsets, a known box kept
//!   as raw bytes
//! - `Info` / `Debug`: progress

use std::fmt;

use parking_lot::Mutex;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// One reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Receiver for diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

impl dyn DiagnosticSink + '_ {
    pub fn debug(&self, message: impl Into<String>) {
        self.emit(Diagnostic {
            severity: Severity::Debug,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Diagnostic {
            severity: Severity::Info,
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
        });
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Debug => tracing::debug!("{}", diagnostic.message),
            Severity::Info => tracing::info!("{}", diagnostic.message),
            Severity::Warning => tracing::warn!("{}", diagnostic.message),
            Severity::Error => tracing::error!("{}", diagnostic.message),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Recorded diagnostics at exactly this severity.
    pub fn with_severity(&self, severity: Severity) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == severity)
            .cloned()
            .collect()
    }

    /// Whether any diagnostic at `severity` contains `needle`.
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|d| d.severity == severity && d.message.contains(needle))
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_filters_by_severity() {
        let sink = MemorySink::new();
        let dyn_sink: &dyn DiagnosticSink = &sink;
        dyn_sink.warn("scnt track not composed");
        dyn_sink.error(String::from("handler missing"));
        dyn_sink.debug(format!("parsed {} boxes", 12));

        assert_eq!(sink.entries().len(), 3);
        assert_eq!(sink.with_severity(Severity::Warning).len(), 1);
        assert!(sink.contains(Severity::Error, "handler"));
        assert!(!sink.contains(Severity::Warning, "handler"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Debug < Severity::Info);
    }
}
