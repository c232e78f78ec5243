// src/diagnostics.rs
use std::sync::{Arc, Mutex};

use crate::error::{ErrorKind, ObserverError};

/// A non-fatal problem observed during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub source: String,
    /// Set when the problem concerns a single item (e.g. a failed mark-read).
    pub item_id: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(source: &str, item_id: Option<&str>, err: &ObserverError) -> Self {
        Self {
            source: source.to_string(),
            item_id: item_id.map(str::to_string),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Where observers and the lifecycle controller report degraded work.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: structured `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, d: Diagnostic) {
        tracing::warn!(
            target: "observers",
            source = %d.source,
            item = d.item_id.as_deref().unwrap_or("-"),
            kind = d.kind.as_str(),
            "{}",
            d.message
        );
    }
}

pub fn tracing_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(TracingSink)
}

// --- Test helper ---
/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub reports: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.reports
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.snapshot().iter().filter(|d| d.kind == kind).count()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut v) = self.reports.lock() {
            v.push(diagnostic);
        }
    }
}
