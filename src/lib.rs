// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod filter;
pub mod lifecycle;
pub mod metrics;
pub mod observer;
pub mod providers;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::observe_all;
pub use crate::diagnostics::{Diagnostic, DiagnosticSink};
pub use crate::error::{ErrorKind, ObserverError};
pub use crate::event::{content_hash, Event, SourceType};
pub use crate::filter::{any_matches, matches, Filter};
pub use crate::lifecycle::{observe_once, run_cycle, with_connection, CycleOutcome};
pub use crate::observer::{ConnectionState, EventStream, Observer};
pub use crate::record::RawRecord;
