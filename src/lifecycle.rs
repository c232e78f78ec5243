// src/lifecycle.rs
//! Scoped connect/observe/disconnect.
//!
//! Every successful `connect` is paired with exactly one `disconnect`, whether
//! the body returns normally, returns an error, or panics. A failed `connect`
//! acquired nothing and is not paired.
//!
//! `with_connection` re-raises a panic once the session is released;
//! `run_cycle` contains it so one adapter cannot take down an aggregation.

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ObserverError;
use crate::event::Event;
use crate::observer::Observer;

/// Connect, run `body`, always disconnect.
pub async fn with_connection<O, T, F>(observer: &mut O, body: F) -> Result<T, ObserverError>
where
    O: Observer + ?Sized,
    F: for<'a> FnOnce(&'a mut O) -> BoxFuture<'a, T>,
{
    observer.connect().await?;

    let out = AssertUnwindSafe(body(observer)).catch_unwind().await;
    observer.disconnect().await;

    match out {
        Ok(v) => Ok(v),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Result of one cycle. `events` holds whatever was emitted before a failure.
#[derive(Debug)]
pub struct CycleOutcome {
    pub source: String,
    pub events: Vec<Event>,
    pub failure: Option<ObserverError>,
}

impl CycleOutcome {
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

async fn drain<O: Observer + ?Sized>(observer: &mut O) -> (Vec<Event>, Option<ObserverError>) {
    let mut events = Vec::new();
    let mut stream = match observer.observe() {
        Ok(s) => s,
        Err(e) => return (events, Some(e)),
    };
    while let Some(item) = stream.next().await {
        match item {
            Ok(ev) => events.push(ev),
            Err(e) => return (events, Some(e)),
        }
    }
    (events, None)
}

/// One full cycle for `observer`. Never fails: errors degrade to an empty or
/// partial event list and are reported to `diagnostics`.
pub async fn run_cycle<O: Observer + ?Sized>(
    observer: &mut O,
    diagnostics: &dyn DiagnosticSink,
) -> CycleOutcome {
    crate::metrics::ensure_metrics_described();
    let source = observer.name().to_string();
    let t0 = Instant::now();

    let cycle = with_connection(observer, |o| drain(o).boxed());
    let (events, failure) = match AssertUnwindSafe(cycle).catch_unwind().await {
        Ok(Ok(drained)) => drained,
        Ok(Err(e)) => (Vec::new(), Some(e)),
        Err(panic) => (Vec::new(), Some(ObserverError::Panicked(panic_message(&*panic)))),
    };

    if let Some(e) = &failure {
        diagnostics.report(Diagnostic::from_error(&source, None, e));
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    crate::metrics::record_cycle(&source, events.len(), failure.is_some(), ms);
    tracing::info!(
        target: "observers",
        source = %source,
        emitted = events.len(),
        failed = failure.is_some(),
        "cycle finished"
    );

    CycleOutcome {
        source,
        events,
        failure,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Fully materialized events of one cycle.
pub async fn observe_once<O: Observer + ?Sized>(
    observer: &mut O,
    diagnostics: &dyn DiagnosticSink,
) -> Vec<Event> {
    run_cycle(observer, diagnostics).await.events
}
