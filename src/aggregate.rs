// src/aggregate.rs
use futures::future::join_all;
use std::collections::BTreeMap;

use crate::diagnostics::DiagnosticSink;
use crate::event::Event;
use crate::lifecycle::{run_cycle, CycleOutcome};
use crate::observer::Observer;

/// Run one cycle on every observer concurrently and merge by name.
///
/// Every observer gets a key, even when its cycle failed (empty or partial
/// list). Observers sharing a name are merged into one key in slice order.
pub async fn observe_all(
    observers: &mut [Box<dyn Observer>],
    diagnostics: &dyn DiagnosticSink,
) -> BTreeMap<String, Vec<Event>> {
    merge(run_all(observers, diagnostics).await)
}

/// Same fan-out as [`observe_all`], keeping each cycle's failure.
pub async fn run_all(
    observers: &mut [Box<dyn Observer>],
    diagnostics: &dyn DiagnosticSink,
) -> Vec<CycleOutcome> {
    join_all(
        observers
            .iter_mut()
            .map(|o| run_cycle(o.as_mut(), diagnostics)),
    )
    .await
}

pub fn merge(outcomes: Vec<CycleOutcome>) -> BTreeMap<String, Vec<Event>> {
    let mut out: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    for o in outcomes {
        out.entry(o.source).or_default().extend(o.events);
    }
    out
}
