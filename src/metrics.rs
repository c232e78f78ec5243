// src/metrics.rs
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up once a recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("observer_events_total", "Events emitted per source.");
        describe_counter!(
            "observer_skipped_total",
            "Raw records that were not eligible for emission."
        );
        describe_counter!(
            "observer_side_effect_failures_total",
            "Mark-consumed calls that failed (event still emitted)."
        );
        describe_counter!(
            "observer_cycle_failures_total",
            "Cycles that ended with a connection, fetch or timeout error."
        );
        describe_histogram!("observer_cycle_ms", "Full cycle time in milliseconds.");
    });
}

pub(crate) fn record_skipped(source: &str) {
    counter!("observer_skipped_total", "source" => source.to_string()).increment(1);
}

pub(crate) fn record_side_effect_failure(source: &str) {
    counter!("observer_side_effect_failures_total", "source" => source.to_string()).increment(1);
}

pub(crate) fn record_cycle(source: &str, emitted: usize, failed: bool, elapsed_ms: f64) {
    counter!("observer_events_total", "source" => source.to_string()).increment(emitted as u64);
    if failed {
        counter!("observer_cycle_failures_total", "source" => source.to_string()).increment(1);
    }
    histogram!("observer_cycle_ms", "source" => source.to_string()).record(elapsed_ms);
}
