//! Observers CLI.
//!
//! `observers [gmail|github|slack|all]` runs one cycle and prints the
//! collected events as JSON on stdout. With `OBSERVERS_POLL_INTERVAL_SECS`
//! set it keeps polling until interrupted. Logs go to stderr.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use notification_observers::config::settings::parse_source;
use notification_observers::config::Settings;
use notification_observers::diagnostics::tracing_sink;
use notification_observers::registry::{check_all, check_source};
use notification_observers::scheduler::poll_until;
use notification_observers::{DiagnosticSink, Event};

/// `RUST_LOG` wins; `OBSERVERS_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notification_observers=info,observers=info,warn"));

    let json = std::env::var("OBSERVERS_LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(target: &str, settings: &Settings, sink: Arc<dyn DiagnosticSink>) -> Result<()> {
    let events: BTreeMap<String, Vec<Event>> = if target.eq_ignore_ascii_case("all") {
        check_all(settings, sink).await
    } else {
        let source = parse_source(target).with_context(|| {
            format!("unknown source `{target}` (expected gmail, github, slack or all)")
        })?;
        let outcome = check_source(settings, source, sink).await?;
        BTreeMap::from([(outcome.source, outcome.events)])
    };
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let target = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let settings = Settings::from_env();
    let sink = tracing_sink();

    let Some(every) = settings.poll_interval else {
        return run(&target, &settings, sink).await;
    };

    tracing::info!(target: "observers", every_secs = every.as_secs(), source = %target, "polling");
    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(target: "observers", "interrupted");
    };
    poll_until(every, interrupted, || run(&target, &settings, sink.clone())).await
}
