// src/registry.rs
//! Builds observers from [`Settings`] and runs them on demand.
//!
//! Configuration problems (disabled source, missing token, unreadable
//! filters) surface here as `ObserverError::Configuration`, before any
//! connection is attempted.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aggregate::observe_all;
use crate::config::settings::provider_label;
use crate::config::{load_filters_default, Settings};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ObserverError;
use crate::event::{Event, SourceType};
use crate::lifecycle::{run_cycle, CycleOutcome};
use crate::observer::Observer;
use crate::providers::github::GitHubConnector;
use crate::providers::gmail::GmailConnector;
use crate::providers::slack::SlackConnector;
use crate::sources::{ChatObserver, CodeReviewObserver, MailObserver};

pub fn build_observer(
    settings: &Settings,
    source: SourceType,
    diagnostics: Arc<dyn DiagnosticSink>,
) -> Result<Box<dyn Observer>, ObserverError> {
    let token = settings.require(source)?;
    let timeout = settings.provider_timeout;

    let observer: Box<dyn Observer> = match source {
        SourceType::Mail => Box::new(
            MailObserver::new(
                Box::new(GmailConnector::new(token).with_timeout(timeout)),
                diagnostics,
            )
            .with_call_timeout(timeout),
        ),
        SourceType::CodeReview => {
            let filters = load_filters_default(settings)
                .map_err(|e| ObserverError::Configuration(format!("{e:#}")))?;
            let mut connector = GitHubConnector::new(token).with_timeout(timeout);
            if let Some(url) = &settings.github_api_url {
                connector = connector.with_base_url(url.as_str());
            }
            Box::new(
                CodeReviewObserver::new(Box::new(connector), filters, diagnostics)?
                    .with_call_timeout(timeout),
            )
        }
        SourceType::Chat => Box::new(
            ChatObserver::new(Box::new(SlackConnector::new(token).with_timeout(timeout)))
                .with_lookback(chrono::Duration::hours(settings.slack_lookback_hours))
                .with_call_timeout(timeout),
        ),
    };
    Ok(observer)
}

/// Observers for every enabled source. A source that is enabled but
/// misconfigured is reported and left out.
pub fn build_observers(
    settings: &Settings,
    diagnostics: Arc<dyn DiagnosticSink>,
) -> Vec<Box<dyn Observer>> {
    settings
        .enabled_sources()
        .into_iter()
        .filter_map(
            |source| match build_observer(settings, source, diagnostics.clone()) {
                Ok(o) => Some(o),
                Err(e) => {
                    diagnostics.report(Diagnostic::from_error(provider_label(source), None, &e));
                    None
                }
            },
        )
        .collect()
}

/// One cycle of a single source. Errors only on configuration; a failed
/// cycle is returned in the outcome alongside any events emitted first.
pub async fn check_source(
    settings: &Settings,
    source: SourceType,
    diagnostics: Arc<dyn DiagnosticSink>,
) -> Result<CycleOutcome, ObserverError> {
    let mut observer = build_observer(settings, source, diagnostics.clone())?;
    Ok(run_cycle(observer.as_mut(), &*diagnostics).await)
}

/// One concurrent cycle over all enabled sources.
pub async fn check_all(
    settings: &Settings,
    diagnostics: Arc<dyn DiagnosticSink>,
) -> BTreeMap<String, Vec<Event>> {
    let mut observers = build_observers(settings, diagnostics.clone());
    if observers.is_empty() {
        tracing::info!(target: "observers", "no sources enabled");
    }
    observe_all(&mut observers, &*diagnostics).await
}
