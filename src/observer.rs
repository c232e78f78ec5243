// src/observer.rs
//! The observer contract and the pieces every source adapter shares.
//!
//! State machine: `Disconnected -> Connected -> Disconnected`.
//! - `connect` while connected fails with `InvalidState` and acquires nothing.
//! - `observe` while disconnected fails with `InvalidState`.
//! - `disconnect` always leaves the observer disconnected.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::future::Future;
use std::time::Duration;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ObserverError;
use crate::event::{Event, SourceType};

/// Lazy, finite sequence of events for one pass over the provider.
/// An `Err` item ends the pass; items before it stay valid.
pub type EventStream<'a> = BoxStream<'a, Result<Event, ObserverError>>;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[async_trait]
pub trait Observer: Send {
    /// Key under which this observer's events are aggregated.
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    fn state(&self) -> ConnectionState;

    async fn connect(&mut self) -> Result<(), ObserverError>;

    /// Start a fresh pass. Side effects for an item run before it is yielded.
    fn observe(&mut self) -> Result<EventStream<'_>, ObserverError>;

    /// Release the session. Safe to call in any state.
    async fn disconnect(&mut self);
}

/// Holds at most one live provider session.
#[derive(Debug)]
pub struct Session<S> {
    inner: Option<S>,
}

impl<S> Default for Session<S> {
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<S> Session<S> {
    pub fn state(&self) -> ConnectionState {
        if self.inner.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Check before acquiring a new session.
    pub fn ensure_disconnected(&self) -> Result<(), ObserverError> {
        match self.inner {
            Some(_) => Err(ObserverError::InvalidState(
                "connect called while already connected",
            )),
            None => Ok(()),
        }
    }

    pub fn install(&mut self, session: S) {
        self.inner = Some(session);
    }

    pub fn get_mut(&mut self) -> Result<&mut S, ObserverError> {
        self.inner
            .as_mut()
            .ok_or(ObserverError::InvalidState("observe called while disconnected"))
    }

    pub fn take(&mut self) -> Option<S> {
        self.inner.take()
    }
}

/// Bound a single provider call.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ObserverError>
where
    F: Future<Output = Result<T, ObserverError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(res) => res,
        Err(_) => Err(ObserverError::Timeout(limit)),
    }
}

/// Run a mark-consumed call. Failures are reported and swallowed so the
/// pass continues and the event is still emitted.
pub(crate) async fn apply_side_effect<F>(
    source: &str,
    item_id: &str,
    limit: Duration,
    diagnostics: &dyn DiagnosticSink,
    call: F,
) -> bool
where
    F: Future<Output = Result<(), ObserverError>>,
{
    match bounded(limit, call).await {
        Ok(()) => true,
        Err(e) => {
            let e = match e {
                ObserverError::SideEffect { .. } => e,
                other => ObserverError::side_effect(item_id, other),
            };
            diagnostics.report(Diagnostic::from_error(source, Some(item_id), &e));
            crate::metrics::record_side_effect_failure(source);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::error::ErrorKind;

    #[test]
    fn session_state_machine() {
        let mut s: Session<u8> = Session::default();
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert!(matches!(
            s.get_mut(),
            Err(ObserverError::InvalidState(_))
        ));
        s.install(1);
        assert_eq!(s.state(), ConnectionState::Connected);
        assert!(s.ensure_disconnected().is_err());
        assert_eq!(s.take(), Some(1));
        assert!(s.ensure_disconnected().is_ok());
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let res: Result<(), _> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(ObserverError::Timeout(_))));
    }

    #[tokio::test]
    async fn side_effect_failure_is_reported_not_raised() {
        let sink = CollectingSink::new();
        let ok = apply_side_effect("github", "42", DEFAULT_CALL_TIMEOUT, &sink, async {
            Err(ObserverError::Fetch("HTTP 500".into()))
        })
        .await;
        assert!(!ok);
        let reports = sink.snapshot();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, ErrorKind::SideEffect);
        assert_eq!(reports[0].item_id.as_deref(), Some("42"));
    }
}
