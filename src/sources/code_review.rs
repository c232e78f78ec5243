// src/sources/code_review.rs
//! Code-review notification observer.
//!
//! Opt-in source: a notification becomes an event only when one of the
//! configured filters matches its repository, subject type and reason.
//! With no filters configured nothing is emitted and nothing is marked read.
//! Each emitted notification thread is marked read afterwards.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::DiagnosticSink;
use crate::error::ObserverError;
use crate::event::{Event, SourceType};
use crate::filter::{first_match, Filter, REVIEW_DIMENSIONS};
use crate::observer::{
    apply_side_effect, bounded, ConnectionState, EventStream, Observer, Session,
    DEFAULT_CALL_TIMEOUT,
};
use crate::record::{RawRecord, ReviewNotification};

#[async_trait]
pub trait ReviewConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ReviewSession>, ObserverError>;
}

#[async_trait]
pub trait ReviewSession: Send {
    /// Unread notification threads.
    async fn list_notifications(&mut self) -> Result<Vec<ReviewNotification>, ObserverError>;
    async fn mark_thread_read(&mut self, thread_id: &str) -> Result<(), ObserverError>;
    async fn close(&mut self) {}
}

pub struct CodeReviewObserver {
    name: String,
    connector: Box<dyn ReviewConnector>,
    filters: Vec<Filter>,
    session: Session<Box<dyn ReviewSession>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    call_timeout: Duration,
}

impl CodeReviewObserver {
    /// Filters are fixed for the life of the observer. Unknown dimension
    /// names are a configuration error.
    pub fn new(
        connector: Box<dyn ReviewConnector>,
        filters: Vec<Filter>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ObserverError> {
        for (idx, f) in filters.iter().enumerate() {
            f.validate(&REVIEW_DIMENSIONS)?;
            if let Some(branch) = f.branch() {
                tracing::debug!(
                    target: "observers",
                    filter = idx,
                    branch,
                    "branch is not part of a notification; ignored"
                );
            }
        }
        if filters.is_empty() {
            tracing::warn!(
                target: "observers",
                "no code-review filters configured; notifications will not be emitted"
            );
        }
        Ok(Self {
            name: "github".to_string(),
            connector,
            filters,
            session: Session::default(),
            diagnostics,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = limit;
        self
    }
}

#[async_trait]
impl Observer for CodeReviewObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::CodeReview
    }

    fn state(&self) -> ConnectionState {
        self.session.state()
    }

    async fn connect(&mut self) -> Result<(), ObserverError> {
        self.session.ensure_disconnected()?;
        let s = bounded(self.call_timeout, self.connector.connect()).await?;
        self.session.install(s);
        tracing::debug!(target: "observers", source = %self.name, "connected");
        Ok(())
    }

    fn observe(&mut self) -> Result<EventStream<'_>, ObserverError> {
        let Self {
            name,
            filters,
            session,
            diagnostics,
            call_timeout,
            ..
        } = self;
        let cursor = ReviewCursor {
            name: name.as_str(),
            filters: filters.as_slice(),
            session: &mut **session.get_mut()?,
            diagnostics: &**diagnostics,
            limit: *call_timeout,
            pending: None,
            done: false,
        };
        Ok(Box::pin(futures::stream::unfold(cursor, |mut c| async move {
            let item = c.next().await?;
            Some((item, c))
        })))
    }

    async fn disconnect(&mut self) {
        if let Some(mut s) = self.session.take() {
            s.close().await;
            tracing::debug!(target: "observers", source = %self.name, "disconnected");
        }
    }
}

struct ReviewCursor<'a> {
    name: &'a str,
    filters: &'a [Filter],
    session: &'a mut dyn ReviewSession,
    diagnostics: &'a dyn DiagnosticSink,
    limit: Duration,
    pending: Option<VecDeque<ReviewNotification>>,
    done: bool,
}

impl ReviewCursor<'_> {
    async fn next(&mut self) -> Option<Result<Event, ObserverError>> {
        if self.done {
            return None;
        }
        if self.pending.is_none() {
            if self.filters.is_empty() {
                // Explicit opt-in: skip the provider call entirely.
                self.done = true;
                return None;
            }
            match bounded(self.limit, self.session.list_notifications()).await {
                Ok(items) => self.pending = Some(items.into()),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        while let Some(n) = self.pending.as_mut().and_then(VecDeque::pop_front) {
            let Some(idx) = first_match(&n, self.filters) else {
                tracing::debug!(
                    target: "observers",
                    source = self.name,
                    item = %n.id,
                    repository = n.repository.as_deref().unwrap_or("-"),
                    failed = ?self.filters.iter().map(|f| f.failures(&n)).collect::<Vec<_>>(),
                    "skipped: no filter matched"
                );
                crate::metrics::record_skipped(self.name);
                continue;
            };
            tracing::debug!(
                target: "observers",
                source = self.name,
                item = %n.id,
                filter = idx,
                "matched"
            );

            let id = n.id.clone();
            let event = RawRecord::CodeReview(n).normalize();
            apply_side_effect(
                self.name,
                &id,
                self.limit,
                self.diagnostics,
                self.session.mark_thread_read(&id),
            )
            .await;
            return Some(Ok(event));
        }

        self.done = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::error::ErrorKind;
    use crate::filter::{EVENT_TYPES, REASONS, REPOSITORIES};
    use crate::lifecycle::observe_once;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Inbox {
        items: Vec<ReviewNotification>,
        marked: Vec<String>,
        listed: usize,
        fail_mark: bool,
    }

    struct FakeConnector(Arc<Mutex<Inbox>>);
    struct FakeSession(Arc<Mutex<Inbox>>);

    #[async_trait]
    impl ReviewConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn ReviewSession>, ObserverError> {
            Ok(Box::new(FakeSession(self.0.clone())))
        }
    }

    #[async_trait]
    impl ReviewSession for FakeSession {
        async fn list_notifications(&mut self) -> Result<Vec<ReviewNotification>, ObserverError> {
            let mut inbox = self.0.lock().unwrap();
            inbox.listed += 1;
            Ok(inbox.items.clone())
        }
        async fn mark_thread_read(&mut self, thread_id: &str) -> Result<(), ObserverError> {
            let mut inbox = self.0.lock().unwrap();
            if inbox.fail_mark {
                return Err(ObserverError::side_effect(thread_id, "HTTP 502"));
            }
            inbox.marked.push(thread_id.to_string());
            Ok(())
        }
    }

    fn notification(id: &str, repo: &str, kind: &str, reason: &str) -> ReviewNotification {
        ReviewNotification::from_value(json!({
            "id": id,
            "repository": {"full_name": repo},
            "subject": {
                "type": kind,
                "title": format!("title {id}"),
                "url": format!("https://api.test/{id}"),
            },
            "reason": reason,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn empty_filter_list_emits_nothing() {
        let inbox = Arc::new(Mutex::new(Inbox {
            items: vec![notification("1", "a/b", "PullRequest", "mention")],
            ..Default::default()
        }));
        let sink = Arc::new(CollectingSink::new());
        let mut obs =
            CodeReviewObserver::new(Box::new(FakeConnector(inbox.clone())), vec![], sink.clone())
                .unwrap();

        let events = observe_once(&mut obs, &*sink).await;
        assert!(events.is_empty());
        let inbox = inbox.lock().unwrap();
        assert!(inbox.marked.is_empty());
        assert_eq!(inbox.listed, 0);
    }

    #[tokio::test]
    async fn matches_once_even_when_several_filters_match() {
        let inbox = Arc::new(Mutex::new(Inbox {
            items: vec![
                notification("1", "a/b", "PullRequest", "mention"),
                notification("2", "a/b", "Issue", "subscribed"),
                notification("3", "c/d", "PullRequest", "mention"),
            ],
            ..Default::default()
        }));
        let filters = vec![
            Filter::new().allow(REPOSITORIES, ["a/b"]),
            Filter::new().allow(REASONS, ["mention"]),
        ];
        let sink = Arc::new(CollectingSink::new());
        let mut obs =
            CodeReviewObserver::new(Box::new(FakeConnector(inbox.clone())), filters, sink.clone())
                .unwrap();

        let events = observe_once(&mut obs, &*sink).await;
        let ids: Vec<&str> = events.iter().map(Event::id).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(inbox.lock().unwrap().marked, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn non_matching_notifications_stay_unread() {
        let inbox = Arc::new(Mutex::new(Inbox {
            items: vec![
                notification("1", "a/b", "PullRequest", "mention"),
                notification("2", "a/b", "PullRequest", "author"),
            ],
            ..Default::default()
        }));
        let filters = vec![Filter::new()
            .allow(REPOSITORIES, ["a/b"])
            .allow(EVENT_TYPES, ["PullRequest"])
            .allow(REASONS, ["mention"])];
        let sink = Arc::new(CollectingSink::new());
        let mut obs =
            CodeReviewObserver::new(Box::new(FakeConnector(inbox.clone())), filters, sink.clone())
                .unwrap();

        let events = observe_once(&mut obs, &*sink).await;
        assert_eq!(events.len(), 1);
        assert_eq!(inbox.lock().unwrap().marked, ["1"]);
    }

    #[test]
    fn unknown_dimension_is_rejected_up_front() {
        let inbox = Arc::new(Mutex::new(Inbox::default()));
        let bad = Filter::new().allow("labels", ["bug"]);
        let res = CodeReviewObserver::new(
            Box::new(FakeConnector(inbox)),
            vec![bad],
            Arc::new(CollectingSink::new()),
        );
        assert!(matches!(res, Err(ObserverError::Configuration(_))));
    }

    #[tokio::test]
    async fn failed_mark_read_still_emits() {
        let inbox = Arc::new(Mutex::new(Inbox {
            items: vec![
                notification("1", "a/b", "PullRequest", "mention"),
                notification("2", "a/b", "Issue", "mention"),
            ],
            fail_mark: true,
            ..Default::default()
        }));
        let filters = vec![Filter::new().allow(REASONS, ["mention"])];
        let sink = Arc::new(CollectingSink::new());
        let mut obs =
            CodeReviewObserver::new(Box::new(FakeConnector(inbox.clone())), filters, sink.clone())
                .unwrap();

        let events = observe_once(&mut obs, &*sink).await;

        let ids: Vec<&str> = events.iter().map(Event::id).collect();
        assert_eq!(ids, ["1", "2"]);
        assert!(inbox.lock().unwrap().marked.is_empty());
        let reports = sink.snapshot();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|d| d.kind == ErrorKind::SideEffect));
        assert_eq!(reports[0].item_id.as_deref(), Some("1"));
    }
}
