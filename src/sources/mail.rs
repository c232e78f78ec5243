// src/sources/mail.rs
//! Mail observer.
//!
//! Eligibility is the `UNREAD` label only; configured filters do not apply
//! to this source. After an event is produced its `UNREAD` label is removed.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::DiagnosticSink;
use crate::error::ObserverError;
use crate::event::{Event, SourceType};
use crate::observer::{
    apply_side_effect, bounded, ConnectionState, EventStream, Observer, Session,
    DEFAULT_CALL_TIMEOUT,
};
use crate::record::{MailMessage, RawRecord, UNREAD_LABEL};

/// Opens an authenticated mailbox session.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailSession>, ObserverError>;
}

/// One live mailbox session.
#[async_trait]
pub trait MailSession: Send {
    /// Ids of messages the provider lists as unread.
    async fn list_unread(&mut self) -> Result<Vec<String>, ObserverError>;
    async fn fetch_message(&mut self, id: &str) -> Result<MailMessage, ObserverError>;
    async fn remove_label(&mut self, id: &str, label: &str) -> Result<(), ObserverError>;
    async fn close(&mut self) {}
}

pub struct MailObserver {
    name: String,
    connector: Box<dyn MailConnector>,
    session: Session<Box<dyn MailSession>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    call_timeout: Duration,
}

impl MailObserver {
    pub fn new(connector: Box<dyn MailConnector>, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            name: "gmail".to_string(),
            connector,
            session: Session::default(),
            diagnostics,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
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
impl Observer for MailObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Mail
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
            session,
            diagnostics,
            call_timeout,
            ..
        } = self;
        let cursor = MailCursor {
            name: name.as_str(),
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

struct MailCursor<'a> {
    name: &'a str,
    session: &'a mut dyn MailSession,
    diagnostics: &'a dyn DiagnosticSink,
    limit: Duration,
    pending: Option<VecDeque<String>>,
    done: bool,
}

impl MailCursor<'_> {
    async fn next(&mut self) -> Option<Result<Event, ObserverError>> {
        if self.done {
            return None;
        }
        if self.pending.is_none() {
            match bounded(self.limit, self.session.list_unread()).await {
                Ok(ids) => self.pending = Some(ids.into()),
                Err(e) => return self.fail(e),
            }
        }

        while let Some(id) = self.pending.as_mut().and_then(VecDeque::pop_front) {
            let msg = match bounded(self.limit, self.session.fetch_message(&id)).await {
                Ok(m) => m,
                Err(e) => return self.fail(e),
            };

            // The listing can be stale by the time the message is fetched.
            if !msg.is_unread() {
                tracing::debug!(
                    target: "observers",
                    source = self.name,
                    item = %id,
                    "no longer unread"
                );
                crate::metrics::record_skipped(self.name);
                continue;
            }

            let event = RawRecord::Mail(msg).normalize();
            apply_side_effect(
                self.name,
                &id,
                self.limit,
                self.diagnostics,
                self.session.remove_label(&id, UNREAD_LABEL),
            )
            .await;
            return Some(Ok(event));
        }

        self.done = true;
        None
    }

    fn fail(&mut self, e: ObserverError) -> Option<Result<Event, ObserverError>> {
        self.done = true;
        Some(Err(e))
    }
}
