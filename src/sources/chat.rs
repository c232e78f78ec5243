// src/sources/chat.rs
//! Chat observer.
//!
//! Reads recent history of every channel the bot is a member of. A message
//! is emitted when it was posted inside the lookback window and has a human
//! author. Messages are never mutated, so there is no consumed marker.
//! Channel and user ids are resolved to display names, falling back to the
//! raw ids when a lookup fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::ObserverError;
use crate::event::{Event, SourceType};
use crate::observer::{
    bounded, ConnectionState, EventStream, Observer, Session, DEFAULT_CALL_TIMEOUT,
};
use crate::record::{ChatMessage, RawRecord};

pub const DEFAULT_LOOKBACK_HOURS: i64 = 1;

/// A conversation as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    pub id: String,
    pub name: Option<String>,
    pub is_member: bool,
}

#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChatSession>, ObserverError>;
}

#[async_trait]
pub trait ChatSession: Send {
    async fn list_channels(&mut self) -> Result<Vec<ChannelInfo>, ObserverError>;
    /// Messages in `channel_id` posted at or after `oldest`.
    async fn history(
        &mut self,
        channel_id: &str,
        oldest: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ObserverError>;
    async fn channel_name(&mut self, channel_id: &str) -> Result<String, ObserverError>;
    async fn user_name(&mut self, user_id: &str) -> Result<String, ObserverError>;
    async fn permalink(&mut self, channel_id: &str, ts: &str) -> Result<String, ObserverError>;
    async fn close(&mut self) {}
}

pub struct ChatObserver {
    name: String,
    connector: Box<dyn ChatConnector>,
    lookback: chrono::Duration,
    session: Session<Box<dyn ChatSession>>,
    call_timeout: Duration,
}

impl ChatObserver {
    pub fn new(connector: Box<dyn ChatConnector>) -> Self {
        Self {
            name: "slack".to_string(),
            connector,
            lookback: chrono::Duration::hours(DEFAULT_LOOKBACK_HOURS),
            session: Session::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Negative windows are treated as zero.
    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = lookback.max(chrono::Duration::zero());
        self
    }

    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = limit;
        self
    }
}

#[async_trait]
impl Observer for ChatObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Chat
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
        let oldest = Utc::now() - self.lookback;
        let Self {
            name,
            session,
            call_timeout,
            ..
        } = self;
        let cursor = ChatCursor {
            name: name.as_str(),
            session: &mut **session.get_mut()?,
            limit: *call_timeout,
            oldest,
            channels: None,
            current: None,
            users: HashMap::new(),
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

/// Human author and posted inside the window. Providers may ignore the
/// `oldest` bound, so the window is checked here as well.
fn eligible(msg: &ChatMessage, oldest: DateTime<Utc>) -> bool {
    msg.is_human() && msg.posted_at().is_some_and(|t| t >= oldest)
}

struct ChannelPass {
    id: String,
    display: String,
    messages: VecDeque<ChatMessage>,
}

struct ChatCursor<'a> {
    name: &'a str,
    session: &'a mut dyn ChatSession,
    limit: Duration,
    oldest: DateTime<Utc>,
    channels: Option<VecDeque<ChannelInfo>>,
    current: Option<ChannelPass>,
    /// user id -> display name, for this pass only.
    users: HashMap<String, String>,
    done: bool,
}

impl ChatCursor<'_> {
    async fn next(&mut self) -> Option<Result<Event, ObserverError>> {
        if self.done {
            return None;
        }
        if self.channels.is_none() {
            match bounded(self.limit, self.session.list_channels()).await {
                Ok(all) => {
                    let member: VecDeque<ChannelInfo> =
                        all.into_iter().filter(|c| c.is_member).collect();
                    if member.is_empty() {
                        tracing::info!(
                            target: "observers",
                            source = self.name,
                            "bot is not a member of any channels; invite it to channels to monitor them"
                        );
                    }
                    self.channels = Some(member);
                }
                Err(e) => return self.fail(e),
            }
        }

        loop {
            if let Some(pass) = self.current.as_mut() {
                match pass.messages.pop_front() {
                    Some(msg) => {
                        if !eligible(&msg, self.oldest) {
                            crate::metrics::record_skipped(self.name);
                            continue;
                        }
                        let (channel_id, display) = (pass.id.clone(), pass.display.clone());
                        return Some(Ok(self.resolve(msg, &channel_id, display).await));
                    }
                    None => self.current = None,
                }
            }

            let Some(channel) = self.channels.as_mut().and_then(VecDeque::pop_front) else {
                self.done = true;
                return None;
            };
            let messages = match bounded(
                self.limit,
                self.session.history(&channel.id, self.oldest),
            )
            .await
            {
                Ok(m) => m,
                Err(e) => return self.fail(e),
            };
            let display = self.channel_display(&channel).await;
            self.current = Some(ChannelPass {
                id: channel.id,
                display,
                messages: messages.into(),
            });
        }
    }

    async fn channel_display(&mut self, channel: &ChannelInfo) -> String {
        if let Some(n) = channel.name.as_deref().filter(|n| !n.is_empty()) {
            return format!("#{n}");
        }
        match bounded(self.limit, self.session.channel_name(&channel.id)).await {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(
                    target: "observers",
                    source = self.name,
                    channel = %channel.id,
                    error = %e,
                    "channel lookup failed"
                );
                channel.id.clone()
            }
        }
    }

    async fn user_display(&mut self, user_id: &str) -> String {
        if let Some(n) = self.users.get(user_id) {
            return n.clone();
        }
        let name = match bounded(self.limit, self.session.user_name(user_id)).await {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(
                    target: "observers",
                    source = self.name,
                    user = user_id,
                    error = %e,
                    "user lookup failed"
                );
                user_id.to_string()
            }
        };
        self.users.insert(user_id.to_string(), name.clone());
        name
    }

    async fn resolve(&mut self, mut msg: ChatMessage, channel_id: &str, display: String) -> Event {
        if let Some(uid) = msg.user_id.clone() {
            msg.user_name = Some(self.user_display(&uid).await);
        }
        msg.channel_name = Some(display);
        msg.permalink = bounded(self.limit, self.session.permalink(channel_id, &msg.ts))
            .await
            .ok();
        RawRecord::Chat(msg).normalize()
    }

    fn fail(&mut self, e: ObserverError) -> Option<Result<Event, ObserverError>> {
        self.done = true;
        Some(Err(e))
    }
}
