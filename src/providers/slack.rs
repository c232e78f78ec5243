// src/providers/slack.rs
//! Slack Web API fetcher.
//!
//! Slack answers HTTP 200 for most failures and reports them as
//! `{"ok": false, "error": "..."}`, so every call checks `ok`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::ObserverError;
use crate::observer::DEFAULT_CALL_TIMEOUT;
use crate::record::ChatMessage;
use crate::sources::chat::{ChannelInfo, ChatConnector, ChatSession};

pub const SLACK_API: &str = "https://slack.com/api";

const CONVERSATION_TYPES: &str = "public_channel,private_channel,im,mpim";

pub struct SlackConnector {
    token: String,
    base_url: String,
    timeout: Duration,
}

impl SlackConnector {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: SLACK_API.to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChatConnector for SlackConnector {
    /// Builds the client and validates the token with `auth.test`.
    async fn connect(&self) -> Result<Box<dyn ChatSession>, ObserverError> {
        let client = super::bearer_client("slack", &self.token, HeaderMap::new(), self.timeout)?;
        let mut session = SlackSession {
            client,
            base_url: self.base_url.clone(),
        };
        session
            .call("auth.test", &[])
            .await
            .map_err(|e| ObserverError::connection("slack", e))?;
        Ok(Box::new(session))
    }
}

struct SlackSession {
    client: Client,
    base_url: String,
}

impl SlackSession {
    async fn call(&mut self, method: &str, query: &[(&str, &str)]) -> Result<Value, ObserverError> {
        let resp = self
            .client
            .get(format!("{}/{method}", self.base_url))
            .query(query)
            .send()
            .await?;
        check_ok(method, super::json_body(resp, method).await?)
    }
}

#[async_trait]
impl ChatSession for SlackSession {
    async fn list_channels(&mut self) -> Result<Vec<ChannelInfo>, ObserverError> {
        let body = self
            .call(
                "conversations.list",
                &[
                    ("types", CONVERSATION_TYPES),
                    ("exclude_archived", "true"),
                    ("limit", "1000"),
                ],
            )
            .await?;
        Ok(parse_channels(&body))
    }

    async fn history(
        &mut self,
        channel_id: &str,
        oldest: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ObserverError> {
        let oldest = slack_ts(oldest);
        let body = self
            .call(
                "conversations.history",
                &[("channel", channel_id), ("oldest", oldest.as_str())],
            )
            .await?;
        parse_history(channel_id, body)
    }

    async fn channel_name(&mut self, channel_id: &str) -> Result<String, ObserverError> {
        let body = self
            .call("conversations.info", &[("channel", channel_id)])
            .await?;
        body.pointer("/channel/name")
            .and_then(Value::as_str)
            .map(|n| format!("#{n}"))
            .ok_or_else(|| {
                ObserverError::Fetch(format!("conversations.info: {channel_id} has no name"))
            })
    }

    async fn user_name(&mut self, user_id: &str) -> Result<String, ObserverError> {
        let body = self.call("users.info", &[("user", user_id)]).await?;
        body.pointer("/user/name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ObserverError::Fetch(format!("users.info: {user_id} has no name")))
    }

    async fn permalink(&mut self, channel_id: &str, ts: &str) -> Result<String, ObserverError> {
        let body = self
            .call(
                "chat.getPermalink",
                &[("channel", channel_id), ("message_ts", ts)],
            )
            .await?;
        body.get("permalink")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ObserverError::Fetch("chat.getPermalink: no permalink".into()))
    }
}

fn check_ok(method: &str, body: Value) -> Result<Value, ObserverError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let err = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    Err(ObserverError::Fetch(format!("slack {method}: {err}")))
}

/// `"<secs>.<micros>"`, the format Slack uses for `oldest`/`ts`.
pub fn slack_ts(t: DateTime<Utc>) -> String {
    format!("{}.{:06}", t.timestamp(), t.timestamp_subsec_micros())
}

/// Direct messages have no `is_member` flag; the bot is always part of its own.
pub fn parse_channels(body: &Value) -> Vec<ChannelInfo> {
    body.get("channels")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|c| {
                    let id = c.get("id").and_then(Value::as_str)?;
                    let flag = |k: &str| c.get(k).and_then(Value::as_bool).unwrap_or(false);
                    Some(ChannelInfo {
                        id: id.to_string(),
                        name: c.get("name").and_then(Value::as_str).map(str::to_string),
                        is_member: flag("is_member") || flag("is_im"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_history(channel_id: &str, body: Value) -> Result<Vec<ChatMessage>, ObserverError> {
    match body {
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|m| ChatMessage::from_value(channel_id, m))
                .collect(),
            _ => Ok(Vec::new()),
        },
        _ => Err(ObserverError::Fetch("conversations.history: not an object".into())),
    }
}
