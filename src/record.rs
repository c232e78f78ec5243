// src/record.rs
//! Provider-native records and their normalization into [`Event`]s.
//!
//! Each record type extracts its fields explicitly from the provider JSON.
//! Required: the id. Everything else falls back to a documented default so
//! that every event of a given source type carries the same content keys.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::error::ObserverError;
use crate::event::{Content, Event, SourceType};

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown Sender";
pub const NO_TITLE: &str = "No Title";

/// Gmail label carried by unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// A raw provider item, tagged by source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Mail(MailMessage),
    CodeReview(ReviewNotification),
    Chat(ChatMessage),
}

impl RawRecord {
    /// Turn the record into an event. Never fails: absent optional fields
    /// become their defaults.
    pub fn normalize(self) -> Event {
        match self {
            RawRecord::Mail(m) => m.into_event(),
            RawRecord::CodeReview(n) => n.into_event(),
            RawRecord::Chat(c) => c.into_event(),
        }
    }
}

// ---- extraction helpers ----

fn str_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = v;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn required_id(v: &Value, key: &str, what: &str) -> Result<String, ObserverError> {
    match v.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ObserverError::Fetch(format!("{what} record without `{key}`"))),
    }
}

/// Parse Slack style `"1700000000.000100"` seconds.
pub fn parse_epoch_secs(ts: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = ts.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs.fract() * 1e9).round() as u32).min(999_999_999);
    Utc.timestamp_opt(whole, nanos).single()
}

/* ----------------------------
Mail
---------------------------- */

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub snippet: Option<String>,
    pub label_ids: Vec<String>,
    /// (name, value) header pairs as delivered.
    pub headers: Vec<(String, String)>,
    pub internal_date: Option<DateTime<Utc>>,
    pub raw: Option<Value>,
}

impl MailMessage {
    /// Extract from a Gmail `users.messages.get` payload.
    pub fn from_value(v: Value) -> Result<Self, ObserverError> {
        let id = required_id(&v, "id", "mail")?;
        let label_ids = v
            .get("labelIds")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let headers = v
            .pointer("/payload/headers")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|h| {
                        let name = str_at(h, &["name"])?;
                        let value = str_at(h, &["value"])?;
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        // Gmail sends internalDate as a string of epoch millis.
        let internal_date = str_at(&v, &["internalDate"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(Self {
            id,
            thread_id: str_at(&v, &["threadId"]).map(str::to_string),
            snippet: str_at(&v, &["snippet"]).map(str::to_string),
            label_ids,
            headers,
            internal_date,
            raw: Some(v),
        })
    }

    pub fn is_unread(&self) -> bool {
        self.label_ids.iter().any(|l| l == UNREAD_LABEL)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn subject(&self) -> &str {
        self.header("subject").unwrap_or(NO_SUBJECT)
    }

    pub fn sender(&self) -> &str {
        self.header("from").unwrap_or(UNKNOWN_SENDER)
    }

    fn into_event(self) -> Event {
        // Gmail escapes HTML entities in snippets.
        let snippet = self
            .snippet
            .as_deref()
            .map(|s| html_escape::decode_html_entities(s).into_owned())
            .unwrap_or_default();

        let mut content = Content::new();
        content.insert("subject".into(), json!(self.subject()));
        content.insert("sender".into(), json!(self.sender()));
        content.insert("snippet".into(), json!(snippet));
        content.insert(
            "thread_id".into(),
            json!(self.thread_id.clone().unwrap_or_default()),
        );
        content.insert("labels".into(), json!(self.label_ids));

        let mut ev = Event::new(self.id, SourceType::Mail, content).with_raw_source(self.raw);
        if let Some(ts) = self.internal_date {
            ev = ev.with_timestamp(ts);
        }
        ev
    }
}

/* ----------------------------
Code review
---------------------------- */

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReviewNotification {
    pub id: String,
    pub repository: Option<String>,
    pub subject_type: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub raw: Option<Value>,
}

impl ReviewNotification {
    /// Extract from a GitHub notification thread. `repository` may be either
    /// the full API object (`{"full_name": ...}`) or a plain `"owner/name"`.
    pub fn from_value(v: Value) -> Result<Self, ObserverError> {
        let id = required_id(&v, "id", "notification")?;
        let repository = match v.get("repository") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(obj) => str_at(obj, &["full_name"]).map(str::to_string),
            None => None,
        };
        let updated_at = str_at(&v, &["updated_at"])
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            id,
            repository,
            subject_type: str_at(&v, &["subject", "type"]).map(str::to_string),
            title: str_at(&v, &["subject", "title"]).map(str::to_string),
            url: str_at(&v, &["subject", "url"]).map(str::to_string),
            reason: str_at(&v, &["reason"]).map(str::to_string),
            updated_at,
            raw: Some(v),
        })
    }

    fn into_event(self) -> Event {
        let mut content = Content::new();
        content.insert(
            "title".into(),
            json!(self.title.as_deref().unwrap_or(NO_TITLE)),
        );
        content.insert(
            "repository".into(),
            json!(self.repository.unwrap_or_default()),
        );
        content.insert("type".into(), json!(self.subject_type.unwrap_or_default()));
        content.insert("reason".into(), json!(self.reason.unwrap_or_default()));
        content.insert("url".into(), json!(self.url.unwrap_or_default()));

        let mut ev =
            Event::new(self.id, SourceType::CodeReview, content).with_raw_source(self.raw);
        if let Some(ts) = self.updated_at {
            ev = ev.with_timestamp(ts);
        }
        ev
    }
}

/* ----------------------------
Chat
---------------------------- */

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatMessage {
    /// Slack message timestamp; unique only within its channel.
    pub ts: String,
    pub channel_id: String,
    pub user_id: Option<String>,
    pub subtype: Option<String>,
    pub text: Option<String>,
    pub thread_ts: Option<String>,
    /// Display names and permalink filled in by the observer before normalization.
    pub channel_name: Option<String>,
    pub user_name: Option<String>,
    pub permalink: Option<String>,
    pub raw: Option<Value>,
}

impl ChatMessage {
    /// Extract from one entry of `conversations.history`.
    pub fn from_value(channel_id: &str, v: Value) -> Result<Self, ObserverError> {
        let ts = required_id(&v, "ts", "chat")?;
        Ok(Self {
            ts,
            channel_id: channel_id.to_string(),
            user_id: str_at(&v, &["user"]).map(str::to_string),
            subtype: str_at(&v, &["subtype"]).map(str::to_string),
            text: str_at(&v, &["text"]).map(str::to_string),
            thread_ts: str_at(&v, &["thread_ts"]).map(str::to_string),
            channel_name: None,
            user_name: None,
            permalink: None,
            raw: Some(v),
        })
    }

    /// Human-authored: no subtype (joins, bot posts, edits...) and a user id.
    pub fn is_human(&self) -> bool {
        self.subtype.is_none() && self.user_id.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        parse_epoch_secs(&self.ts)
    }

    fn into_event(self) -> Event {
        // `ts` alone repeats across channels.
        let id = format!("{}:{}", self.channel_id, self.ts);
        let channel = self.channel_name.unwrap_or(self.channel_id);
        let user = self
            .user_name
            .or(self.user_id)
            .unwrap_or_default();
        let posted_at = parse_epoch_secs(&self.ts);

        let mut content = Content::new();
        content.insert("channel".into(), json!(channel));
        content.insert("user".into(), json!(user));
        content.insert("text".into(), json!(self.text.unwrap_or_default()));
        content.insert("thread_ts".into(), json!(self.thread_ts));
        content.insert("permalink".into(), json!(self.permalink));

        let mut ev = Event::new(id, SourceType::Chat, content).with_raw_source(self.raw);
        if let Some(ts) = posted_at {
            ev = ev.with_timestamp(ts);
        }
        ev
    }
}
