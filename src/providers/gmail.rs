// src/providers/gmail.rs
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::ObserverError;
use crate::observer::DEFAULT_CALL_TIMEOUT;
use crate::record::{MailMessage, UNREAD_LABEL};
use crate::sources::mail::{MailConnector, MailSession};

pub const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Upper bound on messages listed per cycle (one page).
const MAX_RESULTS: &str = "100";

pub struct GmailConnector {
    access_token: String,
    base_url: String,
    timeout: Duration,
}

impl GmailConnector {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: GMAIL_API.to_string(),
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
impl MailConnector for GmailConnector {
    /// Builds the client and checks the token against the profile endpoint.
    async fn connect(&self) -> Result<Box<dyn MailSession>, ObserverError> {
        let client =
            super::bearer_client("gmail", &self.access_token, HeaderMap::new(), self.timeout)?;
        let resp = client
            .get(format!("{}/profile", self.base_url))
            .send()
            .await
            .map_err(|e| ObserverError::connection("gmail", e))?;
        if !resp.status().is_success() {
            return Err(ObserverError::connection(
                "gmail",
                format!("profile check returned HTTP {}", resp.status()),
            ));
        }
        Ok(Box::new(GmailSession {
            client,
            base_url: self.base_url.clone(),
        }))
    }
}

struct GmailSession {
    client: Client,
    base_url: String,
}

#[async_trait]
impl MailSession for GmailSession {
    async fn list_unread(&mut self) -> Result<Vec<String>, ObserverError> {
        let resp = self
            .client
            .get(format!("{}/messages", self.base_url))
            .query(&[("labelIds", UNREAD_LABEL), ("maxResults", MAX_RESULTS)])
            .send()
            .await?;
        Ok(message_ids(&super::json_body(resp, "gmail messages.list").await?))
    }

    async fn fetch_message(&mut self, id: &str) -> Result<MailMessage, ObserverError> {
        let resp = self
            .client
            .get(format!("{}/messages/{id}", self.base_url))
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
            ])
            .send()
            .await?;
        MailMessage::from_value(super::json_body(resp, "gmail messages.get").await?)
    }

    async fn remove_label(&mut self, id: &str, label: &str) -> Result<(), ObserverError> {
        let resp = self
            .client
            .post(format!("{}/messages/{id}/modify", self.base_url))
            .json(&json!({ "removeLabelIds": [label] }))
            .send()
            .await
            .map_err(|e| ObserverError::side_effect(id, e))?;
        super::expect_success(&resp, id)
    }
}

/// `messages.list` omits the `messages` key entirely when nothing matches.
pub fn message_ids(body: &Value) -> Vec<String> {
    body.get("messages")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing_has_no_ids() {
        assert!(message_ids(&json!({"resultSizeEstimate": 0})).is_empty());
    }

    #[test]
    fn listing_ids_in_order() {
        let body = json!({"messages": [
            {"id": "b", "threadId": "t"},
            {"id": "a", "threadId": "t"}
        ]});
        assert_eq!(message_ids(&body), vec!["b".to_string(), "a".to_string()]);
    }
}
