// src/providers/github.rs
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::ObserverError;
use crate::observer::DEFAULT_CALL_TIMEOUT;
use crate::record::ReviewNotification;
use crate::sources::code_review::{ReviewConnector, ReviewSession};

pub const GITHUB_API: &str = "https://api.github.com";

pub struct GitHubConnector {
    token: String,
    base_url: String,
    timeout: Duration,
}

impl GitHubConnector {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: GITHUB_API.to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// For GitHub Enterprise or a local stub.
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
impl ReviewConnector for GitHubConnector {
    async fn connect(&self) -> Result<Box<dyn ReviewSession>, ObserverError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let client = super::bearer_client("github", &self.token, headers, self.timeout)?;
        Ok(Box::new(GitHubSession {
            client,
            base_url: self.base_url.clone(),
        }))
    }
}

struct GitHubSession {
    client: Client,
    base_url: String,
}

#[async_trait]
impl ReviewSession for GitHubSession {
    async fn list_notifications(&mut self) -> Result<Vec<ReviewNotification>, ObserverError> {
        let resp = self
            .client
            .get(format!("{}/notifications", self.base_url))
            .query(&[("all", "false")])
            .send()
            .await?;
        parse_notifications(super::json_body(resp, "github notifications").await?)
    }

    async fn mark_thread_read(&mut self, thread_id: &str) -> Result<(), ObserverError> {
        let resp = self
            .client
            .patch(format!("{}/notifications/threads/{thread_id}", self.base_url))
            .send()
            .await
            .map_err(|e| ObserverError::side_effect(thread_id, e))?;
        super::expect_success(&resp, thread_id)
    }
}

/// The notifications endpoint returns a bare array of threads.
pub fn parse_notifications(body: Value) -> Result<Vec<ReviewNotification>, ObserverError> {
    match body {
        Value::Array(items) => items.into_iter().map(ReviewNotification::from_value).collect(),
        other => Err(ObserverError::Fetch(format!(
            "github notifications: expected an array, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_thread_array() {
        let body = json!([
            {
                "id": "1",
                "repository": {"full_name": "a/b"},
                "subject": {"type": "Issue", "title": "t"},
                "reason": "mention"
            },
            {
                "id": "2",
                "repository": {"full_name": "c/d"},
                "subject": {"type": "PullRequest"},
                "reason": "author"
            }
        ]);
        let items = parse_notifications(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].repository.as_deref(), Some("c/d"));
    }

    #[test]
    fn rejects_error_objects() {
        let err = parse_notifications(json!({"message": "Bad credentials"})).unwrap_err();
        assert!(err.to_string().contains("expected an array, got object"));
    }

    #[test]
    fn base_url_is_normalized() {
        let c = GitHubConnector::new("t").with_base_url("http://localhost:9000/");
        assert_eq!(c.base_url, "http://localhost:9000");
    }
}
