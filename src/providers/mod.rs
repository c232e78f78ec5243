// src/providers/mod.rs
//! HTTP fetchers for the three providers. Each uses a pre-issued bearer
//! token; acquiring or refreshing tokens happens elsewhere.

pub mod github;
pub mod gmail;
pub mod slack;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

use crate::error::ObserverError;

const UA: &str = concat!("notification-observers/", env!("CARGO_PKG_VERSION"));

/// Client with bearer auth and a per-request timeout.
pub(crate) fn bearer_client(
    source: &str,
    token: &str,
    mut headers: HeaderMap,
    timeout: Duration,
) -> Result<Client, ObserverError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| ObserverError::connection(source, "token is not a valid header value"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(USER_AGENT, HeaderValue::from_static(UA));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ObserverError::connection(source, e))
}

/// Body as JSON, or a fetch error naming `what` on non-2xx.
pub(crate) async fn json_body(resp: Response, what: &str) -> Result<Value, ObserverError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(ObserverError::Fetch(format!("{what}: HTTP {status}: {snippet}")));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| ObserverError::Fetch(format!("{what}: invalid JSON: {e}")))
}

/// Check the status of a call whose body is not needed.
pub(crate) fn expect_success(resp: &Response, item_id: &str) -> Result<(), ObserverError> {
    resp.error_for_status_ref()
        .map(|_| ())
        .map_err(|e| ObserverError::side_effect(item_id, e))
}
