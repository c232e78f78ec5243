// src/event.rs
//! Normalized event shape and the stable content hash.
//!
//! - `content` is a key-ordered map of the semantic fields of one source item.
//! - `hash` is computed once, at construction, from `content` only.
//! - Keys in [`VOLATILE_KEYS`] never reach the hash.
//! - `raw_source` is kept for debugging and never hashed or serialized.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Semantic fields of an event, ordered by key.
pub type Content = BTreeMap<String, Value>;

/// Content keys excluded from the fingerprint.
pub const VOLATILE_KEYS: [&str; 3] = ["last_updated", "processed_at", "timestamp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Mail,
    CodeReview,
    Chat,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Mail => "mail",
            SourceType::CodeReview => "code_review",
            SourceType::Chat => "chat",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted source item. Serializes as a flat object: content fields
/// plus `id`, `source_type`, `timestamp` and `hash`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    id: String,
    source_type: SourceType,
    #[serde(serialize_with = "rfc3339")]
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    content: Content,
    hash: String,
    #[serde(skip)]
    raw_source: Option<Value>,
}

fn rfc3339<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339())
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn new(id: impl Into<String>, source_type: SourceType, content: Content) -> Self {
        let hash = content_hash(&content);
        Self {
            id: id.into(),
            source_type,
            timestamp: Utc::now(),
            content,
            hash,
            raw_source: None,
        }
    }

    /// Use the provider's own event time instead of the capture time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_raw_source(mut self, raw: Option<Value>) -> Self {
        self.raw_source = raw;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Convenience accessor for string-valued content fields.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn raw_source(&self) -> Option<&Value> {
        self.raw_source.as_ref()
    }
}

/// SHA-256 over the key-sorted compact JSON of `content`, minus volatile keys.
/// Lowercase hex, 64 chars.
pub fn content_hash(content: &Content) -> String {
    use sha2::{Digest, Sha256};

    let stable: BTreeMap<&str, &Value> = content
        .iter()
        .filter(|(k, _)| !VOLATILE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v))
        .collect();

    // serde_json objects are BTreeMap-backed, so nested keys are sorted too.
    let canonical = serde_json::to_vec(&stable).unwrap_or_default();

    let digest = Sha256::digest(&canonical);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
