// src/config/settings.rs
//! Process settings read from the environment (and `.env`, loaded by the
//! binary through `dotenvy`).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ObserverError;
use crate::event::SourceType;
use crate::observer::DEFAULT_CALL_TIMEOUT;
use crate::sources::chat::DEFAULT_LOOKBACK_HOURS;

pub const ENV_APP_DIR: &str = "OBSERVERS_APP_DIR";
pub const ENV_PROVIDER_TIMEOUT: &str = "OBSERVERS_PROVIDER_TIMEOUT_SECS";
pub const ENV_POLL_INTERVAL: &str = "OBSERVERS_POLL_INTERVAL_SECS";

/// One year.
const MAX_LOOKBACK_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub enabled: bool,
    pub token: Option<String>,
}

impl SourceSettings {
    fn from_lookup<F>(lookup: &F, prefix: &str, token_var: &str) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            enabled: lookup(format!("{prefix}_ENABLED").as_str())
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            token: lookup(token_var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Root for per-source files such as `github/filters.json`.
    pub app_dir: PathBuf,
    pub provider_timeout: Duration,
    /// `None` means run once and exit.
    pub poll_interval: Option<Duration>,

    pub gmail: SourceSettings,

    pub github: SourceSettings,
    pub github_filters_path: Option<PathBuf>,
    pub github_api_url: Option<String>,

    pub slack: SourceSettings,
    pub slack_lookback_hours: i64,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable numbers fall
    /// back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_dir = lookup(ENV_APP_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_app_dir(lookup("HOME")));

        let provider_timeout = parse_secs(&lookup, ENV_PROVIDER_TIMEOUT)
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);

        let poll_interval = parse_secs(&lookup, ENV_POLL_INTERVAL)
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        let slack_lookback_hours = parse_secs(&lookup, "SLACK_LOOKBACK_HOURS")
            .map(|h| h.min(MAX_LOOKBACK_HOURS) as i64)
            .unwrap_or(DEFAULT_LOOKBACK_HOURS);

        Self {
            app_dir,
            provider_timeout,
            poll_interval,
            gmail: SourceSettings::from_lookup(&lookup, "GMAIL", "GMAIL_ACCESS_TOKEN"),
            github: SourceSettings::from_lookup(&lookup, "GITHUB", "GITHUB_TOKEN"),
            github_filters_path: lookup("GITHUB_FILTERS_PATH").map(PathBuf::from),
            github_api_url: lookup("GITHUB_API_URL").filter(|v| !v.trim().is_empty()),
            slack: SourceSettings::from_lookup(&lookup, "SLACK", "SLACK_TOKEN"),
            slack_lookback_hours,
        }
    }

    pub fn source(&self, source: SourceType) -> &SourceSettings {
        match source {
            SourceType::Mail => &self.gmail,
            SourceType::CodeReview => &self.github,
            SourceType::Chat => &self.slack,
        }
    }

    /// Token for an enabled source, or a configuration error naming what is missing.
    pub fn require(&self, source: SourceType) -> Result<&str, ObserverError> {
        let s = self.source(source);
        let label = provider_label(source);
        if !s.enabled {
            return Err(ObserverError::Configuration(format!(
                "{label} is disabled (set {}_ENABLED=true)",
                label.to_ascii_uppercase()
            )));
        }
        s.token.as_deref().ok_or_else(|| {
            ObserverError::Configuration(format!("{label} token not configured"))
        })
    }

    pub fn enabled_sources(&self) -> Vec<SourceType> {
        [SourceType::Mail, SourceType::CodeReview, SourceType::Chat]
            .into_iter()
            .filter(|s| self.source(*s).enabled)
            .collect()
    }
}

/// Provider name used for observer keys and env prefixes.
pub fn provider_label(source: SourceType) -> &'static str {
    match source {
        SourceType::Mail => "gmail",
        SourceType::CodeReview => "github",
        SourceType::Chat => "slack",
    }
}

pub fn parse_source(name: &str) -> Option<SourceType> {
    match name.trim().to_ascii_lowercase().as_str() {
        "gmail" | "mail" => Some(SourceType::Mail),
        "github" | "code_review" => Some(SourceType::CodeReview),
        "slack" | "chat" => Some(SourceType::Chat),
        _ => None,
    }
}

fn default_app_dir(home: Option<String>) -> PathBuf {
    match home {
        Some(h) => PathBuf::from(h).join(".config").join("observers"),
        None => PathBuf::from(".observers"),
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(
                target: "observers",
                var = key,
                value = %raw,
                "ignoring non-numeric value"
            );
            None
        }
    }
}
