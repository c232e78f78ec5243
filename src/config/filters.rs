// src/config/filters.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::filter::Filter;

pub const ENV_PATH: &str = "GITHUB_FILTERS_PATH";

/// Load code-review filters from an explicit path. Supports JSON or TOML.
pub fn load_filters_from(path: &Path) -> Result<Vec<Filter>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading filters from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_filters(&content, ext.as_str())
        .with_context(|| format!("parsing filters in {}", path.display()))
}

/// Load filters using settings + fallbacks:
/// 1) `GITHUB_FILTERS_PATH` (must exist)
/// 2) `<app_dir>/github/filters.json`
/// 3) `<app_dir>/github/filters.toml`
///
/// No file at all means no filters, so the code-review source emits nothing.
pub fn load_filters_default(settings: &Settings) -> Result<Vec<Filter>> {
    if let Some(p) = &settings.github_filters_path {
        if p.exists() {
            return load_filters_from(p);
        }
        return Err(anyhow!(
            "{ENV_PATH} points to non-existent path {}",
            p.display()
        ));
    }
    for candidate in fallback_paths(&settings.app_dir) {
        if candidate.exists() {
            return load_filters_from(&candidate);
        }
    }
    tracing::warn!(
        target: "observers",
        dir = %settings.app_dir.join("github").display(),
        "no filters file found"
    );
    Ok(Vec::new())
}

fn fallback_paths(app_dir: &Path) -> [PathBuf; 2] {
    let dir = app_dir.join("github");
    [dir.join("filters.json"), dir.join("filters.toml")]
}

fn parse_filters(s: &str, hint_ext: &str) -> Result<Vec<Filter>> {
    // JSON list unless hinted otherwise or the content has TOML tables.
    let try_toml = hint_ext == "toml" || s.contains("[[filters]]");
    if try_toml {
        return parse_toml(s);
    }
    match parse_json(s) {
        Ok(v) => Ok(v),
        Err(json_err) => parse_toml(s).map_err(|_| json_err),
    }
}

fn parse_toml(s: &str) -> Result<Vec<Filter>> {
    #[derive(serde::Deserialize)]
    struct TomlFilters {
        #[serde(default)]
        filters: Vec<Filter>,
    }
    let v: TomlFilters = toml::from_str(s)?;
    Ok(v.filters)
}

fn parse_json(s: &str) -> Result<Vec<Filter>> {
    Ok(serde_json::from_str(s)?)
}
