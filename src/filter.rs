// src/filter.rs
//! Declarative record filters.
//!
//! A [`Filter`] is a set of named dimensions. Each dimension is either
//! unconstrained or an allow-set of strings. Matching is AND across the
//! constrained dimensions of one filter and OR across a list of filters.
//!
//! What an empty filter list means is decided by each source, not here.

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ObserverError;
use crate::record::ReviewNotification;

/// A record that exposes named values for filter dimensions.
pub trait Filterable {
    /// Value of `dimension` for this record, `None` if the record has none.
    fn dimension(&self, dimension: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Constraint {
    #[default]
    Any,
    OneOf(BTreeSet<String>),
}

impl Constraint {
    pub fn allows(&self, value: Option<&str>) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::OneOf(set) => value.is_some_and(|v| set.contains(v)),
        }
    }
}

/// Store key accepted for compatibility with older filter files. Notifications
/// carry no branch, so it never takes part in matching.
pub const BRANCH: &str = "branch";

/// Loaded from one object of the filter store: every key is a dimension,
/// `null`/absent is unconstrained, an array (or a single string) is an
/// allow-set. `branch` is kept aside, see [`BRANCH`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    dimensions: BTreeMap<String, Constraint>,
    branch: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoreValues {
    One(String),
    Many(Vec<String>),
}

impl StoreValues {
    fn into_vec(self) -> Vec<String> {
        match self {
            StoreValues::One(s) => vec![s],
            StoreValues::Many(v) => v,
        }
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let mut raw = BTreeMap::<String, Option<StoreValues>>::deserialize(d)?;
        let branch = raw
            .remove(BRANCH)
            .flatten()
            .and_then(|v| v.into_vec().into_iter().next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let dimensions = raw
            .into_iter()
            .map(|(name, values)| {
                let c = match values {
                    None => Constraint::Any,
                    Some(v) => Constraint::OneOf(
                        v.into_vec().into_iter().map(|s| s.trim().to_string()).collect(),
                    ),
                };
                (name, c)
            })
            .collect();
        Ok(Self { dimensions, branch })
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain `dimension` to `values`.
    pub fn allow<I, S>(mut self, dimension: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions.insert(
            dimension.to_string(),
            Constraint::OneOf(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn constraint(&self, dimension: &str) -> &Constraint {
        static ANY: Constraint = Constraint::Any;
        self.dimensions.get(dimension).unwrap_or(&ANY)
    }

    /// Reject dimension names the source does not know about.
    pub fn validate(&self, known: &[&str]) -> Result<(), ObserverError> {
        match self
            .dimensions
            .keys()
            .find(|k| !known.contains(&k.as_str()))
        {
            Some(unknown) => Err(ObserverError::Configuration(format!(
                "unknown filter dimension `{unknown}` (expected one of {})",
                known.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// Names of constrained dimensions the record fails.
    pub fn failures<R: Filterable + ?Sized>(&self, record: &R) -> Vec<&str> {
        self.dimensions
            .iter()
            .filter(|(name, c)| !c.allows(record.dimension(name)))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// True when every constrained dimension of `filter` allows the record's value.
pub fn matches<R: Filterable + ?Sized>(record: &R, filter: &Filter) -> bool {
    filter
        .dimensions
        .iter()
        .all(|(name, c)| c.allows(record.dimension(name)))
}

/// Index of the first filter that matches, if any.
pub fn first_match<R: Filterable + ?Sized>(record: &R, filters: &[Filter]) -> Option<usize> {
    filters.iter().position(|f| matches(record, f))
}

pub fn any_matches<R: Filterable + ?Sized>(record: &R, filters: &[Filter]) -> bool {
    first_match(record, filters).is_some()
}

/* ----------------------------
Code review dimensions
---------------------------- */

pub const REPOSITORIES: &str = "repositories";
pub const EVENT_TYPES: &str = "event_types";
pub const REASONS: &str = "reasons";

pub const REVIEW_DIMENSIONS: [&str; 3] = [REPOSITORIES, EVENT_TYPES, REASONS];

impl Filterable for ReviewNotification {
    fn dimension(&self, dimension: &str) -> Option<&str> {
        match dimension {
            REPOSITORIES => self.repository.as_deref(),
            EVENT_TYPES => self.subject_type.as_deref(),
            REASONS => self.reason.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(repo: &str, kind: &str, reason: &str) -> ReviewNotification {
        ReviewNotification {
            id: "1".into(),
            repository: Some(repo.into()),
            subject_type: Some(kind.into()),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    fn pr_mention_filter() -> Filter {
        Filter::new()
            .allow(REPOSITORIES, ["a/b"])
            .allow(EVENT_TYPES, ["PullRequest"])
            .allow(REASONS, ["mention"])
    }

    #[test]
    fn all_dimensions_must_match() {
        let f = pr_mention_filter();
        assert!(matches(&notification("a/b", "PullRequest", "mention"), &f));
        assert!(!matches(&notification("x/y", "PullRequest", "mention"), &f));
        assert!(!matches(&notification("a/b", "Issue", "mention"), &f));
        assert!(!matches(&notification("a/b", "PullRequest", "author"), &f));
    }

    #[test]
    fn unconstrained_dimensions_are_vacuous() {
        let f = Filter::new().allow(REPOSITORIES, ["a/b"]);
        assert!(matches(&notification("a/b", "Issue", "anything"), &f));
        assert!(matches(&notification("a/b", "Release", "author"), &f));
        // A filter with no dimensions matches everything.
        assert!(matches(&notification("q/r", "Issue", "x"), &Filter::new()));
    }

    #[test]
    fn missing_record_value_fails_a_constrained_dimension() {
        let mut n = notification("a/b", "PullRequest", "mention");
        n.reason = None;
        assert!(!matches(&n, &pr_mention_filter()));
        assert_eq!(pr_mention_filter().failures(&n), vec![REASONS]);
    }

    #[test]
    fn or_across_filters_and_first_match_wins() {
        let filters = vec![
            Filter::new().allow(REPOSITORIES, ["x/y"]),
            Filter::new().allow(REASONS, ["mention"]),
            Filter::new().allow(EVENT_TYPES, ["PullRequest"]),
        ];
        let n = notification("a/b", "PullRequest", "mention");
        assert!(any_matches(&n, &filters));
        assert_eq!(first_match(&n, &filters), Some(1));
        assert!(!any_matches(&notification("a/b", "Issue", "author"), &filters));
    }

    #[test]
    fn empty_filter_list_matches_nothing_at_this_layer() {
        assert!(!any_matches(&notification("a/b", "PullRequest", "mention"), &[]));
    }

    #[test]
    fn deserializes_null_as_any_and_empty_array_as_nothing() {
        let f: Filter = serde_json::from_str(
            r#"{"repositories": ["a/b"], "event_types": null, "reasons": []}"#,
        )
        .unwrap();
        assert_eq!(f.constraint(EVENT_TYPES), &Constraint::Any);
        assert!(!matches(&notification("a/b", "PullRequest", "mention"), &f));
    }

    #[test]
    fn validate_rejects_unknown_dimensions() {
        let f: Filter = serde_json::from_str(r#"{"repos": ["a/b"]}"#).unwrap();
        let err = f.validate(&REVIEW_DIMENSIONS).unwrap_err();
        assert!(err.to_string().contains("repos"));
        assert!(pr_mention_filter().validate(&REVIEW_DIMENSIONS).is_ok());
    }
}
