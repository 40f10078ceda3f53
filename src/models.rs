use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single localized string, identified by its key and language code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub key: String,
    pub language_code: String,
    pub text: String,
}

impl Resource {
    pub fn new(
        key: impl Into<String>,
        language_code: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            language_code: language_code.into(),
            text: text.into(),
        }
    }

    /// Whether this resource satisfies the given filter
    pub fn matches(&self, filter: &ResourceFilter) -> bool {
        filter.key.as_deref().map_or(true, |k| k == self.key)
            && filter
                .language_code
                .as_deref()
                .map_or(true, |l| l == self.language_code)
    }
}

/// Number of resources stored for one language code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LanguageSummary {
    pub language_code: String,
    pub count: i64,
}

/// Selects resources by key and/or language code.
///
/// An unset field matches anything. Fields inside one filter are AND'd;
/// a list of filters is OR'd (see [`matches_any`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceFilter {
    pub key: Option<String>,
    pub language_code: Option<String>,
}

impl ResourceFilter {
    pub fn by_key(key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            language_code: None,
        }
    }

    pub fn by_language(language_code: &str) -> Self {
        Self {
            key: None,
            language_code: Some(language_code.to_string()),
        }
    }

    /// Filter matching exactly one (key, language code) pair
    pub fn pair(resource: &Resource) -> Self {
        Self {
            key: Some(resource.key.clone()),
            language_code: Some(resource.language_code.clone()),
        }
    }
}

/// True if the resource matches at least one filter
pub fn matches_any(resource: &Resource, filters: &[ResourceFilter]) -> bool {
    filters.iter().any(|f| resource.matches(f))
}

/// Language codes are exactly two characters (ISO 639-1 style)
pub fn language_code_is_valid(code: &str) -> bool {
    code.chars().count() == 2
}

/// First (key, language code) pair that appears more than once in `resources`
pub fn first_duplicate_pair(resources: &[Resource]) -> Option<(&str, &str)> {
    let mut seen = HashSet::new();
    resources
        .iter()
        .map(|r| (r.key.as_str(), r.language_code.as_str()))
        .find(|pair| !seen.insert(*pair))
}

/// Collapse repeated (key, language code) pairs, keeping the last text for each
/// while preserving first-seen order.
pub fn dedupe_last_wins(resources: &[Resource]) -> Vec<Resource> {
    let mut out: Vec<Resource> = Vec::with_capacity(resources.len());
    for resource in resources {
        match out
            .iter_mut()
            .find(|r| r.key == resource.key && r.language_code == resource.language_code)
        {
            Some(existing) => existing.text = resource.text.clone(),
            None => out.push(resource.clone()),
        }
    }
    out
}
