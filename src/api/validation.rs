use crate::models::{language_code_is_valid, Resource};
use serde::Deserialize;

/// All problems found in one request, reported together
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<String>,
}

impl ValidationErrors {
    pub fn add(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.errors
    }
}

/// The single filter accepted by `GET /resources`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    Language(String),
    Key(String),
}

/// Exactly one of `languagecode` and `key` must be given; empty values count as absent.
pub fn validate_search_filter(
    language_code: Option<&str>,
    key: Option<&str>,
) -> Result<SearchFilter, String> {
    let language_code = language_code.filter(|c| !c.is_empty());
    let key = key.filter(|k| !k.is_empty());

    match (language_code, key) {
        (None, None) => Err("filter by 'languagecode' or 'key'".to_string()),
        (Some(_), Some(_)) => Err("you can't use both filters".to_string()),
        (Some(code), None) if !language_code_is_valid(code) => {
            Err("language code must be 2 letters".to_string())
        }
        (Some(code), None) => Ok(SearchFilter::Language(code.to_string())),
        (None, Some(key)) => Ok(SearchFilter::Key(key.to_string())),
    }
}

/// Resource as submitted by a client; missing fields decode as empty so they
/// surface as validation errors rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourcePayload {
    pub key: String,
    pub language_code: String,
    pub text: String,
}

// Many is tried first: a struct with container defaults also accepts a JSON array
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ResourcePayload>),
    One(ResourcePayload),
}

/// Accept either a single resource object or an array of them
pub fn parse_resources(body: &[u8]) -> Result<Vec<ResourcePayload>, String> {
    let payloads = match serde_json::from_slice::<OneOrMany>(body) {
        Ok(OneOrMany::One(payload)) => vec![payload],
        Ok(OneOrMany::Many(payloads)) => payloads,
        Err(_) => return Err("invalid data".to_string()),
    };

    if payloads.is_empty() {
        return Err("no resources found".to_string());
    }
    Ok(payloads)
}

/// Check every payload and convert them, or report every problem at once
pub fn validate_resource_data(
    payloads: Vec<ResourcePayload>,
) -> Result<Vec<Resource>, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let single = payloads.len() == 1;

    for (index, payload) in payloads.iter().enumerate() {
        let at = |message: &str| {
            if single {
                message.to_string()
            } else {
                format!("resource {}: {}", index, message)
            }
        };

        if !language_code_is_valid(&payload.language_code) {
            errors.add(at("language code must be 2 letters"));
        }
        if payload.key.is_empty() {
            errors.add(at("invalid key"));
        }
        if payload.text.is_empty() {
            errors.add(at("invalid text"));
        }
    }

    if errors.has_errors() {
        return Err(errors);
    }

    Ok(payloads
        .into_iter()
        .map(|p| Resource::new(p.key, p.language_code, p.text))
        .collect())
}
