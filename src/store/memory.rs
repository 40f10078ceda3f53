use super::{ResourceStore, StoreError};
use crate::models::{first_duplicate_pair, LanguageSummary, Resource};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

type Pair = (String, String);

/// Process-local store keyed by (key, language code). Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<Pair, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    async fn select<F>(&self, predicate: F) -> Vec<Resource>
    where
        F: Fn(&Pair) -> bool,
    {
        self.rows
            .read()
            .await
            .iter()
            .filter(|(pair, _)| predicate(pair))
            .map(|((key, language_code), text)| Resource::new(key, language_code, text))
            .collect()
    }
}

fn pair_of(resource: &Resource) -> Pair {
    (resource.key.clone(), resource.language_code.clone())
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_by_language(&self, language_code: &str) -> Result<Vec<Resource>, StoreError> {
        Ok(self.select(|(_, l)| l == language_code).await)
    }

    async fn get_by_key(&self, key: &str) -> Result<Vec<Resource>, StoreError> {
        Ok(self.select(|(k, _)| k == key).await)
    }

    async fn add_resources(&self, resources: &[Resource]) -> Result<(), StoreError> {
        if resources.is_empty() {
            return Err(StoreError::NoResources);
        }
        if let Some((key, language_code)) = first_duplicate_pair(resources) {
            return Err(StoreError::duplicate_input(key, language_code));
        }

        let mut rows = self.rows.write().await;
        let existing = resources
            .iter()
            .filter(|r| rows.contains_key(&pair_of(r)))
            .count();
        if existing > 0 {
            return Err(StoreError::AlreadyExists { count: existing });
        }

        for resource in resources {
            rows.insert(pair_of(resource), resource.text.clone());
        }
        Ok(())
    }

    async fn upsert_resources(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut written = BTreeSet::new();
        for resource in resources {
            let pair = pair_of(resource);
            rows.insert(pair.clone(), resource.text.clone());
            written.insert(pair);
        }
        Ok(written.len() as u64)
    }

    async fn update_resource_values(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for resource in resources {
            if let Some(text) = rows.get_mut(&pair_of(resource)) {
                *text = resource.text.clone();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn remove_resources(&self, key: &str, language_code: &str) -> Result<u64, StoreError> {
        let removed = self
            .rows
            .write()
            .await
            .remove(&(key.to_string(), language_code.to_string()));
        Ok(u64::from(removed.is_some()))
    }

    async fn existing_language_codes(&self) -> Result<Vec<LanguageSummary>, StoreError> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for (_, language_code) in self.rows.read().await.keys() {
            *counts.entry(language_code.clone()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(language_code, count)| LanguageSummary {
                language_code,
                count,
            })
            .collect())
    }
}
