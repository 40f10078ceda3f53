use super::{ResourceStore, StoreError};
use crate::models::{
    first_duplicate_pair, matches_any, LanguageSummary, Resource, ResourceFilter,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::info;

/// Append-only JSON Lines store.
///
/// Every read scans the whole file; every read and write holds the same lock, so
/// operations on one instance are fully serialized. In-place edits are not
/// supported: update and remove return [`StoreError::NotImplemented`].
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and filter all records. Caller must hold the lock.
    async fn scan(&self, filters: &[ResourceFilter]) -> Result<Vec<Resource>, StoreError> {
        let contents = fs::read_to_string(&self.path).await?;
        let mut results = Vec::new();

        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let resource: Resource =
                serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                    line: index + 1,
                    source,
                })?;
            if matches_any(&resource, filters) {
                results.push(resource);
            }
        }

        Ok(results)
    }

    /// Append records, one JSON object per line. Caller must hold the lock.
    async fn append(&self, resources: &[Resource]) -> Result<(), StoreError> {
        let mut buffer = Vec::new();
        for resource in resources {
            serde_json::to_writer(&mut buffer, resource)?;
            buffer.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Never glue a record onto an unterminated last line
        if file.metadata().await?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                buffer.insert(0, b'\n');
            }
        }

        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get_resources(&self, filters: &[ResourceFilter]) -> Result<Vec<Resource>, StoreError> {
        let _guard = self.lock.lock().await;
        self.scan(filters).await
    }
}

#[async_trait]
impl ResourceStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn init(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("File '{}' does not exist, creating", self.path.display());
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await
                    .map_err(|e| StoreError::Init {
                        target: self.path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(())
            }
            Err(e) => Err(StoreError::Init {
                target: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn get_by_language(&self, language_code: &str) -> Result<Vec<Resource>, StoreError> {
        self.get_resources(&[ResourceFilter::by_language(language_code)])
            .await
    }

    async fn get_by_key(&self, key: &str) -> Result<Vec<Resource>, StoreError> {
        self.get_resources(&[ResourceFilter::by_key(key)]).await
    }

    async fn add_resources(&self, resources: &[Resource]) -> Result<(), StoreError> {
        if resources.is_empty() {
            return Err(StoreError::NoResources);
        }
        if let Some((key, language_code)) = first_duplicate_pair(resources) {
            return Err(StoreError::duplicate_input(key, language_code));
        }

        let filters: Vec<ResourceFilter> = resources.iter().map(ResourceFilter::pair).collect();

        // Check and append under one lock so concurrent adds cannot both pass the check
        let _guard = self.lock.lock().await;
        let existing = self.scan(&filters).await?;
        if !existing.is_empty() {
            return Err(StoreError::AlreadyExists {
                count: existing.len(),
            });
        }

        self.append(resources).await
    }

    /// Appends only pairs that are not stored yet; existing records are never
    /// rewritten, so the first write for a pair wins.
    async fn upsert_resources(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        if resources.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let stored: HashSet<(String, String)> = self
            .scan(&[ResourceFilter::default()])
            .await?
            .into_iter()
            .map(|r| (r.key, r.language_code))
            .collect();

        let mut seen = HashSet::new();
        let missing: Vec<Resource> = resources
            .iter()
            .filter(|r| {
                let pair = (r.key.clone(), r.language_code.clone());
                !stored.contains(&pair) && seen.insert(pair)
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }
        self.append(&missing).await?;
        Ok(missing.len() as u64)
    }

    async fn update_resource_values(&self, _resources: &[Resource]) -> Result<u64, StoreError> {
        Err(StoreError::NotImplemented {
            backend: self.backend(),
            operation: "update",
        })
    }

    async fn remove_resources(&self, _key: &str, _language_code: &str) -> Result<u64, StoreError> {
        Err(StoreError::NotImplemented {
            backend: self.backend(),
            operation: "remove",
        })
    }

    async fn existing_language_codes(&self) -> Result<Vec<LanguageSummary>, StoreError> {
        let all = self.get_resources(&[ResourceFilter::default()]).await?;

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for resource in all {
            *counts.entry(resource.language_code).or_default() += 1;
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
