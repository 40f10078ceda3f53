//! Resource persistence.
//!
//! Every backend implements [`ResourceStore`] and is interchangeable behind an
//! `Arc<dyn ResourceStore>`:
//!
//! - `sql`: hand-built parameterized SQL against Postgres
//! - `builder`: the same table through sqlx's typed `QueryBuilder`
//! - `file`: append-only JSON Lines file, filtered in memory
//! - `memory`: process-local map, for development and tests
//!
//! Both Postgres backends rely on the `(key, language_code)` primary key for
//! uniqueness. They still check for existing pairs before inserting so callers get
//! a precise count, but that check and the insert are not atomic: a concurrent
//! writer that wins the race surfaces as [`StoreError::Conflict`].

pub mod builder;
pub mod file;
pub mod memory;
pub mod sql;

use crate::config::{Config, PersistenceBackend};
use crate::models::{LanguageSummary, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

pub use builder::QueryBuilderStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Postgres allows at most 65535 bind parameters per statement; three per row.
pub(crate) const INSERT_CHUNK_ROWS: usize = 1000;

pub(crate) const CREATE_RESOURCES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS resources (
        key TEXT NOT NULL,
        language_code TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (key, language_code)
    )
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to prepare storage {target}: {reason}")]
    Init { target: String, reason: String },

    #[error("no resources to add")]
    NoResources,

    #[error("no filters defined")]
    NoFilter,

    #[error("{count} of the resources you are trying to add already exist")]
    AlreadyExists { count: usize },

    #[error("resource ({key}, {language_code}) appears more than once in the request")]
    DuplicateInput { key: String, language_code: String },

    #[error("a resource with the same key and language code was written concurrently")]
    Conflict,

    #[error("{operation} is not implemented by the {backend} store")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("malformed record on line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(err),
        }
    }
}

impl StoreError {
    pub(crate) fn duplicate_input(key: &str, language_code: &str) -> Self {
        StoreError::DuplicateInput {
            key: key.to_string(),
            language_code: language_code.to_string(),
        }
    }
}

/// Persistence contract shared by all backends.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Idempotently create the underlying table or file
    async fn init(&self) -> Result<(), StoreError>;

    async fn get_by_language(&self, language_code: &str) -> Result<Vec<Resource>, StoreError>;

    async fn get_by_key(&self, key: &str) -> Result<Vec<Resource>, StoreError>;

    /// Insert new resources. Fails without writing anything if the input is empty,
    /// repeats a pair, or any pair already exists.
    async fn add_resources(&self, resources: &[Resource]) -> Result<(), StoreError>;

    /// Insert or replace by (key, language code); returns rows written.
    async fn upsert_resources(&self, resources: &[Resource]) -> Result<u64, StoreError>;

    /// Replace `text` for existing pairs; returns rows changed. Missing pairs
    /// change nothing and are not an error.
    async fn update_resource_values(&self, resources: &[Resource]) -> Result<u64, StoreError>;

    async fn remove_resources(&self, key: &str, language_code: &str) -> Result<u64, StoreError>;

    async fn existing_language_codes(&self) -> Result<Vec<LanguageSummary>, StoreError>;
}

/// Build the store selected by configuration. Postgres backends need `pool`.
pub fn from_config(config: &Config, pool: Option<PgPool>) -> Result<Arc<dyn ResourceStore>> {
    let store: Arc<dyn ResourceStore> = match &config.persistence {
        PersistenceBackend::File { path } => Arc::new(FileStore::new(path)),
        PersistenceBackend::Memory => Arc::new(MemoryStore::new()),
        PersistenceBackend::Sql => Arc::new(SqlStore::new(
            pool.context("postgres persistence requires a database pool")?,
        )),
        PersistenceBackend::QueryBuilder => Arc::new(QueryBuilderStore::new(
            pool.context("builder persistence requires a database pool")?,
        )),
    };
    Ok(store)
}
