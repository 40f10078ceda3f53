use crate::translation::{fake::DEFAULT_FAKE_BATCH_LIMIT, google::DEFAULT_API_URL};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where resources are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceBackend {
    /// Append-only JSON Lines file
    File { path: PathBuf },
    Memory,
    /// Postgres with hand-built SQL
    Sql,
    /// Postgres through sqlx's query builder
    QueryBuilder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslatorKind {
    Google { api_key: String, api_url: String },
    Fake { batch_limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueKind {
    /// In-process channel; jobs do not survive a restart
    Memory,
    /// Table-backed queue shared by every process pointing at the same database
    Postgres { name: String, poll_interval: Duration },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub port: u16,

    /// Shared key required in `X-API-Key` when set
    pub api_key: Option<String>,

    // Storage
    pub persistence: PersistenceBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Translation
    pub translator: TranslatorKind,

    // Queue
    pub queue: QueueKind,

    // Job bounds
    pub translate_timeout: Option<Duration>,
    pub storage_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let persistence = match env_or("PERSISTENCE", "file").as_str() {
            "file" => PersistenceBackend::File {
                path: PathBuf::from(env_or("RESOURCES_FILE", "resources.jsonl")),
            },
            "memory" => PersistenceBackend::Memory,
            "postgres" | "sql" => PersistenceBackend::Sql,
            "builder" => PersistenceBackend::QueryBuilder,
            other => bail!(
                "PERSISTENCE must be one of file, memory, postgres, builder (got '{}')",
                other
            ),
        };

        let translator = match env_or("TRANSLATOR", "fake").as_str() {
            "google" => TranslatorKind::Google {
                api_key: std::env::var("GOOGLE_API_KEY")
                    .context("GOOGLE_API_KEY not set (required when TRANSLATOR=google)")?,
                api_url: env_or("GOOGLE_TRANSLATE_URL", DEFAULT_API_URL),
            },
            "fake" => TranslatorKind::Fake {
                batch_limit: parse_env("FAKE_BATCH_LIMIT", DEFAULT_FAKE_BATCH_LIMIT)?,
            },
            other => bail!("TRANSLATOR must be one of google, fake (got '{}')", other),
        };

        let queue = match env_or("QUEUE", "memory").as_str() {
            "memory" => QueueKind::Memory,
            "postgres" => QueueKind::Postgres {
                name: env_or("QUEUE_NAME", "translations"),
                poll_interval: Duration::from_millis(parse_env("QUEUE_POLL_INTERVAL_MS", 1000)?),
            },
            other => bail!("QUEUE must be one of memory, postgres (got '{}')", other),
        };

        let config = Self {
            environment: env_or("ENVIRONMENT", "development"),
            port: parse_env("PORT", 3000)?,
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            persistence,
            database_url: std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            translator,
            queue,
            translate_timeout: optional_secs("TRANSLATE_TIMEOUT_SECS")?,
            storage_timeout: optional_secs("STORAGE_TIMEOUT_SECS")?,
        };

        if config.requires_database() && config.database_url.is_none() {
            bail!("DATABASE_URL not set (required by Postgres persistence or queue)");
        }

        // A claimed queue message pins one connection while its handler runs
        if matches!(config.queue, QueueKind::Postgres { .. })
            && config.database_max_connections < 2
        {
            bail!(
                "DATABASE_MAX_CONNECTIONS must be at least 2 with QUEUE=postgres (got {})",
                config.database_max_connections
            );
        }
        if config.requires_database() && config.database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        Ok(config)
    }

    /// Whether any configured component needs a Postgres pool
    pub fn requires_database(&self) -> bool {
        matches!(
            self.persistence,
            PersistenceBackend::Sql | PersistenceBackend::QueryBuilder
        ) || matches!(self.queue, QueueKind::Postgres { .. })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, value)),
        Err(_) => Ok(default),
    }
}

fn optional_secs(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            let secs: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("{} has an invalid value '{}'", name, value))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ENVIRONMENT",
        "PORT",
        "API_KEY",
        "PERSISTENCE",
        "RESOURCES_FILE",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "TRANSLATOR",
        "GOOGLE_API_KEY",
        "GOOGLE_TRANSLATE_URL",
        "FAKE_BATCH_LIMIT",
        "QUEUE",
        "QUEUE_NAME",
        "QUEUE_POLL_INTERVAL_MS",
        "TRANSLATE_TIMEOUT_SECS",
        "STORAGE_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    // ==================== Defaults ====================

    #[test]
    #[serial]
    fn test_defaults_with_empty_environment() {
        clear_env();
        let config = Config::from_env().expect("Should load defaults");

        assert_eq!(config.environment, "development");
        assert_eq!(config.port, 3000);
        assert_eq!(config.api_key, None);
        assert_eq!(
            config.persistence,
            PersistenceBackend::File {
                path: PathBuf::from("resources.jsonl")
            }
        );
        assert_eq!(config.translator, TranslatorKind::Fake { batch_limit: 5 });
        assert_eq!(config.queue, QueueKind::Memory);
        assert_eq!(config.database_max_connections, 10);
        assert!(config.translate_timeout.is_none());
        assert!(!config.requires_database());
    }

    // ==================== Backend Selection ====================

    #[test]
    #[serial]
    fn test_postgres_persistence_requires_database_url() {
        clear_env();
        std::env::set_var("PERSISTENCE", "postgres");

        let err = Config::from_env().expect_err("Should require DATABASE_URL");
        assert!(err.to_string().contains("DATABASE_URL"));

        std::env::set_var("DATABASE_URL", "postgres://localhost/resources");
        let config = Config::from_env().expect("Should load");
        assert_eq!(config.persistence, PersistenceBackend::Sql);
        assert!(config.requires_database());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_google_translator_requires_api_key() {
        clear_env();
        std::env::set_var("TRANSLATOR", "google");
        assert!(Config::from_env().is_err());

        std::env::set_var("GOOGLE_API_KEY", "g-key");
        let config = Config::from_env().expect("Should load");
        assert_eq!(
            config.translator,
            TranslatorKind::Google {
                api_key: "g-key".to_string(),
                api_url: DEFAULT_API_URL.to_string(),
            }
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_postgres_queue_settings() {
        clear_env();
        std::env::set_var("QUEUE", "postgres");
        std::env::set_var("QUEUE_NAME", "jobs");
        std::env::set_var("QUEUE_POLL_INTERVAL_MS", "250");
        std::env::set_var("DATABASE_URL", "postgres://localhost/resources");

        let config = Config::from_env().expect("Should load");
        assert_eq!(
            config.queue,
            QueueKind::Postgres {
                name: "jobs".to_string(),
                poll_interval: Duration::from_millis(250),
            }
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_postgres_queue_needs_spare_connection() {
        clear_env();
        std::env::set_var("QUEUE", "postgres");
        std::env::set_var("DATABASE_URL", "postgres://localhost/resources");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "1");

        let err = Config::from_env().expect_err("Should reject a single connection");
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));

        std::env::set_var("DATABASE_MAX_CONNECTIONS", "2");
        let config = Config::from_env().expect("Should load");
        assert_eq!(config.database_max_connections, 2);

        std::env::set_var("QUEUE", "memory");
        std::env::set_var("PERSISTENCE", "postgres");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "1");
        let config = Config::from_env().expect("Should allow one connection without the queue");
        assert_eq!(config.database_max_connections, 1);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_rejected() {
        clear_env();
        std::env::set_var("PERSISTENCE", "mongo");

        let err = Config::from_env().expect_err("Should reject unknown backend");
        assert!(err.to_string().contains("mongo"));
        clear_env();
    }

    // ==================== Parsing ====================

    #[test]
    #[serial]
    fn test_invalid_number_is_an_error() {
        clear_env();
        std::env::set_var("PORT", "eighty");

        let err = Config::from_env().expect_err("Should reject invalid port");
        assert!(err.to_string().contains("PORT"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_timeouts_and_empty_api_key() {
        clear_env();
        std::env::set_var("TRANSLATE_TIMEOUT_SECS", "30");
        std::env::set_var("STORAGE_TIMEOUT_SECS", "");
        std::env::set_var("API_KEY", "");

        let config = Config::from_env().expect("Should load");
        assert_eq!(config.translate_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.storage_timeout, None);
        assert_eq!(config.api_key, None);
        clear_env();
    }
}
