use super::{ResourceStore, StoreError, CREATE_RESOURCES_TABLE, INSERT_CHUNK_ROWS};
use crate::models::{
    dedupe_last_wins, first_duplicate_pair, LanguageSummary, Resource, ResourceFilter,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

const SELECT_SINGLE_FILTER: &str = "SELECT key, language_code, text FROM resources WHERE 1=1";

// Filter pairs arrive as one JSON array; NULL fields act as wildcards.
const SELECT_MULTI_FILTER: &str = r#"
    WITH filter_data AS (
        SELECT * FROM jsonb_to_recordset($1::jsonb) AS f(key TEXT, language_code TEXT)
    )
    SELECT DISTINCT r.key, r.language_code, r.text
    FROM resources r
    INNER JOIN filter_data f
        ON (f.key IS NULL OR r.key = f.key)
       AND (f.language_code IS NULL OR r.language_code = f.language_code)
"#;

const ORDER_BY: &str = " ORDER BY key, language_code";

/// Postgres store that writes its SQL by hand, choosing the query shape
/// from whichever filters are present.
#[derive(Clone)]
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_resources(&self, filters: &[ResourceFilter]) -> Result<Vec<Resource>, StoreError> {
        let (query, params) = generate_query_and_parameters(filters)?;
        debug!(filters = filters.len(), "Querying resources");

        let mut statement = sqlx::query_as::<_, Resource>(&query);
        for param in params {
            statement = statement.bind(param);
        }

        Ok(statement.fetch_all(&self.pool).await?)
    }

    async fn insert(&self, resources: &[Resource], upsert: bool) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut rows_affected = 0;

        for chunk in resources.chunks(INSERT_CHUNK_ROWS) {
            let (statement, params) = insert_statement(chunk, upsert);
            let mut query = sqlx::query(&statement);
            for param in params {
                query = query.bind(param);
            }
            rows_affected += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(rows_affected)
    }
}

/// Build the SELECT for `filters`.
///
/// One filter appends an `AND` clause per present field, binding key before
/// language. Several filters are sent as a single JSON parameter and matched with
/// a join, so checking N pairs costs one round trip.
pub(crate) fn generate_query_and_parameters(
    filters: &[ResourceFilter],
) -> Result<(String, Vec<String>), StoreError> {
    match filters {
        [] => Err(StoreError::NoFilter),
        [filter] => {
            let mut query = String::from(SELECT_SINGLE_FILTER);
            let mut params = Vec::new();

            if let Some(key) = &filter.key {
                params.push(key.clone());
                query.push_str(&format!(" AND key = ${}", params.len()));
            }

            if let Some(language_code) = &filter.language_code {
                params.push(language_code.clone());
                query.push_str(&format!(" AND language_code = ${}", params.len()));
            }

            query.push_str(ORDER_BY);
            Ok((query, params))
        }
        _ => {
            let payload = serde_json::to_string(filters)?;
            let query = format!("{}{}", SELECT_MULTI_FILTER.trim_end(), ORDER_BY);
            Ok((query, vec![payload]))
        }
    }
}

/// Multi-row INSERT with positional parameters, three per resource
pub(crate) fn insert_statement(resources: &[Resource], upsert: bool) -> (String, Vec<&str>) {
    const COLUMNS: usize = 3;

    let rows: Vec<String> = (0..resources.len())
        .map(|i| {
            format!(
                "(${}, ${}, ${})",
                i * COLUMNS + 1,
                i * COLUMNS + 2,
                i * COLUMNS + 3
            )
        })
        .collect();

    let mut statement = format!(
        "INSERT INTO resources (key, language_code, text) VALUES {}",
        rows.join(", ")
    );
    if upsert {
        statement.push_str(" ON CONFLICT (key, language_code) DO UPDATE SET text = EXCLUDED.text");
    }

    let params = resources
        .iter()
        .flat_map(|r| [r.key.as_str(), r.language_code.as_str(), r.text.as_str()])
        .collect();

    (statement, params)
}

#[async_trait]
impl ResourceStore for SqlStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_RESOURCES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Init {
                target: "resources table".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
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
        let existing = self.get_resources(&filters).await?;
        if !existing.is_empty() {
            return Err(StoreError::AlreadyExists {
                count: existing.len(),
            });
        }

        self.insert(resources, false).await?;
        Ok(())
    }

    async fn upsert_resources(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        if resources.is_empty() {
            return Ok(0);
        }
        // A single ON CONFLICT statement cannot touch the same row twice
        let resources = dedupe_last_wins(resources);
        self.insert(&resources, true).await
    }

    async fn update_resource_values(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut rows_affected = 0;

        for resource in resources {
            rows_affected += sqlx::query(
                "UPDATE resources SET text = $1 WHERE key = $2 AND language_code = $3",
            )
            .bind(&resource.text)
            .bind(&resource.key)
            .bind(&resource.language_code)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(rows_affected)
    }

    async fn remove_resources(&self, key: &str, language_code: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM resources WHERE key = $1 AND language_code = $2")
            .bind(key)
            .bind(language_code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn existing_language_codes(&self) -> Result<Vec<LanguageSummary>, StoreError> {
        let summaries = sqlx::query_as::<_, LanguageSummary>(
            "SELECT language_code, COUNT(*) AS count FROM resources GROUP BY language_code ORDER BY language_code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }
}
