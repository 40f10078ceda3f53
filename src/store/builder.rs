use super::{ResourceStore, StoreError, CREATE_RESOURCES_TABLE, INSERT_CHUNK_ROWS};
use crate::models::{dedupe_last_wins, first_duplicate_pair, LanguageSummary, Resource};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Postgres store expressed through sqlx's typed query builder, with rows
/// mapped straight onto [`Resource`] via `FromRow`.
#[derive(Clone)]
pub struct QueryBuilderStore {
    pool: PgPool,
}

impl QueryBuilderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, column: &str, value: &str) -> Result<Vec<Resource>, StoreError> {
        let mut builder = select_resources();
        builder
            .push(" WHERE ")
            .push(column)
            .push(" = ")
            .push_bind(value)
            .push(" ORDER BY key, language_code");

        Ok(builder
            .build_query_as::<Resource>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_existing(&self, resources: &[Resource]) -> Result<usize, StoreError> {
        let mut builder = existing_pairs_query(resources);
        let existing: Vec<Resource> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(existing.len())
    }

    async fn insert(&self, resources: &[Resource], upsert: bool) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut rows_affected = 0;

        for chunk in resources.chunks(INSERT_CHUNK_ROWS) {
            let mut builder = insert_query(chunk, upsert);
            rows_affected += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(rows_affected)
    }
}

fn select_resources<'a>() -> QueryBuilder<'a, Postgres> {
    QueryBuilder::new("SELECT key, language_code, text FROM resources")
}

/// `WHERE (key, language_code) IN ((..), (..))` over all pairs in `resources`
fn existing_pairs_query(resources: &[Resource]) -> QueryBuilder<'_, Postgres> {
    let mut builder = select_resources();
    builder.push(" WHERE (key, language_code) IN");
    builder.push_tuples(resources, |mut row, resource| {
        row.push_bind(resource.key.as_str())
            .push_bind(resource.language_code.as_str());
    });
    builder
}

fn insert_query(resources: &[Resource], upsert: bool) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new("INSERT INTO resources (key, language_code, text) ");
    builder.push_values(resources, |mut row, resource| {
        row.push_bind(resource.key.as_str())
            .push_bind(resource.language_code.as_str())
            .push_bind(resource.text.as_str());
    });
    if upsert {
        builder.push(" ON CONFLICT (key, language_code) DO UPDATE SET text = EXCLUDED.text");
    }
    builder
}

#[async_trait]
impl ResourceStore for QueryBuilderStore {
    fn backend(&self) -> &'static str {
        "builder"
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
        self.find_where("language_code", language_code).await
    }

    async fn get_by_key(&self, key: &str) -> Result<Vec<Resource>, StoreError> {
        self.find_where("key", key).await
    }

    async fn add_resources(&self, resources: &[Resource]) -> Result<(), StoreError> {
        if resources.is_empty() {
            return Err(StoreError::NoResources);
        }
        if let Some((key, language_code)) = first_duplicate_pair(resources) {
            return Err(StoreError::duplicate_input(key, language_code));
        }

        let mut existing = 0;
        for chunk in resources.chunks(INSERT_CHUNK_ROWS) {
            existing += self.count_existing(chunk).await?;
        }
        if existing > 0 {
            return Err(StoreError::AlreadyExists { count: existing });
        }

        self.insert(resources, false).await?;
        Ok(())
    }

    async fn upsert_resources(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        if resources.is_empty() {
            return Ok(0);
        }
        let resources = dedupe_last_wins(resources);
        self.insert(&resources, true).await
    }

    async fn update_resource_values(&self, resources: &[Resource]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut rows_affected = 0;

        for resource in resources {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("UPDATE resources SET text = ");
            builder
                .push_bind(resource.text.as_str())
                .push(" WHERE key = ")
                .push_bind(resource.key.as_str())
                .push(" AND language_code = ")
                .push_bind(resource.language_code.as_str());
            rows_affected += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(rows_affected)
    }

    async fn remove_resources(&self, key: &str, language_code: &str) -> Result<u64, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("DELETE FROM resources WHERE key = ");
        builder
            .push_bind(key)
            .push(" AND language_code = ")
            .push_bind(language_code);
        Ok(builder.build().execute(&self.pool).await?.rows_affected())
    }

    async fn existing_language_codes(&self) -> Result<Vec<LanguageSummary>, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT language_code, COUNT(*) AS count FROM resources GROUP BY language_code ORDER BY language_code",
        );
        Ok(builder
            .build_query_as::<LanguageSummary>()
            .fetch_all(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_pairs_query_uses_row_comparison() {
        let resources = vec![
            Resource::new("k1", "en", "a"),
            Resource::new("k2", "es", "b"),
        ];
        let builder = existing_pairs_query(&resources);
        let sql = builder.sql().split_whitespace().collect::<Vec<_>>().join(" ");

        assert_eq!(
            sql,
            "SELECT key, language_code, text FROM resources WHERE (key, language_code) IN (($1, $2), ($3, $4))"
        );
    }

    #[test]
    fn test_insert_query_without_conflict_clause() {
        let resources = vec![Resource::new("k1", "en", "a")];
        let builder = insert_query(&resources, false);

        assert_eq!(
            builder.sql(),
            "INSERT INTO resources (key, language_code, text) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_insert_query_with_upsert_clause() {
        let resources = vec![
            Resource::new("k1", "es", "hola"),
            Resource::new("k2", "es", "adiós"),
        ];
        let builder = insert_query(&resources, true);

        assert!(builder.sql().contains("VALUES ($1, $2, $3), ($4, $5, $6)"));
        assert!(builder.sql().ends_with("DO UPDATE SET text = EXCLUDED.text"));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    #[serial_test::serial(postgres)]
    async fn test_round_trip_against_postgres() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("Should connect");
        let store = QueryBuilderStore::new(pool.clone());
        store.init().await.expect("Should init");
        sqlx::query("TRUNCATE resources")
            .execute(&pool)
            .await
            .expect("Should truncate");

        store
            .add_resources(&[
                Resource::new("k1", "en", "a"),
                Resource::new("k2", "en", "b"),
                Resource::new("k1", "es", "c"),
            ])
            .await
            .expect("Should add");

        let en = store.get_by_language("en").await.expect("Should query");
        assert_eq!(en.len(), 2);
        assert!(en.iter().all(|r| r.language_code == "en"));

        let k1 = store.get_by_key("k1").await.expect("Should query");
        assert_eq!(k1.len(), 2);
        assert!(k1.iter().all(|r| r.key == "k1"));

        let duplicate = store.add_resources(&[Resource::new("k2", "en", "x")]).await;
        assert!(matches!(duplicate, Err(StoreError::AlreadyExists { count: 1 })));
    }
}
