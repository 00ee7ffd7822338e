//! Document store: named collections of JSON records with auto-generated ids.
//!
//! Postgres-backed (`documents` table, JSONB payload). No transactions are
//! used by callers: duplicate suppression is check-then-write, backed by a
//! unique index on `(collection, data->>'name')`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DocumentStoreCredential};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A record with the same natural key already exists in the collection.
    #[error("a document named '{name}' already exists in '{collection}'")]
    Conflict { collection: String, name: String },
}

#[derive(Debug, Clone, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub data: Value,
}

impl Document {
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Equality lookup on a top-level string field.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocumentError>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, DocumentError>;

    /// Inserts a record under a fresh id.
    async fn add(&self, collection: &str, record: Map<String, Value>) -> Result<Uuid, DocumentError>;

    /// Shallow-merges `fields` into the document, creating it if absent.
    async fn set_merge(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), DocumentError>;

    /// Writes `record` under `id`, replacing any previous content.
    async fn set(
        &self,
        collection: &str,
        id: Uuid,
        record: Map<String, Value>,
    ) -> Result<(), DocumentError>;

    /// Lists up to `limit` documents in insertion order.
    async fn list(&self, collection: &str, limit: i64) -> Result<Vec<Document>, DocumentError>;
}

/// Attaches to the document store named by a fetched credential.
#[async_trait]
pub trait DocumentStoreConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &DocumentStoreCredential,
    ) -> Result<Arc<dyn DocumentStore>, DocumentError>;
}

/// Connects through the process-wide Postgres pool.
pub struct PgConnector;

#[async_trait]
impl DocumentStoreConnector for PgConnector {
    async fn connect(
        &self,
        credential: &DocumentStoreCredential,
    ) -> Result<Arc<dyn DocumentStore>, DocumentError> {
        let pool = db::ensure_initialized(credential).await?;
        Ok(Arc::new(PgDocumentStore::new(pool)))
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocumentError> {
        Ok(sqlx::query_as::<_, Document>(
            "SELECT id, data FROM documents WHERE collection = $1 AND data->>$2 = $3",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, DocumentError> {
        Ok(sqlx::query_as::<_, Document>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn add(&self, collection: &str, record: Map<String, Value>) -> Result<Uuid, DocumentError> {
        let id = Uuid::new_v4();
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let result = sqlx::query("INSERT INTO documents (id, collection, data) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(collection)
            .bind(Value::Object(record))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DocumentError::Conflict {
                    collection: collection.to_string(),
                    name,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), DocumentError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET data = documents.data || EXCLUDED.data
            "#,
        )
        .bind(id)
        .bind(collection)
        .bind(Value::Object(fields))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set(
        &self,
        collection: &str,
        id: Uuid,
        record: Map<String, Value>,
    ) -> Result<(), DocumentError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(id)
        .bind(collection)
        .bind(Value::Object(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, collection: &str, limit: i64) -> Result<Vec<Document>, DocumentError> {
        Ok(sqlx::query_as::<_, Document>(
            "SELECT id, data FROM documents WHERE collection = $1 ORDER BY created_at LIMIT $2",
        )
        .bind(collection)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
