use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::info;

/// Process-wide document-store pool. Initialized once from the credential
/// fetched on the first invocation; later credentials are ignored.
static POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Credential blob stored in the secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentStoreCredential {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id          UUID PRIMARY KEY,
        collection  TEXT NOT NULL,
        data        JSONB NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection, created_at)",
    // Closes the check-then-write race on the natural key.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS documents_collection_name_key
        ON documents (collection, (data->>'name'))
        WHERE data ? 'name'
    "#,
];

/// Returns the shared pool, creating it (and the schema) on first use.
pub async fn ensure_initialized(credential: &DocumentStoreCredential) -> Result<PgPool, sqlx::Error> {
    let pool = POOL
        .get_or_try_init(|| async {
            info!("Connecting to PostgreSQL...");
            let pool = PgPoolOptions::new()
                .max_connections(credential.max_connections)
                .connect(&credential.database_url)
                .await?;
            for statement in SCHEMA {
                sqlx::query(statement).execute(&pool).await?;
            }
            info!("PostgreSQL connection pool established");
            Ok::<_, sqlx::Error>(pool)
        })
        .await?;
    Ok(pool.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_defaults_pool_size() {
        let credential: DocumentStoreCredential =
            serde_json::from_str(r#"{"database_url":"postgres://localhost/kiln"}"#).unwrap();
        assert_eq!(credential.max_connections, 10);
    }

    #[test]
    fn test_credential_requires_database_url() {
        let result: Result<DocumentStoreCredential, _> =
            serde_json::from_str(r#"{"max_connections":4}"#);
        assert!(result.is_err());
    }
}
