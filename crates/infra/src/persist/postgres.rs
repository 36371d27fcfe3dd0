//! Postgres-backed document store.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     id TEXT PRIMARY KEY
//!     -- application columns
//! );
//!
//! CREATE TABLE document_enrichments (
//!     id           UUID PRIMARY KEY,
//!     document_id  TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
//!     field        TEXT NOT NULL,
//!     kind         TEXT NOT NULL,
//!     tags         JSONB NOT NULL,
//!     labels       JSONB NOT NULL,
//!     raw_payload  TEXT NOT NULL,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | Situation | DownstreamError |
//! |-----------|-----------------|
//! | `documents` row missing (or deleted mid-transaction) | `NotFound` |
//! | Empty field/names, foreign key violation (`23503`) | `Validation` |
//! | Pool closed, network errors, anything else | `Unavailable` |
//!
//! ## Thread Safety
//!
//! The store holds a runtime [`Handle`] and blocks on it, so `save` may be
//! called from plain worker threads but never from inside an async task.

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Handle;
use tracing::{debug, instrument};
use uuid::Uuid;

use jobrelay_core::{DecodedResult, TargetRef};

use super::{DownstreamError, DownstreamStore, validate};

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    runtime: Handle,
}

fn map_sqlx_error(e: sqlx::Error) -> DownstreamError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
            DownstreamError::Validation(db.message().to_string())
        }
        _ => DownstreamError::Unavailable(e.to_string()),
    }
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    /// Build a lazily-connecting pool for `database_url`.
    pub fn connect_lazy(database_url: &str, runtime: Handle) -> Result<Self, DownstreamError> {
        let pool = {
            let _guard = runtime.enter();
            PgPoolOptions::new()
                .max_connections(8)
                .connect_lazy(database_url)
                .map_err(map_sqlx_error)?
        };
        Ok(Self::new(pool, runtime))
    }
}

impl DownstreamStore for PostgresDocumentStore {
    #[instrument(skip(self, result), fields(document = %target, field = %result.field))]
    fn save(&self, target: &TargetRef, result: &DecodedResult) -> Result<(), DownstreamError> {
        validate(result)?;

        let tags = serde_json::to_value(&result.tags)
            .map_err(|e| DownstreamError::Validation(e.to_string()))?;
        let labels = serde_json::to_value(&result.labels)
            .map_err(|e| DownstreamError::Validation(e.to_string()))?;

        let pool = self.pool.clone();

        self.runtime.block_on(async move {
            let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

            // Lock the document so a concurrent delete waits for this write.
            let exists = sqlx::query_scalar::<_, i32>(
                "SELECT 1 FROM documents WHERE id = $1 FOR UPDATE",
            )
            .bind(target.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if exists.is_none() {
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(DownstreamError::NotFound(target.clone()));
            }

            sqlx::query(
                r#"
                INSERT INTO document_enrichments (
                    id,
                    document_id,
                    field,
                    kind,
                    tags,
                    labels,
                    raw_payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(target.as_str())
            .bind(&result.field)
            .bind(result.kind.as_str())
            .bind(tags)
            .bind(labels)
            .bind(result.raw_payload.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_sqlx_error)?;

            debug!("enrichment row committed");
            Ok(())
        })
    }
}
