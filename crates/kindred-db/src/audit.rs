//! Append-only audit log repository.
//!
//! No update or delete statement for `audit_log` exists anywhere in this
//! codebase; the log is the sole reconstruction mechanism for how an
//! identity arrived at its current shape. An append failure must abort the
//! enclosing operation, which is why every identity-affecting transaction
//! appends through [`append_tx`] before committing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use kindred_core::uuid_utils::v7_floor;
use kindred_core::{new_v7, AuditAction, AuditLogEntry, AuditRepository, Error, Result};

const AUDIT_COLUMNS: &str = "id, identity_id, action, actor_profile_id, details, created_at";

fn entry_from_row(row: &PgRow) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        action: row.get::<String, _>("action").parse()?,
        actor_profile_id: row.get("actor_profile_id"),
        details: row.get("details"),
        created_at: row.get("created_at"),
    })
}

/// Append one audit entry within a transaction.
pub async fn append_tx(
    tx: &mut Transaction<'_, Postgres>,
    identity_id: Option<Uuid>,
    action: AuditAction,
    actor_profile_id: Option<Uuid>,
    details: JsonValue,
) -> Result<AuditLogEntry> {
    let row = sqlx::query(&format!(
        r#"INSERT INTO audit_log (id, identity_id, action, actor_profile_id, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {AUDIT_COLUMNS}"#
    ))
    .bind(new_v7())
    .bind(identity_id)
    .bind(action.as_str())
    .bind(actor_profile_id)
    .bind(&details)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::Database)?;

    entry_from_row(&row)
}

/// PostgreSQL implementation of AuditRepository.
pub struct PgAuditRepository {
    pool: Pool<Postgres>,
}

impl PgAuditRepository {
    /// Create a new PgAuditRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn append(
        &self,
        identity_id: Option<Uuid>,
        action: AuditAction,
        actor_profile_id: Option<Uuid>,
        details: JsonValue,
    ) -> Result<AuditLogEntry> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let entry = append_tx(&mut tx, identity_id, action, actor_profile_id, details).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(entry)
    }

    async fn list_for_identity(
        &self,
        identity_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        // UUIDv7 primary keys are time-ordered, so a time lower bound maps
        // to an id lower bound and pages on the primary key index.
        let floor = since.map(|ts| v7_floor(&ts)).unwrap_or(Uuid::nil());

        let rows = sqlx::query(&format!(
            r#"SELECT {AUDIT_COLUMNS} FROM audit_log
            WHERE identity_id = $1 AND id >= $2
            ORDER BY id
            LIMIT $3"#
        ))
        .bind(identity_id)
        .bind(floor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(entry_from_row).collect()
    }
}
