//! Link request repository: the durable half of the verification workflow.
//!
//! State machine per row: `pending -> {verified | expired | rejected}`,
//! terminal on any of the latter three. Expiry is a deadline encoded in
//! data; consumers evaluate it lazily, and the reaper methods here exist
//! only to reclaim storage, never for correctness.

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use kindred_core::{new_v7, Error, LinkRequest, RequestStatus, Result};

const REQUEST_COLUMNS: &str = "id, requester_profile_id, target_platform, target_identifier, \
     code, status, created_at, expires_at";

fn request_from_row(row: &PgRow) -> Result<LinkRequest> {
    Ok(LinkRequest {
        id: row.get("id"),
        requester_profile_id: row.get("requester_profile_id"),
        target_platform: row.get("target_platform"),
        target_identifier: row.get("target_identifier"),
        code: row.get("code"),
        status: row.get::<String, _>("status").parse()?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

/// Claim the pending request for `(target_platform, code)` within a
/// transaction, locking the row so exactly one concurrent verifier wins.
/// Returns `None` when no pending request matches (wrong code, or a racing
/// verifier already drove it to a terminal state).
pub async fn claim_pending_tx(
    tx: &mut Transaction<'_, Postgres>,
    target_platform: &str,
    code: &str,
) -> Result<Option<LinkRequest>> {
    let row = sqlx::query(&format!(
        r#"SELECT {REQUEST_COLUMNS} FROM link_request
        WHERE target_platform = $1 AND code = $2 AND status = 'pending'
        FOR UPDATE"#
    ))
    .bind(target_platform)
    .bind(code)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    row.as_ref().map(request_from_row).transpose()
}

/// Transition a claimed request to a terminal status within a transaction.
pub async fn set_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: RequestStatus,
) -> Result<()> {
    sqlx::query("UPDATE link_request SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// PostgreSQL repository for link requests.
pub struct PgLinkRequestRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRequestRepository {
    /// Create a new PgLinkRequestRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Persist a new pending request. The partial unique index on live
    /// `(target_platform, code)` pairs turns a code collision into a
    /// [`Error::Conflict`]; callers regenerate and retry.
    pub async fn create(
        &self,
        requester_profile_id: Uuid,
        target_platform: &str,
        target_identifier: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<LinkRequest> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO link_request (
                id, requester_profile_id, target_platform, target_identifier,
                code, status, created_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING {REQUEST_COLUMNS}"#
        ))
        .bind(new_v7())
        .bind(requester_profile_id)
        .bind(target_platform)
        .bind(target_identifier)
        .bind(code)
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Conflict("verification code collision".to_string())
            }
            other => Error::Database(other),
        })?;

        request_from_row(&row)
    }

    /// Fetch a request by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<LinkRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM link_request WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(request_from_row).transpose()
    }

    /// Requester-initiated cancellation: `pending -> rejected`.
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE link_request SET status = 'rejected' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "link request {id} is not pending"
            )));
        }
        Ok(())
    }

    /// Reaper: transition overdue pending requests to `expired`. Returns
    /// the number of rows transitioned.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE link_request SET status = 'expired' \
             WHERE status = 'pending' AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    /// Reaper: hard-delete terminal requests whose deadline passed before
    /// `cutoff`. Pending rows are never purged.
    pub async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM link_request WHERE status <> 'pending' AND expires_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
