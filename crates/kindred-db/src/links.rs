//! Identity link repository implementation.
//!
//! The at-most-one-edge-per-unordered-pair invariant is enforced by a
//! `(LEAST, GREATEST)` expression unique index; every write path is an
//! upsert against it, so a duplicate row is unreachable by construction.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use kindred_core::{
    new_v7, AuditAction, Error, IdentityLink, LinkRepository, LinkStatus, RecordLink, Result,
};

use crate::audit;

pub(crate) const LINK_COLUMNS: &str = "id, source_profile_id, target_profile_id, link_type, \
     confidence, evidence, status, verified_by, verified_at, created_at, updated_at";

pub(crate) fn link_from_row(row: &PgRow) -> Result<IdentityLink> {
    Ok(IdentityLink {
        id: row.get("id"),
        source_profile_id: row.get("source_profile_id"),
        target_profile_id: row.get("target_profile_id"),
        link_type: row.get::<String, _>("link_type").parse()?,
        confidence: row.get("confidence"),
        evidence: row.get("evidence"),
        status: row.get::<String, _>("status").parse()?,
        verified_by: row.get("verified_by"),
        verified_at: row.get("verified_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Create or strengthen the unique edge for an unordered profile pair,
/// within a transaction.
///
/// Strengthening rules, applied entirely inside the conditional write so
/// concurrent detections serialize at the storage layer:
/// - a `confirmed` edge is never downgraded in status or confidence;
/// - an incoming `confirmed` write (manual verification) overrides
///   everything, including a reviewer rejection;
/// - otherwise the edge keeps the higher confidence, plus the caller's
///   corroboration bonus when the detecting signal differs;
/// - a `rejected` edge ignores automatic re-detection entirely.
pub async fn record_tx(
    tx: &mut Transaction<'_, Postgres>,
    req: &RecordLink,
) -> Result<IdentityLink> {
    if req.source_profile_id == req.target_profile_id {
        return Err(Error::InvalidInput(
            "cannot link a profile to itself".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&req.confidence) {
        return Err(Error::InvalidInput(format!(
            "link confidence out of range: {}",
            req.confidence
        )));
    }

    let now = Utc::now();

    let row = sqlx::query(&format!(
        r#"INSERT INTO identity_link (
            id, source_profile_id, target_profile_id, link_type, confidence,
            evidence, status, verified_by, verified_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        ON CONFLICT (
            (LEAST(source_profile_id, target_profile_id)),
            (GREATEST(source_profile_id, target_profile_id))
        )
        DO UPDATE SET
            confidence = CASE
                WHEN identity_link.status = 'confirmed' THEN identity_link.confidence
                WHEN EXCLUDED.status = 'confirmed' THEN EXCLUDED.confidence
                ELSE LEAST(100::real,
                    GREATEST(identity_link.confidence, EXCLUDED.confidence)
                    + CASE WHEN identity_link.link_type <> EXCLUDED.link_type
                           THEN $11 ELSE 0::real END)
            END,
            link_type = CASE
                WHEN EXCLUDED.status = 'confirmed' THEN EXCLUDED.link_type
                ELSE identity_link.link_type
            END,
            evidence = identity_link.evidence || EXCLUDED.evidence,
            status = CASE
                WHEN identity_link.status = 'confirmed' OR EXCLUDED.status = 'confirmed'
                    THEN 'confirmed'
                ELSE identity_link.status
            END,
            verified_by = COALESCE(EXCLUDED.verified_by, identity_link.verified_by),
            verified_at = COALESCE(EXCLUDED.verified_at, identity_link.verified_at),
            updated_at = EXCLUDED.updated_at
        WHERE identity_link.status <> 'rejected' OR EXCLUDED.status = 'confirmed'
        RETURNING {LINK_COLUMNS}"#
    ))
    .bind(new_v7())
    .bind(req.source_profile_id)
    .bind(req.target_profile_id)
    .bind(req.link_type.as_str())
    .bind(req.confidence)
    .bind(&req.evidence)
    .bind(req.status.as_str())
    .bind(req.verified_by)
    .bind(req.verified_at)
    .bind(now)
    .bind(req.corroboration_bonus)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    match row {
        Some(row) => link_from_row(&row),
        // The upsert predicate excluded the row: a rejected edge absorbed
        // an automatic re-detection. Return the edge as it stands.
        None => {
            let row = sqlx::query(&format!(
                r#"SELECT {LINK_COLUMNS} FROM identity_link
                WHERE LEAST(source_profile_id, target_profile_id) = LEAST($1, $2)
                  AND GREATEST(source_profile_id, target_profile_id) = GREATEST($1, $2)"#
            ))
            .bind(req.source_profile_id)
            .bind(req.target_profile_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
            link_from_row(&row)
        }
    }
}

/// PostgreSQL implementation of LinkRepository.
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRepository {
    /// Create a new PgLinkRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Fetch the edge for an unordered profile pair, if one exists.
    pub async fn get_for_pair(
        &self,
        profile_a: Uuid,
        profile_b: Uuid,
    ) -> Result<Option<IdentityLink>> {
        let row = sqlx::query(&format!(
            r#"SELECT {LINK_COLUMNS} FROM identity_link
            WHERE LEAST(source_profile_id, target_profile_id) = LEAST($1, $2)
              AND GREATEST(source_profile_id, target_profile_id) = GREATEST($1, $2)"#
        ))
        .bind(profile_a)
        .bind(profile_b)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(link_from_row).transpose()
    }

    /// All links with a given status, newest first. Reviewer tooling pages
    /// through `pending` with this.
    pub async fn list_by_status(&self, status: LinkStatus, limit: i64) -> Result<Vec<IdentityLink>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM identity_link \
             WHERE status = $1 ORDER BY updated_at DESC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(link_from_row).collect()
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn record(&self, req: RecordLink) -> Result<IdentityLink> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let link = record_tx(&mut tx, &req).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(link)
    }

    async fn list_for_profile(&self, profile_id: Uuid) -> Result<Vec<IdentityLink>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {LINK_COLUMNS} FROM identity_link
            WHERE source_profile_id = $1 OR target_profile_id = $1
            ORDER BY updated_at DESC"#
        ))
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(link_from_row).collect()
    }

    async fn reject(&self, link_id: Uuid, actor: Option<Uuid>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM identity_link WHERE id = $1 FOR UPDATE"
        ))
        .bind(link_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("link {link_id}")))?;

        let link = link_from_row(&row)?;
        if link.status != LinkStatus::Pending {
            return Err(Error::Conflict(format!(
                "link {link_id} is {}, not pending",
                link.status.as_str()
            )));
        }

        sqlx::query("UPDATE identity_link SET status = 'rejected', updated_at = $2 WHERE id = $1")
            .bind(link_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        // Audit against the source profile's identity, when it has one.
        let identity_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT identity_id FROM platform_profile WHERE id = $1",
        )
        .bind(link.source_profile_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        audit::append_tx(
            &mut tx,
            identity_id,
            AuditAction::LinkRemoved,
            actor,
            json!({
                "link_id": link_id,
                "link_type": link.link_type.as_str(),
                "outcome": "rejected",
                "source_profile_id": link.source_profile_id,
                "target_profile_id": link.target_profile_id,
            }),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
