//! Identity repository implementation, including the merge operation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use kindred_core::{
    new_v7, AuditAction, Error, Identity, IdentityRepository, IdentitySeed, PlatformProfile,
    Result,
};

use crate::audit;
use crate::profiles::{profile_from_row, PROFILE_COLUMNS};

pub(crate) const IDENTITY_COLUMNS: &str = "id, master_id, primary_platform, display_name, \
     avatar_url, verified, confidence_score, first_seen_at, last_seen_at, created_at, updated_at";

pub(crate) fn identity_from_row(row: &PgRow) -> Identity {
    Identity {
        id: row.get("id"),
        master_id: row.get("master_id"),
        primary_platform: row.get("primary_platform"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        verified: row.get("verified"),
        confidence_score: row.get("confidence_score"),
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Create a new identity within a transaction. The master id is minted from
/// a UUIDv7 so it is globally unique and time-ordered.
pub async fn create_tx(tx: &mut Transaction<'_, Postgres>, seed: IdentitySeed) -> Result<Identity> {
    let now = Utc::now();
    let id = new_v7();
    let master_id = format!("kin_{}", new_v7().simple());

    let row = sqlx::query(&format!(
        r#"INSERT INTO identity (
            id, master_id, primary_platform, display_name, avatar_url, verified,
            confidence_score, first_seen_at, last_seen_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, FALSE, 0, COALESCE($6, $8), COALESCE($7, $8), $8, $8)
        RETURNING {IDENTITY_COLUMNS}"#
    ))
    .bind(id)
    .bind(&master_id)
    .bind(&seed.primary_platform)
    .bind(&seed.display_name)
    .bind(&seed.avatar_url)
    .bind(seed.first_seen_at)
    .bind(seed.last_seen_at)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(identity_from_row(&row))
}

/// Return the identity owning `profile_id`, creating and assigning one
/// seeded from the profile when none exists. Runs under a row lock on the
/// profile so two concurrent callers cannot double-create; the loser
/// observes the winner's assignment.
pub async fn ensure_for_profile_tx(
    tx: &mut Transaction<'_, Postgres>,
    profile_id: Uuid,
) -> Result<Uuid> {
    let profile = crate::profiles::get_for_update_tx(tx, profile_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("profile {profile_id}")))?;

    if let Some(id) = profile.identity_id {
        return Ok(id);
    }

    let fresh = create_tx(tx, IdentitySeed::from_profile(&profile)).await?;
    crate::profiles::assign_identity_tx(tx, profile_id, fresh.id).await?;
    Ok(fresh.id)
}

/// Pool-level wrapper for [`ensure_for_profile_tx`].
pub async fn ensure_for_profile(pool: &Pool<Postgres>, profile_id: Uuid) -> Result<Uuid> {
    let mut tx = pool.begin().await.map_err(Error::Database)?;
    let id = ensure_for_profile_tx(&mut tx, profile_id).await?;
    tx.commit().await.map_err(Error::Database)?;
    Ok(id)
}

/// Recompute the aggregate confidence score (mean of current factors)
/// within a transaction, persist it, and return it.
pub async fn recompute_confidence_tx(
    tx: &mut Transaction<'_, Postgres>,
    identity_id: Uuid,
) -> Result<f32> {
    let score: Option<f32> = sqlx::query_scalar(
        r#"UPDATE identity SET
            confidence_score = COALESCE(
                (SELECT AVG(value)::real FROM confidence_factor WHERE identity_id = $1), 0),
            updated_at = $2
        WHERE id = $1
        RETURNING confidence_score"#,
    )
    .bind(identity_id)
    .bind(Utc::now())
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    score.ok_or(Error::IdentityNotFound(identity_id))
}

/// Flag an identity as verified (a manual link confirmation exists).
pub async fn mark_verified_tx(tx: &mut Transaction<'_, Postgres>, identity_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE identity SET verified = TRUE, updated_at = $2 WHERE id = $1")
        .bind(identity_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// PostgreSQL implementation of IdentityRepository.
pub struct PgIdentityRepository {
    pool: Pool<Postgres>,
}

impl PgIdentityRepository {
    /// Create a new PgIdentityRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn create(&self, seed: IdentitySeed) -> Result<Identity> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let identity = create_tx(&mut tx, seed).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(identity)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Identity>> {
        let row = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identity WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(identity_from_row))
    }

    async fn get_by_master_id(&self, master_id: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identity WHERE master_id = $1"
        ))
        .bind(master_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(identity_from_row))
    }

    async fn linked_profiles(&self, identity_id: Uuid) -> Result<Vec<PlatformProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM platform_profile \
             WHERE identity_id = $1 ORDER BY first_seen_at"
        ))
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    async fn recompute_confidence(&self, identity_id: Uuid) -> Result<f32> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let score = recompute_confidence_tx(&mut tx, identity_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(score)
    }

    async fn merge(&self, keep: Uuid, merge_away: Uuid, actor: Option<Uuid>) -> Result<Uuid> {
        if keep == merge_away {
            return Err(Error::InvalidInput(
                "cannot merge an identity into itself".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Lock both rows in id order so opposing merges cannot deadlock.
        let rows = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identity WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(vec![keep, merge_away])
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let mut keep_row = None;
        let mut away_row = None;
        for row in &rows {
            let id: Uuid = row.get("id");
            if id == keep {
                keep_row = Some(identity_from_row(row));
            } else if id == merge_away {
                away_row = Some(identity_from_row(row));
            }
        }
        let _keep_identity = keep_row.ok_or(Error::IdentityNotFound(keep))?;
        let away_identity = away_row.ok_or(Error::IdentityNotFound(merge_away))?;

        let profiles_moved = sqlx::query(
            "UPDATE platform_profile SET identity_id = $1 WHERE identity_id = $2",
        )
        .bind(keep)
        .bind(merge_away)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        // Move factors onto keep; last write wins, the recompute below
        // absorbs any staleness.
        sqlx::query(
            r#"INSERT INTO confidence_factor (id, identity_id, factor_type, value, evidence, computed_at)
            SELECT gen_random_uuid(), $1, factor_type, value, evidence, computed_at
            FROM confidence_factor WHERE identity_id = $2
            ON CONFLICT (identity_id, factor_type) DO UPDATE SET
                value = EXCLUDED.value,
                evidence = EXCLUDED.evidence,
                computed_at = EXCLUDED.computed_at"#,
        )
        .bind(keep)
        .bind(merge_away)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM confidence_factor WHERE identity_id = $1")
            .bind(merge_away)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            r#"UPDATE identity SET
                verified = verified OR $2,
                first_seen_at = LEAST(first_seen_at, $3),
                last_seen_at = GREATEST(last_seen_at, $4),
                updated_at = $5
            WHERE id = $1"#,
        )
        .bind(keep)
        .bind(away_identity.verified)
        .bind(away_identity.first_seen_at)
        .bind(away_identity.last_seen_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        audit::append_tx(
            &mut tx,
            Some(keep),
            AuditAction::Merge,
            actor,
            json!({
                "absorbed_identity_id": merge_away,
                "absorbed_master_id": away_identity.master_id,
                "profiles_moved": profiles_moved,
            }),
        )
        .await?;

        // The foreign key from platform_profile guarantees this only
        // succeeds once the identity is actually empty.
        sqlx::query("DELETE FROM identity WHERE id = $1")
            .bind(merge_away)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    Error::IntegrityViolation(format!(
                        "identity {merge_away} still owns rows after merge reassignment"
                    ))
                }
                other => Error::Database(other),
            })?;

        recompute_confidence_tx(&mut tx, keep).await?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::info!(
            subsystem = "db",
            component = "identities",
            op = "merge",
            identity_id = %keep,
            row_count = profiles_moved,
            "Merged identity absorbed"
        );
        Ok(keep)
    }
}
