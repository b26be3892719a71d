//! Platform profile repository implementation.
//!
//! The `(platform, platform_user_id)` uniqueness invariant lives here as an
//! `ON CONFLICT` upsert: concurrent first-sight upserts for the same key
//! serialize at the storage layer and both observe the single surviving row.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::json;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use kindred_core::{
    new_v7, AuditAction, Error, IdentitySeed, PlatformProfile, ProfileAttrs, ProfileRepository,
    Result,
};

use crate::{audit, identities};

/// Column list shared by every profile SELECT.
pub(crate) const PROFILE_COLUMNS: &str = "id, identity_id, platform, platform_user_id, username, \
     display_name, avatar_url, bio, platform_verified, raw_payload, message_count, \
     first_seen_at, last_seen_at";

pub(crate) fn profile_from_row(row: &PgRow) -> PlatformProfile {
    PlatformProfile {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        platform: row.get("platform"),
        platform_user_id: row.get("platform_user_id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        platform_verified: row.get("platform_verified"),
        raw_payload: row.get("raw_payload"),
        message_count: row.get("message_count"),
        first_seen_at: row.get("first_seen_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}

/// Map a message timestamp to its 0-based hour-of-week bucket
/// (Monday 00:00 UTC is bucket 0).
pub(crate) fn activity_bucket(at: DateTime<Utc>) -> usize {
    (at.weekday().num_days_from_monday() as usize) * 24 + at.hour() as usize
}

/// Upsert a profile within a transaction. Idempotent on the platform key;
/// absent attrs leave existing values untouched.
pub async fn upsert_tx(
    tx: &mut Transaction<'_, Postgres>,
    platform: &str,
    platform_user_id: &str,
    attrs: &ProfileAttrs,
) -> Result<PlatformProfile> {
    let now = Utc::now();

    let row = sqlx::query(&format!(
        r#"INSERT INTO platform_profile (
            id, platform, platform_user_id, username, display_name, avatar_url,
            bio, platform_verified, raw_payload, first_seen_at, last_seen_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, FALSE), COALESCE($9, '{{}}'::jsonb), $10, $10)
        ON CONFLICT (platform, platform_user_id) DO UPDATE SET
            username = COALESCE(EXCLUDED.username, platform_profile.username),
            display_name = COALESCE(EXCLUDED.display_name, platform_profile.display_name),
            avatar_url = COALESCE(EXCLUDED.avatar_url, platform_profile.avatar_url),
            bio = COALESCE(EXCLUDED.bio, platform_profile.bio),
            platform_verified = COALESCE($8, platform_profile.platform_verified),
            raw_payload = COALESCE($9, platform_profile.raw_payload),
            last_seen_at = EXCLUDED.last_seen_at
        RETURNING {PROFILE_COLUMNS}"#
    ))
    .bind(new_v7())
    .bind(platform)
    .bind(platform_user_id)
    .bind(&attrs.username)
    .bind(&attrs.display_name)
    .bind(&attrs.avatar_url)
    .bind(&attrs.bio)
    .bind(attrs.platform_verified)
    .bind(&attrs.raw_payload)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(profile_from_row(&row))
}

/// Fetch a profile by row id within a transaction, locking it against
/// concurrent identity reassignment.
pub async fn get_for_update_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<PlatformProfile>> {
    let row = sqlx::query(&format!(
        "SELECT {PROFILE_COLUMNS} FROM platform_profile WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(row.as_ref().map(profile_from_row))
}

/// Assign (or reassign) a profile to an identity within a transaction.
pub async fn assign_identity_tx(
    tx: &mut Transaction<'_, Postgres>,
    profile_id: Uuid,
    identity_id: Uuid,
) -> Result<()> {
    let result = sqlx::query("UPDATE platform_profile SET identity_id = $1 WHERE id = $2")
        .bind(identity_id)
        .bind(profile_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("profile {profile_id}")));
    }
    Ok(())
}

/// PostgreSQL implementation of ProfileRepository.
pub struct PgProfileRepository {
    pool: Pool<Postgres>,
}

impl PgProfileRepository {
    /// Create a new PgProfileRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Fetch the activity histogram for one profile.
    pub async fn activity_histogram(&self, profile_id: Uuid) -> Result<Vec<i32>> {
        let histogram: Vec<i32> = sqlx::query_scalar(
            "SELECT activity_histogram FROM platform_profile WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("profile {profile_id}")))?;

        Ok(histogram)
    }

    /// Fetch a batch of profiles by id in one round trip.
    pub async fn get_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PlatformProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM platform_profile WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    /// Fetch activity histograms for a batch of profiles in one round trip.
    pub async fn activity_histograms(
        &self,
        profile_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<i32>>> {
        if profile_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT id, activity_histogram FROM platform_profile WHERE id = ANY($1)",
        )
        .bind(profile_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("activity_histogram")))
            .collect())
    }

    /// Recently-active profiles on platforms other than `platform`, most
    /// recent first. Feeds temporal discovery without scanning every row.
    pub async fn recently_active_excluding(
        &self,
        platform: &str,
        min_messages: i64,
        limit: i64,
    ) -> Result<Vec<PlatformProfile>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {PROFILE_COLUMNS} FROM platform_profile
               WHERE platform <> $1 AND message_count >= $2
               ORDER BY last_seen_at DESC
               LIMIT $3"#
        ))
        .bind(platform)
        .bind(min_messages)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(profile_from_row).collect())
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn upsert(
        &self,
        platform: &str,
        platform_user_id: &str,
        attrs: ProfileAttrs,
    ) -> Result<PlatformProfile> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let profile = upsert_tx(&mut tx, platform, platform_user_id, &attrs).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(profile)
    }

    async fn get(
        &self,
        platform: &str,
        platform_user_id: &str,
    ) -> Result<Option<PlatformProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM platform_profile \
             WHERE platform = $1 AND platform_user_id = $2"
        ))
        .bind(platform)
        .bind(platform_user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(profile_from_row))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<PlatformProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM platform_profile WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(profile_from_row))
    }

    async fn record_activity(
        &self,
        platform: &str,
        platform_user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        // Postgres arrays are 1-indexed.
        let bucket = activity_bucket(at) as i32 + 1;

        let result = sqlx::query(
            r#"UPDATE platform_profile SET
                message_count = message_count + 1,
                activity_histogram[$3] = activity_histogram[$3] + 1,
                last_seen_at = GREATEST(last_seen_at, $4)
            WHERE platform = $1 AND platform_user_id = $2"#,
        )
        .bind(platform)
        .bind(platform_user_id)
        .bind(bucket)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ProfileNotFound {
                platform: platform.to_string(),
                platform_user_id: platform_user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn unlink(&self, profile_id: Uuid, actor: Option<Uuid>) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let profile = get_for_update_tx(&mut tx, profile_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {profile_id}")))?;
        let original_identity = profile.identity_id;

        let removed = sqlx::query(
            "DELETE FROM identity_link WHERE source_profile_id = $1 OR target_profile_id = $1",
        )
        .bind(profile_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let fresh = identities::create_tx(&mut tx, IdentitySeed::from_profile(&profile)).await?;
        assign_identity_tx(&mut tx, profile_id, fresh.id).await?;

        audit::append_tx(
            &mut tx,
            original_identity,
            AuditAction::Split,
            actor,
            json!({
                "detached_platform": profile.platform,
                "detached_profile_id": profile_id,
                "new_identity_id": fresh.id,
                "links_removed": removed,
            }),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::info!(
            subsystem = "db",
            component = "profiles",
            op = "unlink",
            profile_id = %profile_id,
            identity_id = %fresh.id,
            row_count = removed,
            "Profile detached into new identity"
        );
        Ok(fresh.id)
    }
}
