//! Room and participant storage: input evidence for the social-overlap
//! signal.
//!
//! Rooms are platform-native; the optional `community` label clusters rooms
//! across platforms into one logical community (a project's Telegram group
//! and its Discord server carry the same label). Overlap is counted in
//! communities, since platform-native room ids cannot collide across
//! platforms.

use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use kindred_core::{new_v7, Error, Result, Room};

const ROOM_COLUMNS: &str = "id, platform, platform_room_id, name, community, created_at";

fn room_from_row(row: &PgRow) -> Room {
    Room {
        id: row.get("id"),
        platform: row.get("platform"),
        platform_room_id: row.get("platform_room_id"),
        name: row.get("name"),
        community: row.get("community"),
        created_at: row.get("created_at"),
    }
}

/// A candidate discovered through social overlap: another profile and the
/// number of logical communities it shares with the subject.
#[derive(Debug, Clone, Copy)]
pub struct SocialOverlap {
    pub profile_id: Uuid,
    pub shared_communities: i64,
}

/// PostgreSQL repository for rooms and participants.
pub struct PgRoomRepository {
    pool: Pool<Postgres>,
}

impl PgRoomRepository {
    /// Create a new PgRoomRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Idempotent upsert on `(platform, platform_room_id)`; name and
    /// community labels refresh on re-observation.
    pub async fn upsert_room(
        &self,
        platform: &str,
        platform_room_id: &str,
        name: Option<&str>,
        community: Option<&str>,
    ) -> Result<Room> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO room (id, platform, platform_room_id, name, community, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (platform, platform_room_id) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, room.name),
                community = COALESCE(EXCLUDED.community, room.community)
            RETURNING {ROOM_COLUMNS}"#
        ))
        .bind(new_v7())
        .bind(platform)
        .bind(platform_room_id)
        .bind(name)
        .bind(community)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(room_from_row(&row))
    }

    /// Record a profile's membership in a room. Idempotent.
    pub async fn add_participant(&self, room_id: Uuid, profile_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO room_participant (room_id, profile_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, profile_id) DO NOTHING"#,
        )
        .bind(room_id)
        .bind(profile_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Number of logical communities two profiles both participate in.
    pub async fn shared_community_count(
        &self,
        profile_a: Uuid,
        profile_b: Uuid,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM (
                SELECT DISTINCT r.community
                FROM room_participant p JOIN room r ON r.id = p.room_id
                WHERE p.profile_id = $1 AND r.community IS NOT NULL
                INTERSECT
                SELECT DISTINCT r.community
                FROM room_participant p JOIN room r ON r.id = p.room_id
                WHERE p.profile_id = $2 AND r.community IS NOT NULL
            ) shared"#,
        )
        .bind(profile_a)
        .bind(profile_b)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count)
    }

    /// Other-platform profiles sharing at least `min_shared` communities
    /// with the subject, strongest overlap first.
    pub async fn social_candidates(
        &self,
        profile_id: Uuid,
        exclude_platform: &str,
        min_shared: i64,
        limit: i64,
    ) -> Result<Vec<SocialOverlap>> {
        let rows = sqlx::query(
            r#"SELECT pb.profile_id, COUNT(DISTINCT ra.community) AS shared
            FROM room_participant pa
            JOIN room ra ON ra.id = pa.room_id AND ra.community IS NOT NULL
            JOIN room rb ON rb.community = ra.community
            JOIN room_participant pb ON pb.room_id = rb.id
            JOIN platform_profile pp ON pp.id = pb.profile_id
            WHERE pa.profile_id = $1
              AND pb.profile_id <> $1
              AND pp.platform <> $2
            GROUP BY pb.profile_id
            HAVING COUNT(DISTINCT ra.community) >= $3
            ORDER BY shared DESC
            LIMIT $4"#,
        )
        .bind(profile_id)
        .bind(exclude_platform)
        .bind(min_shared)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| SocialOverlap {
                profile_id: row.get("profile_id"),
                shared_communities: row.get("shared"),
            })
            .collect())
    }
}
