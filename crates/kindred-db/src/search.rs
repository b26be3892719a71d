//! Fuzzy profile search built on pg_trgm.
//!
//! Trigram similarity makes the matching engine's candidate discovery
//! tractable at scale: instead of scoring every other-platform profile in
//! Rust, a GIN-indexed prefilter narrows the field and the engine computes
//! exact edit-distance scores only on what comes back.

use sqlx::{Pool, Postgres};

use kindred_core::{Error, PlatformProfile, Result};

use crate::escape_like;
use crate::profiles::{profile_from_row, PROFILE_COLUMNS};

/// Trigram-backed profile search.
pub struct PgProfileSearch {
    pool: Pool<Postgres>,
}

impl PgProfileSearch {
    /// Create a new PgProfileSearch with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Candidate profiles on platforms other than `exclude_platform` whose
    /// usernames are plausibly the same handle as `username`.
    ///
    /// The `%` operator uses pg_trgm's similarity threshold (default 0.3);
    /// the two LIKE arms catch containment in either direction, which
    /// trigram similarity underweights for short handles. This is a
    /// prefilter only; callers re-score exactly.
    pub async fn username_candidates(
        &self,
        exclude_platform: &str,
        username: &str,
        limit: i64,
    ) -> Result<Vec<PlatformProfile>> {
        let escaped = escape_like(username);

        let rows = sqlx::query(&format!(
            r#"SELECT {PROFILE_COLUMNS},
                   similarity(lower(username), lower($1)) AS sim
            FROM platform_profile
            WHERE platform <> $2
              AND username IS NOT NULL
              AND (lower(username) % lower($1)
                   OR lower(username) LIKE '%' || lower($3) || '%' ESCAPE '\'
                   OR lower($1) LIKE '%' || lower(username) || '%')
            ORDER BY sim DESC NULLS LAST
            LIMIT $4"#
        ))
        .bind(username)
        .bind(exclude_platform)
        .bind(&escaped)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    /// Free-text search over usernames and display names for the `search`
    /// operation. Ranked by the best trigram similarity of either field.
    pub async fn search_profiles(&self, term: &str, limit: i64) -> Result<Vec<PlatformProfile>> {
        let escaped = escape_like(term);

        let rows = sqlx::query(&format!(
            r#"SELECT {PROFILE_COLUMNS},
                   GREATEST(
                       similarity(lower(COALESCE(username, '')), lower($1)),
                       similarity(lower(COALESCE(display_name, '')), lower($1))
                   ) AS sim
            FROM platform_profile
            WHERE lower(username) % lower($1)
               OR lower(display_name) % lower($1)
               OR lower(username) LIKE '%' || lower($2) || '%' ESCAPE '\'
               OR lower(display_name) LIKE '%' || lower($2) || '%' ESCAPE '\'
            ORDER BY sim DESC NULLS LAST
            LIMIT $3"#
        ))
        .bind(term)
        .bind(&escaped)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(profile_from_row).collect())
    }
}
