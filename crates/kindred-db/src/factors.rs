//! Confidence factor repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use kindred_core::{new_v7, ConfidenceFactor, Error, FactorRepository, FactorType, Result};

use crate::identities;

const FACTOR_COLUMNS: &str = "id, identity_id, factor_type, value, evidence, computed_at";

fn factor_from_row(row: &PgRow) -> Result<ConfidenceFactor> {
    Ok(ConfidenceFactor {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        factor_type: row.get::<String, _>("factor_type").parse()?,
        value: row.get("value"),
        evidence: row.get("evidence"),
        computed_at: row.get("computed_at"),
    })
}

/// Upsert a factor on its `(identity, factor_type)` key within a
/// transaction. Recomputation overwrites in place.
pub async fn upsert_tx(
    tx: &mut Transaction<'_, Postgres>,
    identity_id: Uuid,
    factor_type: FactorType,
    value: f32,
    evidence: JsonValue,
) -> Result<ConfidenceFactor> {
    if !(0.0..=100.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "factor value out of range: {value}"
        )));
    }

    let row = sqlx::query(&format!(
        r#"INSERT INTO confidence_factor (id, identity_id, factor_type, value, evidence, computed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (identity_id, factor_type) DO UPDATE SET
            value = EXCLUDED.value,
            evidence = EXCLUDED.evidence,
            computed_at = EXCLUDED.computed_at
        RETURNING {FACTOR_COLUMNS}"#
    ))
    .bind(new_v7())
    .bind(identity_id)
    .bind(factor_type.as_str())
    .bind(value)
    .bind(&evidence)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::Database)?;

    factor_from_row(&row)
}

/// PostgreSQL implementation of FactorRepository.
pub struct PgFactorRepository {
    pool: Pool<Postgres>,
}

impl PgFactorRepository {
    /// Create a new PgFactorRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactorRepository for PgFactorRepository {
    async fn upsert(
        &self,
        identity_id: Uuid,
        factor_type: FactorType,
        value: f32,
        evidence: JsonValue,
    ) -> Result<ConfidenceFactor> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let factor = upsert_tx(&mut tx, identity_id, factor_type, value, evidence).await?;
        // A factor write always refreshes the aggregate.
        identities::recompute_confidence_tx(&mut tx, identity_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(factor)
    }

    async fn list_for_identity(&self, identity_id: Uuid) -> Result<Vec<ConfidenceFactor>> {
        let rows = sqlx::query(&format!(
            "SELECT {FACTOR_COLUMNS} FROM confidence_factor \
             WHERE identity_id = $1 ORDER BY factor_type"
        ))
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(factor_from_row).collect()
    }
}
