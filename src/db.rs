use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::models::{PulseModel, SignalKind, SignalRecord};
use crate::store::PulseStore;

/// Shared-backend mode: signals are rows in an append-only table, the model
/// is one upserted row per scope, both scoped by tenant.
pub struct PgStore {
    pool: PgPool,
    tenant: String,
}

impl PgStore {
    pub fn new(pool: PgPool, tenant: impl Into<String>) -> Self {
        Self {
            pool,
            tenant: tenant.into(),
        }
    }
}

/// Create the schema if it does not exist yet. Safe to run repeatedly.
pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("CREATE SCHEMA IF NOT EXISTS town_pulse")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS town_pulse.signals (
            id UUID PRIMARY KEY,
            tenant TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            category TEXT NOT NULL,
            kind TEXT NOT NULL,
            day_of_week SMALLINT NOT NULL,
            hour SMALLINT NOT NULL,
            weight DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS signals_scope_recency \
         ON town_pulse.signals (tenant, scope_key, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS town_pulse.models (
            tenant TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            payload JSONB NOT NULL,
            computed_at TIMESTAMPTZ NOT NULL,
            UNIQUE (tenant, scope_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl PulseStore for PgStore {
    async fn insert_signals(&self, records: &[SignalRecord]) -> anyhow::Result<usize> {
        let mut inserted = 0usize;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO town_pulse.signals
                (id, tenant, scope_key, category, kind, day_of_week, hour, weight, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(record.id)
            .bind(&self.tenant)
            .bind(&record.scope_key)
            .bind(&record.category)
            .bind(record.kind.as_str())
            .bind(record.day_of_week as i16)
            .bind(record.hour as i16)
            .bind(record.weight)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn signals_since(
        &self,
        scope_key: &str,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, scope_key, category, kind, day_of_week, hour, weight, created_at
            FROM town_pulse.signals
            WHERE tenant = $1 AND scope_key = $2 AND created_at >= $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(&self.tenant)
        .bind(scope_key)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut signals = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_signal_row(&row) {
                Some(record) => signals.push(record),
                None => {
                    let id: Option<Uuid> = row.try_get("id").ok();
                    warn!(scope_key, ?id, "skipping malformed signal row");
                }
            }
        }

        Ok(signals)
    }

    async fn upsert_model(&self, scope_key: &str, model: &PulseModel) -> anyhow::Result<()> {
        let payload = serde_json::to_value(model)?;

        sqlx::query(
            r#"
            INSERT INTO town_pulse.models (tenant, scope_key, payload, computed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant, scope_key) DO UPDATE
            SET payload = EXCLUDED.payload, computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(&self.tenant)
        .bind(scope_key)
        .bind(payload)
        .bind(model.computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_model(&self, scope_key: &str) -> anyhow::Result<Option<PulseModel>> {
        let row = sqlx::query(
            "SELECT payload FROM town_pulse.models WHERE tenant = $1 AND scope_key = $2",
        )
        .bind(&self.tenant)
        .bind(scope_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: serde_json::Value = row.try_get("payload")?;
        match serde_json::from_value(payload) {
            Ok(model) => Ok(Some(model)),
            Err(error) => {
                warn!(scope_key, %error, "skipping malformed model row");
                Ok(None)
            }
        }
    }

    async fn active_scopes(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT scope_key, MAX(created_at) AS last_seen
            FROM town_pulse.signals
            WHERE tenant = $1 AND created_at >= $2
            GROUP BY scope_key
            ORDER BY last_seen DESC
            LIMIT $3
            "#,
        )
        .bind(&self.tenant)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get("scope_key"))
            .collect())
    }
}

fn decode_signal_row(row: &sqlx::postgres::PgRow) -> Option<SignalRecord> {
    let kind = SignalKind::parse(row.try_get::<String, _>("kind").ok()?.as_str())?;
    let day_of_week: i16 = row.try_get("day_of_week").ok()?;
    let hour: i16 = row.try_get("hour").ok()?;
    if !(0..=6).contains(&day_of_week) || !(0..=23).contains(&hour) {
        return None;
    }

    Some(SignalRecord {
        id: row.try_get("id").ok()?,
        scope_key: row.try_get("scope_key").ok()?,
        category: row.try_get("category").ok()?,
        kind,
        day_of_week: day_of_week as u8,
        hour: hour as u8,
        weight: row.try_get("weight").ok()?,
        created_at: row.try_get("created_at").ok()?,
    })
}
