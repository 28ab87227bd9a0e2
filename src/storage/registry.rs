//! Model registry
//!
//! At most one `active` entry per `(region, station, scope)`, enforced by a
//! partial unique index. Activation deprecates the previous active entry
//! and inserts the new one in the same transaction.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::tables::{upsert_sql, REGISTRY};
use super::Database;
use crate::error::{BotError, Result};
use crate::types::{day_of_week, ModelRegistryEntry, ModelStatus, Region, Station, WeekdayScope};

fn entry_from_row(row: &SqliteRow) -> Result<ModelRegistryEntry> {
    let region: String = row.try_get("region")?;
    let slug: String = row.try_get("station")?;
    let scope: String = row.try_get("scope")?;
    let status: String = row.try_get("status")?;
    Ok(ModelRegistryEntry {
        id: Some(row.try_get("id")?),
        station: Station::from_slug(region.parse::<Region>()?, &slug),
        scope: WeekdayScope::from_key(&scope)?,
        version: row.try_get("version")?,
        status: status.parse::<ModelStatus>()?,
        file_path: row.try_get("file_path")?,
        digest: row.try_get("digest")?,
        backend: row.try_get("backend")?,
        train_start: row.try_get("train_start")?,
        train_end: row.try_get("train_end")?,
        train_periods: row.try_get("train_periods")?,
        row_count: row.try_get("row_count")?,
        metric_auc: row.try_get("metric_auc")?,
        metric_hit_rate: row.try_get("metric_hit_rate")?,
        trained_at: row.try_get("trained_at")?,
    })
}

impl Database {
    /// Register `entry` as the active model of its scope, deprecating the
    /// previous one atomically. Returns the new entry id.
    pub async fn activate_model(&self, entry: &ModelRegistryEntry) -> Result<i64> {
        let sql = upsert_sql(
            &REGISTRY,
            &[
                "region",
                "station",
                "scope",
                "version",
                "status",
                "file_path",
                "digest",
                "backend",
                "train_start",
                "train_end",
                "train_periods",
                "row_count",
                "metric_auc",
                "metric_hit_rate",
                "trained_at",
            ],
        );

        let mut tx = self.pool.begin().await?;
        let deprecated = sqlx::query(
            "UPDATE model_registry SET status = 'deprecated', deprecated_at = ? \
             WHERE region = ? AND station = ? AND scope = ? AND status = 'active'",
        )
        .bind(Utc::now())
        .bind(entry.station.region.as_str())
        .bind(entry.station.slug())
        .bind(entry.scope.as_key())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let id: i64 = sqlx::query_scalar(&format!("{} RETURNING id", sql))
            .bind(entry.station.region.as_str())
            .bind(entry.station.slug())
            .bind(entry.scope.as_key())
            .bind(&entry.version)
            .bind(ModelStatus::Active.as_str())
            .bind(&entry.file_path)
            .bind(&entry.digest)
            .bind(&entry.backend)
            .bind(entry.train_start)
            .bind(entry.train_end)
            .bind(entry.train_periods)
            .bind(entry.row_count)
            .bind(entry.metric_auc)
            .bind(entry.metric_hit_rate)
            .bind(entry.trained_at)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            "📦 Activated {} for {} ({}), deprecated {}",
            entry.version,
            entry.station,
            entry.scope,
            deprecated
        );
        Ok(id)
    }

    /// The active entry of exactly this scope
    pub async fn active_model(
        &self,
        station: &Station,
        scope: WeekdayScope,
    ) -> Result<Option<ModelRegistryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM model_registry \
             WHERE region = ? AND station = ? AND scope = ? AND status = 'active'",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(scope.as_key())
        .fetch_all(&self.pool)
        .await?;

        match rows.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some(entry_from_row(row)?)),
            _ => Err(BotError::Integrity(format!(
                "{} has {} active models for {}",
                station,
                rows.len(),
                scope.as_key()
            ))),
        }
    }

    /// Active model serving `date`: the weekday model when one exists,
    /// otherwise the all-days model
    pub async fn resolve_active_model(
        &self,
        station: &Station,
        date: NaiveDate,
    ) -> Result<Option<ModelRegistryEntry>> {
        let weekday = WeekdayScope::Weekday(day_of_week(date));
        if let Some(entry) = self.active_model(station, weekday).await? {
            return Ok(Some(entry));
        }
        self.active_model(station, WeekdayScope::All).await
    }

    pub async fn active_models(&self) -> Result<Vec<ModelRegistryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM model_registry WHERE status = 'active' ORDER BY region, station, scope",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Every version ever registered for a station and scope
    pub async fn model_versions(&self, station: &Station, scope: WeekdayScope) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT version FROM model_registry WHERE region = ? AND station = ? AND scope = ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(scope.as_key())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn model_history(&self, station: &Station) -> Result<Vec<ModelRegistryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM model_registry WHERE region = ? AND station = ? ORDER BY trained_at DESC",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Deprecated entries retired before `cutoff`
    pub async fn deprecated_models_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ModelRegistryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM model_registry \
             WHERE status = 'deprecated' AND COALESCE(deprecated_at, trained_at) < ? \
             ORDER BY trained_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Remove a deprecated entry. Active entries are never deleted.
    pub async fn delete_model(&self, id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM model_registry WHERE id = ? AND status = 'deprecated'")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
