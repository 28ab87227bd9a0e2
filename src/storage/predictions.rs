//! Predictions

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::tables::{upsert_sql, PREDICTIONS};
use super::{from_json, Database};
use crate::error::Result;
use crate::types::{Prediction, Region, Station};

fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    let region: String = row.try_get("region")?;
    let slug: String = row.try_get("station")?;
    let ranked: String = row.try_get("ranked")?;
    Ok(Prediction {
        prediction_date: row.try_get("prediction_date")?,
        station: Station::from_slug(region.parse::<Region>()?, &slug),
        ranked: from_json(&ranked)?,
        model_version: row.try_get("model_version")?,
    })
}

impl Database {
    /// Insert or replace the prediction of a station and date
    pub async fn save_prediction(&self, prediction: &Prediction) -> Result<()> {
        let sql = upsert_sql(
            &PREDICTIONS,
            &[
                "prediction_date",
                "region",
                "station",
                "ranked",
                "model_version",
                "created_at",
            ],
        );
        sqlx::query(&sql)
            .bind(prediction.prediction_date)
            .bind(prediction.station.region.as_str())
            .bind(prediction.station.slug())
            .bind(serde_json::to_string(&prediction.ranked)?)
            .bind(&prediction.model_version)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn prediction(&self, station: &Station, date: NaiveDate) -> Result<Option<Prediction>> {
        let row = sqlx::query(
            "SELECT * FROM predictions WHERE region = ? AND station = ? AND prediction_date = ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(prediction_from_row).transpose()
    }

    pub async fn predictions_on(&self, date: NaiveDate) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions WHERE prediction_date = ? ORDER BY region, station",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(prediction_from_row).collect()
    }

    /// Predictions up to `until` with no settlement yet, oldest first
    pub async fn unsettled_predictions(&self, until: NaiveDate) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT p.* FROM predictions p \
             LEFT JOIN settlements s ON s.prediction_date = p.prediction_date \
                AND s.region = p.region AND s.station = p.station \
             WHERE s.id IS NULL AND p.prediction_date <= ? \
             ORDER BY p.prediction_date, p.region, p.station",
        )
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(prediction_from_row).collect()
    }

    /// Model versions used by predictions on or after `since`
    pub async fn versions_used_since(&self, since: NaiveDate) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT model_version FROM predictions WHERE prediction_date >= ?",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }
}
