//! Feature sets

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::tables::{upsert_sql, FEATURES};
use super::Database;
use crate::error::Result;
use crate::ml::{validate_feature_set, FeatureRow};
use crate::types::{Pair, Station, WeekdayScope};

const COLUMNS: &[&str] = &[
    "target_date",
    "region",
    "station",
    "pair",
    "freq_30",
    "freq_60",
    "freq_100",
    "gap_since_last",
    "avg_gap",
    "std_gap",
    "gap_zscore",
    "is_even",
    "is_high",
    "sum_digits",
    "day_of_week",
    "label",
];

fn feature_from_row(station: &Station, row: &SqliteRow) -> Result<FeatureRow> {
    let pair: i64 = row.try_get("pair")?;
    let gap: i64 = row.try_get("gap_since_last")?;
    let sum_digits: i64 = row.try_get("sum_digits")?;
    let day_of_week: i64 = row.try_get("day_of_week")?;
    Ok(FeatureRow {
        station: station.clone(),
        target_date: row.try_get("target_date")?,
        pair: pair as Pair,
        freq_30: row.try_get("freq_30")?,
        freq_60: row.try_get("freq_60")?,
        freq_100: row.try_get("freq_100")?,
        gap_since_last: gap as u32,
        avg_gap: row.try_get("avg_gap")?,
        std_gap: row.try_get("std_gap")?,
        gap_zscore: row.try_get("gap_zscore")?,
        is_even: row.try_get("is_even")?,
        is_high: row.try_get("is_high")?,
        sum_digits: sum_digits as u8,
        day_of_week: day_of_week as u8,
        label: row.try_get("label")?,
    })
}

impl Database {
    /// Write one complete 100-row table in a single transaction.
    ///
    /// An incomplete table is rejected before anything is written.
    pub async fn save_feature_set(&self, rows: &[FeatureRow]) -> Result<()> {
        validate_feature_set(rows)?;

        let sql = upsert_sql(&FEATURES, COLUMNS);
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&sql)
                .bind(row.target_date)
                .bind(row.station.region.as_str())
                .bind(row.station.slug())
                .bind(row.pair as i64)
                .bind(row.freq_30)
                .bind(row.freq_60)
                .bind(row.freq_100)
                .bind(row.gap_since_last as i64)
                .bind(row.avg_gap)
                .bind(row.std_gap)
                .bind(row.gap_zscore)
                .bind(row.is_even)
                .bind(row.is_high)
                .bind(row.sum_digits as i64)
                .bind(row.day_of_week as i64)
                .bind(row.label)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Stored rows of one station and date, ordered by pair
    pub async fn feature_rows(&self, station: &Station, date: NaiveDate) -> Result<Vec<FeatureRow>> {
        let rows = sqlx::query(
            "SELECT * FROM feature_rows \
             WHERE region = ? AND station = ? AND target_date = ? ORDER BY pair",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| feature_from_row(station, r)).collect()
    }

    pub async fn feature_row_count(&self, station: &Station, date: NaiveDate) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM feature_rows WHERE region = ? AND station = ? AND target_date = ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(date)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Labeled rows usable for training, oldest date first.
    ///
    /// A weekday scope keeps only target dates on that day.
    pub async fn labeled_feature_rows(
        &self,
        station: &Station,
        scope: WeekdayScope,
    ) -> Result<Vec<FeatureRow>> {
        let rows = sqlx::query(
            "SELECT * FROM feature_rows \
             WHERE region = ? AND station = ? AND label IS NOT NULL \
             AND (? IS NULL OR day_of_week = ?) \
             ORDER BY target_date, pair",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(scope.weekday().map(i64::from))
        .bind(scope.weekday().map(i64::from))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| feature_from_row(station, r)).collect()
    }

    /// Distinct labeled target dates after `after` in a scope
    pub async fn labeled_dates_after(
        &self,
        station: &Station,
        scope: WeekdayScope,
        after: NaiveDate,
    ) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(DISTINCT target_date) FROM feature_rows \
             WHERE region = ? AND station = ? AND label IS NOT NULL AND target_date > ? \
             AND (? IS NULL OR day_of_week = ?)",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(after)
        .bind(scope.weekday().map(i64::from))
        .bind(scope.weekday().map(i64::from))
        .fetch_one(&self.pool)
        .await?)
    }
}
