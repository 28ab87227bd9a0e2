//! Settlement records
//!
//! Money columns are stored as decimal text and parsed back exactly.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use super::tables::{upsert_sql, SETTLEMENTS};
use super::{from_json, Database};
use crate::error::{BotError, Result};
use crate::types::{Financials, Region, SettlementRecord, Station};

fn decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str(text)
        .map_err(|e| BotError::Integrity(format!("bad amount {:?}: {}", text, e)))
}

fn settlement_from_row(row: &SqliteRow) -> Result<SettlementRecord> {
    let region: String = row.try_get("region")?;
    let slug: String = row.try_get("station")?;
    let predicted: String = row.try_get("predicted")?;
    let matched: String = row.try_get("matched")?;
    let tail_set: String = row.try_get("tail_set")?;

    let cost: Option<String> = row.try_get("cost")?;
    let revenue: Option<String> = row.try_get("revenue")?;
    let profit: Option<String> = row.try_get("profit")?;
    let details: Option<String> = row.try_get("details")?;
    let financials = match (cost, revenue, profit) {
        (Some(c), Some(r), Some(p)) => Some(Financials {
            cost: decimal(&c)?,
            revenue: decimal(&r)?,
            profit: decimal(&p)?,
            details: details.as_deref().map(from_json).transpose()?.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(SettlementRecord {
        prediction_date: row.try_get("prediction_date")?,
        station: Station::from_slug(region.parse::<Region>()?, &slug),
        predicted: from_json(&predicted)?,
        hit: row.try_get("hit")?,
        matched_pairs: from_json(&matched)?,
        tail_set: from_json(&tail_set)?,
        financials,
    })
}

impl Database {
    /// Insert or replace the settlement of a station and date
    pub async fn save_settlement(&self, record: &SettlementRecord) -> Result<()> {
        let sql = upsert_sql(
            &SETTLEMENTS,
            &[
                "prediction_date",
                "region",
                "station",
                "predicted",
                "hit",
                "matched",
                "tail_set",
                "cost",
                "revenue",
                "profit",
                "details",
                "settled_at",
            ],
        );
        let fin = record.financials.as_ref();
        let details = fin.map(|f| serde_json::to_string(&f.details)).transpose()?;

        sqlx::query(&sql)
            .bind(record.prediction_date)
            .bind(record.station.region.as_str())
            .bind(record.station.slug())
            .bind(serde_json::to_string(&record.predicted)?)
            .bind(record.hit)
            .bind(serde_json::to_string(&record.matched_pairs)?)
            .bind(serde_json::to_string(&record.tail_set)?)
            .bind(fin.map(|f| f.cost.to_string()))
            .bind(fin.map(|f| f.revenue.to_string()))
            .bind(fin.map(|f| f.profit.to_string()))
            .bind(details)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn settlement(
        &self,
        station: &Station,
        date: NaiveDate,
    ) -> Result<Option<SettlementRecord>> {
        let row = sqlx::query(
            "SELECT * FROM settlements WHERE region = ? AND station = ? AND prediction_date = ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(settlement_from_row).transpose()
    }

    /// Settlements with `from <= date <= to`, oldest first
    pub async fn settlements_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SettlementRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM settlements WHERE prediction_date BETWEEN ? AND ? \
             ORDER BY prediction_date, region, station",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(settlement_from_row).collect()
    }

    /// The `limit` most recent settlements of a station, newest first
    pub async fn recent_settlements(
        &self,
        station: &Station,
        limit: usize,
    ) -> Result<Vec<SettlementRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM settlements WHERE region = ? AND station = ? \
             ORDER BY prediction_date DESC LIMIT ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(settlement_from_row).collect()
    }
}
