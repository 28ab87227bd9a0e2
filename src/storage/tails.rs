//! Tail observations and station history

use chrono::NaiveDate;
use sqlx::Row;
use std::collections::BTreeMap;

use super::tables::{upsert_sql, TAILS};
use super::Database;
use crate::error::{BotError, Result};
use crate::ml::TailHistory;
use crate::types::{Pair, PrizeTier, Region, Station, TailObservation, TailSet};

impl Database {
    pub async fn has_tails(&self, draw_id: i64) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tail_observations WHERE draw_id = ?")
                .bind(draw_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Store the observations derived from one draw.
    ///
    /// Skipped (returns 0) when the draw already has observations, so
    /// re-deriving a draw never duplicates them.
    pub async fn insert_tails(
        &self,
        draw_id: i64,
        observations: &[TailObservation],
    ) -> Result<usize> {
        if let Some(other) = observations.iter().find(|o| o.draw_id != draw_id) {
            return Err(BotError::InvalidInput(format!(
                "observation from draw {} passed for draw {}",
                other.draw_id, draw_id
            )));
        }

        let mut tx = self.pool.begin().await?;
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tail_observations WHERE draw_id = ?")
                .bind(draw_id)
                .fetch_one(&mut *tx)
                .await?;
        if existing > 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        let sql = upsert_sql(
            &TAILS,
            &["draw_id", "region", "station", "draw_date", "prize_tier", "seq", "pair"],
        );
        let mut seq: BTreeMap<PrizeTier, i64> = BTreeMap::new();
        for obs in observations {
            let n = seq.entry(obs.prize_tier).or_insert(0);
            sqlx::query(&sql)
                .bind(draw_id)
                .bind(obs.station.region.as_str())
                .bind(obs.station.slug())
                .bind(obs.draw_date)
                .bind(obs.prize_tier.code())
                .bind(*n)
                .bind(obs.pair as i64)
                .execute(&mut *tx)
                .await?;
            *n += 1;
        }
        tx.commit().await?;
        Ok(observations.len())
    }

    /// Every tail set recorded for a station, oldest first
    pub async fn tail_history(&self, station: &Station) -> Result<TailHistory> {
        let rows = sqlx::query(
            "SELECT draw_date, pair FROM tail_observations \
             WHERE region = ? AND station = ? ORDER BY draw_date",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .fetch_all(&self.pool)
        .await?;

        let mut observations = Vec::with_capacity(rows.len());
        for row in &rows {
            let date: NaiveDate = row.try_get("draw_date")?;
            let pair: i64 = row.try_get("pair")?;
            observations.push((date, pair as Pair));
        }
        Ok(TailHistory::from_observations(observations))
    }

    /// The realized tail set of one station and date, if its draw is in
    pub async fn tail_set(&self, station: &Station, date: NaiveDate) -> Result<Option<TailSet>> {
        let pairs: Vec<i64> = sqlx::query_scalar(
            "SELECT pair FROM tail_observations \
             WHERE region = ? AND station = ? AND draw_date = ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        if pairs.is_empty() {
            return Ok(None);
        }
        Ok(Some(TailSet::from_pairs(pairs.into_iter().map(|p| p as Pair))))
    }

    /// Stations that have at least one observation
    pub async fn stations_with_tails(&self) -> Result<Vec<Station>> {
        let rows = sqlx::query(
            "SELECT DISTINCT region, station FROM tail_observations ORDER BY region, station",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Station> {
                let region: String = row.try_get("region")?;
                let slug: String = row.try_get("station")?;
                Ok(Station::from_slug(region.parse::<Region>()?, &slug))
            })
            .collect()
    }

    pub async fn tail_count(&self, station: &Station) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM tail_observations WHERE region = ? AND station = ?",
        )
        .bind(station.region.as_str())
        .bind(station.slug())
        .fetch_one(&self.pool)
        .await?)
    }
}
