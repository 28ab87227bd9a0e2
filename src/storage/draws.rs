//! Draw records

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::tables::{upsert_sql, DRAWS};
use super::{from_json, Database};
use crate::error::Result;
use crate::types::{DrawRecord, Region};

fn draw_from_row(row: &SqliteRow) -> Result<DrawRecord> {
    let region: String = row.try_get("region")?;
    let prizes: String = row.try_get("prizes")?;
    Ok(DrawRecord {
        id: Some(row.try_get("id")?),
        draw_date: row.try_get("draw_date")?,
        region: region.parse::<Region>()?,
        province: row.try_get("province")?,
        prizes: from_json(&prizes)?,
    })
}

impl Database {
    /// Insert or update a draw by `(draw_date, region, station)`; returns its id.
    ///
    /// A corrected result drops the tails derived from the old prizes, so
    /// the next derivation picks the draw up again.
    pub async fn upsert_draw(&self, draw: &DrawRecord) -> Result<i64> {
        let sql = upsert_sql(
            &DRAWS,
            &["draw_date", "region", "station", "province", "prizes", "updated_at"],
        );
        let station = draw.station()?;
        let prizes = serde_json::to_string(&draw.prizes)?;

        let mut tx = self.pool.begin().await?;
        let previous: Option<String> = sqlx::query_scalar(
            "SELECT prizes FROM draw_results WHERE draw_date = ? AND region = ? AND station = ?",
        )
        .bind(draw.draw_date)
        .bind(draw.region.as_str())
        .bind(station.slug())
        .fetch_optional(&mut *tx)
        .await?;

        let id: i64 = sqlx::query_scalar(&format!("{} RETURNING id", sql))
            .bind(draw.draw_date)
            .bind(draw.region.as_str())
            .bind(station.slug())
            .bind(&draw.province)
            .bind(&prizes)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        if previous.is_some_and(|p| p != prizes) {
            let dropped = sqlx::query("DELETE FROM tail_observations WHERE draw_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if dropped > 0 {
                tracing::warn!(
                    "⚠️ {} {}: prizes changed, dropped {} derived tails",
                    station,
                    draw.draw_date,
                    dropped
                );
            }
        }
        tx.commit().await?;
        Ok(id)
    }

    pub async fn draws_on(&self, date: NaiveDate) -> Result<Vec<DrawRecord>> {
        let rows = sqlx::query(
            "SELECT id, draw_date, region, province, prizes FROM draw_results \
             WHERE draw_date = ? ORDER BY region, station",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(draw_from_row).collect()
    }

    /// Draws with no derived tail observations yet, oldest first
    pub async fn draws_without_tails(&self) -> Result<Vec<DrawRecord>> {
        let rows = sqlx::query(
            "SELECT d.id, d.draw_date, d.region, d.province, d.prizes FROM draw_results d \
             WHERE NOT EXISTS (SELECT 1 FROM tail_observations t WHERE t.draw_id = d.id) \
             ORDER BY d.draw_date, d.region, d.station",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(draw_from_row).collect()
    }

    pub async fn draw_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM draw_results")
            .fetch_one(&self.pool)
            .await?)
    }
}
