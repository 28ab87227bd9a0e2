//! SQLite persistence
//!
//! One [`Database`] handle over a connection pool. Record groups live in
//! their own files as `impl Database` blocks:
//! - `draws`: normalized draw records
//! - `tails`: tail observations and per-station history
//! - `features`: 100-row feature sets
//! - `registry`: model registry with the single-active invariant
//! - `predictions` / `settlements`
//!
//! Writes go through [`tables::upsert_sql`]; multi-row writes are wrapped
//! in a transaction so a partial set is never visible.

pub mod artifacts;
mod draws;
mod features;
mod predictions;
mod registry;
mod settlements;
mod tails;
pub mod tables;

#[cfg(test)]
mod tests;

pub use artifacts::ArtifactStore;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS draw_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        draw_date TEXT NOT NULL,
        region TEXT NOT NULL,
        station TEXT NOT NULL,
        province TEXT,
        prizes TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (draw_date, region, station)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tail_observations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        draw_id INTEGER NOT NULL REFERENCES draw_results(id),
        region TEXT NOT NULL,
        station TEXT NOT NULL,
        draw_date TEXT NOT NULL,
        prize_tier TEXT NOT NULL,
        seq INTEGER NOT NULL,
        pair INTEGER NOT NULL CHECK (pair BETWEEN 0 AND 99),
        UNIQUE (draw_id, prize_tier, seq)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tails_station_date ON tail_observations(region, station, draw_date)",
    r#"
    CREATE TABLE IF NOT EXISTS feature_rows (
        target_date TEXT NOT NULL,
        region TEXT NOT NULL,
        station TEXT NOT NULL,
        pair INTEGER NOT NULL CHECK (pair BETWEEN 0 AND 99),
        freq_30 REAL NOT NULL,
        freq_60 REAL NOT NULL,
        freq_100 REAL NOT NULL,
        gap_since_last INTEGER NOT NULL,
        avg_gap REAL NOT NULL,
        std_gap REAL NOT NULL,
        gap_zscore REAL NOT NULL,
        is_even INTEGER NOT NULL,
        is_high INTEGER NOT NULL,
        sum_digits INTEGER NOT NULL,
        day_of_week INTEGER NOT NULL,
        label INTEGER,
        UNIQUE (target_date, region, station, pair)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS model_registry (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        region TEXT NOT NULL,
        station TEXT NOT NULL,
        scope TEXT NOT NULL,
        version TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('active', 'deprecated')),
        file_path TEXT NOT NULL,
        digest TEXT NOT NULL,
        backend TEXT NOT NULL,
        train_start TEXT NOT NULL,
        train_end TEXT NOT NULL,
        train_periods INTEGER NOT NULL,
        row_count INTEGER NOT NULL,
        metric_auc REAL NOT NULL,
        metric_hit_rate REAL NOT NULL,
        trained_at TEXT NOT NULL,
        deprecated_at TEXT,
        UNIQUE (region, station, scope, version)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_registry_one_active
        ON model_registry(region, station, scope) WHERE status = 'active'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prediction_date TEXT NOT NULL,
        region TEXT NOT NULL,
        station TEXT NOT NULL,
        ranked TEXT NOT NULL,
        model_version TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (prediction_date, region, station)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settlements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prediction_date TEXT NOT NULL,
        region TEXT NOT NULL,
        station TEXT NOT NULL,
        predicted TEXT NOT NULL,
        hit INTEGER NOT NULL,
        matched TEXT NOT NULL,
        tail_set TEXT NOT NULL,
        cost TEXT,
        revenue TEXT,
        profit TEXT,
        details TEXT,
        settled_at TEXT NOT NULL,
        UNIQUE (prediction_date, region, station)
    )
    "#,
];

/// Handle to the pipeline database
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and its schema
    pub async fn connect(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::in_memory().await;
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::info!("Database ready at {}", path);
        Ok(db)
    }

    /// Private in-memory database; one connection so every query sees it
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Decode a JSON text column
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
