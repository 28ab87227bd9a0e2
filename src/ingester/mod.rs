//! Draw ingestion
//!
//! The draw-result source (crawlers, HTML layouts, fallback publishers)
//! lives outside this crate. It hands over normalized [`DrawRecord`]s,
//! which are upserted and then reduced to tail observations.

pub mod tails;


pub use tails::{build_tail_set, check_tier_counts, extract_tail, extract_tails};

use crate::error::{BotError, Result};
use crate::types::DrawRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;

/// Producer of normalized draw records
#[async_trait]
pub trait DrawSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Records for one date, or everything the source holds
    async fn fetch(&self, date: Option<NaiveDate>) -> Result<Vec<DrawRecord>>;
}

/// Reads newline-delimited JSON draw records from a file
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse one document; blank lines and `#` comments are skipped
    pub fn parse(content: &str) -> Result<Vec<DrawRecord>> {
        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: DrawRecord = serde_json::from_str(line).map_err(|e| {
                BotError::InvalidInput(format!("line {}: {}", lineno + 1, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl DrawSource for JsonLinesSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn fetch(&self, date: Option<NaiveDate>) -> Result<Vec<DrawRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut records = Self::parse(&content)?;
        if let Some(date) = date {
            records.retain(|r| r.draw_date == date);
        }
        tracing::debug!(
            "Read {} draw records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}
