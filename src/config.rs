//! Configuration
//!
//! Loaded from an optional TOML file, then overridden by `LOTTERY_`-prefixed
//! environment variables (`LOTTERY_DATABASE__PATH=...`). A `.env` file is
//! read first when present.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::{BotError, Result};
use crate::types::Region;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub retrain: RetrainConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding serialized model artifacts
    #[serde(default = "default_artifact_dir")]
    pub dir: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self { dir: default_artifact_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_true")]
    pub notify_runs: bool,
    #[serde(default = "default_true")]
    pub notify_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// Most recent periods considered when building features
    #[serde(default = "default_history_periods")]
    pub history_periods: usize,
    /// Below this many periods a station/date is skipped
    #[serde(default = "default_min_history_periods")]
    pub min_history_periods: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            history_periods: default_history_periods(),
            min_history_periods: default_min_history_periods(),
        }
    }
}

/// Which classifier backend to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gbdt,
    Logistic,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gbdt => "gbdt",
            BackendKind::Logistic => "logistic",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
    /// Floor used by forced/backfill runs
    #[serde(default = "default_min_rows_forced")]
    pub min_rows_forced: usize,
    /// Share of the most recent dates held out for validation
    #[serde(default = "default_validation_ratio")]
    pub validation_ratio: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub gbdt: GbdtParams,
    #[serde(default)]
    pub logistic: LogisticParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_rows: default_min_rows(),
            min_rows_forced: default_min_rows_forced(),
            validation_ratio: default_validation_ratio(),
            top_k: default_top_k(),
            backend: BackendKind::default(),
            gbdt: GbdtParams::default(),
            logistic: LogisticParams::default(),
        }
    }
}

/// Gradient-boosted stumps hyperparameters
#[derive(Debug, Clone, Deserialize)]
pub struct GbdtParams {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Row fraction sampled per boosting round
    #[serde(default = "default_subsample")]
    pub subsample: f64,
    /// Candidate thresholds per feature
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            subsample: default_subsample(),
            bins: default_bins(),
            seed: default_seed(),
        }
    }
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticParams {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_logistic_lr")]
    pub learning_rate: f64,
    #[serde(default = "default_l2")]
    pub l2: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            learning_rate: default_logistic_lr(),
            l2: default_l2(),
        }
    }
}

/// Tiered payout schedule of one region
#[derive(Debug, Clone, Deserialize)]
pub struct PayoutSchedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Stake points per ranked slot, slot 1 first
    pub points: Vec<u32>,
    pub cost_per_point: Decimal,
    pub revenue_per_point: Decimal,
}

impl PayoutSchedule {
    pub fn xsmb() -> Self {
        Self {
            enabled: true,
            points: vec![2, 1, 1],
            cost_per_point: dec!(23000),
            revenue_per_point: dec!(80000),
        }
    }

    pub fn xsmn() -> Self {
        Self {
            enabled: true,
            points: vec![3, 2, 2],
            cost_per_point: dec!(14000),
            revenue_per_point: dec!(70000),
        }
    }

    pub fn total_points(&self) -> u32 {
        self.points.iter().sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "PayoutSchedule::xsmb")]
    pub xsmb: PayoutSchedule,
    #[serde(default = "PayoutSchedule::xsmn")]
    pub xsmn: PayoutSchedule,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            xsmb: PayoutSchedule::xsmb(),
            xsmn: PayoutSchedule::xsmn(),
        }
    }
}

impl SettlementConfig {
    /// Schedule for a region enrolled in cost/revenue tracking
    pub fn for_region(&self, region: Region) -> Option<&PayoutSchedule> {
        let schedule = match region {
            Region::Xsmb => &self.xsmb,
            Region::Xsmn => &self.xsmn,
        };
        schedule.enabled.then_some(schedule)
    }
}

/// Thresholds for `check-training` and `cleanup-models`
#[derive(Debug, Clone, Deserialize)]
pub struct RetrainConfig {
    /// Settled predictions used for the recent hit-rate
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Allowed drop of recent hit-rate below the training hit-rate
    #[serde(default = "default_perf_delta")]
    pub perf_delta: f64,
    #[serde(default = "default_min_new_periods")]
    pub min_new_periods: i64,
    /// New periods relative to the periods trained on
    #[serde(default = "default_min_new_ratio")]
    pub min_new_ratio: f64,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            recent_window: default_recent_window(),
            perf_delta: default_perf_delta(),
            min_new_periods: default_min_new_periods(),
            min_new_ratio: default_min_new_ratio(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Offset of the draw timezone from UTC; decides what "today" is
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl PipelineConfig {
    pub fn today(&self) -> NaiveDate {
        (Utc::now() + Duration::hours(self.utc_offset_hours)).date_naive()
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LOTTERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;

        if config.telegram.is_none() {
            if let (Ok(bot_token), Ok(chat_id)) = (
                std::env::var("TELEGRAM_BOT_TOKEN"),
                std::env::var("TELEGRAM_CHAT_ID"),
            ) {
                config.telegram = Some(TelegramConfig {
                    bot_token,
                    chat_id,
                    notify_runs: true,
                    notify_errors: true,
                });
            }
        }

        config.database.path = shellexpand::tilde(&config.database.path).into_owned();
        config.artifacts.dir = shellexpand::tilde(&config.artifacts.dir).into_owned();

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ratio = self.training.validation_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(BotError::Config(format!(
                "training.validation_ratio must be in (0, 1), got {}",
                ratio
            )));
        }
        if self.training.top_k == 0 || self.training.top_k > crate::types::PAIR_COUNT {
            return Err(BotError::Config(format!(
                "training.top_k must be in 1..=100, got {}",
                self.training.top_k
            )));
        }
        if self.features.history_periods == 0 {
            return Err(BotError::Config("features.history_periods must be positive".into()));
        }
        for region in Region::ALL {
            if let Some(schedule) = self.settlement.for_region(region) {
                if schedule.points.len() != self.training.top_k {
                    return Err(BotError::Config(format!(
                        "settlement.{} has {} slot weights but top_k is {}",
                        region.as_str().to_lowercase(),
                        schedule.points.len(),
                        self.training.top_k
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_db_path() -> String {
    "data/lottery.db".to_string()
}

fn default_artifact_dir() -> String {
    "data/models".to_string()
}

fn default_true() -> bool {
    true
}

fn default_history_periods() -> usize {
    120
}

fn default_min_history_periods() -> usize {
    10
}

fn default_min_rows() -> usize {
    1000
}

fn default_min_rows_forced() -> usize {
    100
}

fn default_validation_ratio() -> f64 {
    0.2
}

fn default_top_k() -> usize {
    3
}

fn default_n_estimators() -> usize {
    300
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_subsample() -> f64 {
    0.8
}

fn default_bins() -> usize {
    16
}

fn default_seed() -> u64 {
    42
}

fn default_epochs() -> usize {
    200
}

fn default_logistic_lr() -> f64 {
    0.1
}

fn default_l2() -> f64 {
    0.001
}

fn default_recent_window() -> usize {
    30
}

fn default_perf_delta() -> f64 {
    0.05
}

fn default_min_new_periods() -> i64 {
    50
}

fn default_min_new_ratio() -> f64 {
    0.2
}

fn default_retention_days() -> i64 {
    30
}

fn default_utc_offset_hours() -> i64 {
    7
}
