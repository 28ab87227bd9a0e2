//! Core domain types

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

/// Last two digits of a winning number, 0..=99
pub type Pair = u8;

/// Number of distinct pairs; every feature set has exactly this many rows
pub const PAIR_COUNT: usize = 100;

/// Station slug used for a region that always draws one nationwide station
pub const NATIONWIDE_SLUG: &str = "all";

/// Lottery region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    /// Northern region, one nationwide draw per day
    Xsmb,
    /// Southern region, several provinces draw simultaneously
    Xsmn,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::Xsmb, Region::Xsmn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Xsmb => "XSMB",
            Region::Xsmn => "XSMN",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "XSMB" => Ok(Region::Xsmb),
            "XSMN" => Ok(Region::Xsmn),
            other => Err(BotError::InvalidInput(format!("unknown region: {}", other))),
        }
    }
}

/// A region, or a region + province, producing its own independent draw
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Station {
    pub region: Region,
    /// None for a nationwide station
    pub province: Option<String>,
}

impl Station {
    pub fn nationwide(region: Region) -> Self {
        Self { region, province: None }
    }

    pub fn province(region: Region, slug: impl Into<String>) -> Self {
        Self {
            region,
            province: Some(slug.into()),
        }
    }

    /// Rebuild a station from its stored `(region, slug)` pair
    pub fn from_slug(region: Region, slug: &str) -> Self {
        if slug == NATIONWIDE_SLUG || slug.is_empty() {
            Self::nationwide(region)
        } else {
            Self::province(region, slug)
        }
    }

    /// Storage key; never NULL so unique constraints hold
    pub fn slug(&self) -> &str {
        self.province.as_deref().unwrap_or(NATIONWIDE_SLUG)
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.region, self.slug())
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.slug())
    }
}

impl FromStr for Station {
    type Err = BotError;

    /// Parses `XSMN/tp-hcm`, `XSMB/all` or bare `XSMB`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (region, slug) = match s.split_once('/') {
            Some((r, p)) => (r, p),
            None => (s, NATIONWIDE_SLUG),
        };
        Ok(Station::from_slug(region.parse()?, slug.trim()))
    }
}

/// Whether a model applies to one day of the week or to all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WeekdayScope {
    All,
    /// 0 = Monday .. 6 = Sunday
    Weekday(u8),
}

impl WeekdayScope {
    pub fn for_date(date: NaiveDate) -> Self {
        WeekdayScope::Weekday(day_of_week(date))
    }

    pub fn weekday(&self) -> Option<u8> {
        match self {
            WeekdayScope::All => None,
            WeekdayScope::Weekday(d) => Some(*d),
        }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            WeekdayScope::All => true,
            WeekdayScope::Weekday(d) => *d == day_of_week(date),
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            WeekdayScope::All => "all".to_string(),
            WeekdayScope::Weekday(d) => format!("wd{}", d),
        }
    }

    pub fn from_key(key: &str) -> Result<Self, BotError> {
        if key == "all" {
            return Ok(WeekdayScope::All);
        }
        key.strip_prefix("wd")
            .and_then(|d| d.parse::<u8>().ok())
            .filter(|d| *d < 7)
            .map(WeekdayScope::Weekday)
            .ok_or_else(|| BotError::InvalidInput(format!("invalid weekday scope: {}", key)))
    }
}

impl fmt::Display for WeekdayScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekdayScope::All => f.write_str("all days"),
            WeekdayScope::Weekday(d) => f.write_str(weekday_name(*d)),
        }
    }
}

/// 0 = Monday .. 6 = Sunday
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

pub fn weekday_name(day: u8) -> &'static str {
    const NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    NAMES.get(day as usize).copied().unwrap_or("?")
}

/// Prize tier of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrizeTier {
    #[serde(rename = "DB")]
    Special,
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
    #[serde(rename = "4")]
    Fourth,
    #[serde(rename = "5")]
    Fifth,
    #[serde(rename = "6")]
    Sixth,
    #[serde(rename = "7")]
    Seventh,
    #[serde(rename = "8")]
    Eighth,
}

impl PrizeTier {
    pub const ALL: [PrizeTier; 9] = [
        PrizeTier::Special,
        PrizeTier::First,
        PrizeTier::Second,
        PrizeTier::Third,
        PrizeTier::Fourth,
        PrizeTier::Fifth,
        PrizeTier::Sixth,
        PrizeTier::Seventh,
        PrizeTier::Eighth,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PrizeTier::Special => "DB",
            PrizeTier::First => "1",
            PrizeTier::Second => "2",
            PrizeTier::Third => "3",
            PrizeTier::Fourth => "4",
            PrizeTier::Fifth => "5",
            PrizeTier::Sixth => "6",
            PrizeTier::Seventh => "7",
            PrizeTier::Eighth => "8",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// How many numbers a well-formed result page lists for this tier
    pub fn expected_count(&self, region: Region) -> usize {
        match (region, self) {
            (Region::Xsmb, PrizeTier::Special) => 1,
            (Region::Xsmb, PrizeTier::First) => 1,
            (Region::Xsmb, PrizeTier::Second) => 2,
            (Region::Xsmb, PrizeTier::Third) => 6,
            (Region::Xsmb, PrizeTier::Fourth) => 4,
            (Region::Xsmb, PrizeTier::Fifth) => 6,
            (Region::Xsmb, PrizeTier::Sixth) => 3,
            (Region::Xsmb, PrizeTier::Seventh) => 4,
            (Region::Xsmb, PrizeTier::Eighth) => 0,
            (Region::Xsmn, PrizeTier::Third) => 2,
            (Region::Xsmn, PrizeTier::Fourth) => 7,
            (Region::Xsmn, PrizeTier::Sixth) => 3,
            (Region::Xsmn, _) => 1,
        }
    }
}

/// A tier holds either one number or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrizeValue {
    Single(String),
    Multiple(Vec<String>),
}

impl PrizeValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            PrizeValue::Single(v) => vec![v.as_str()],
            PrizeValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PrizeValue::Single(_) => 1,
            PrizeValue::Multiple(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One drawing event as delivered by the draw-result source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawRecord {
    /// Store identity, assigned on upsert
    #[serde(default)]
    pub id: Option<i64>,
    pub draw_date: NaiveDate,
    pub region: Region,
    /// Province slug; informational for nationwide regions
    #[serde(default)]
    pub province: Option<String>,
    pub prizes: BTreeMap<PrizeTier, PrizeValue>,
}

impl DrawRecord {
    /// Station the draw's observations are attributed to.
    ///
    /// XSMN provinces draw side by side, so an XSMN draw without a
    /// province cannot be attributed and is rejected.
    pub fn station(&self) -> Result<Station, BotError> {
        match (self.region, self.province.as_deref().map(str::trim)) {
            (Region::Xsmb, _) => Ok(Station::nationwide(self.region)),
            (Region::Xsmn, Some(p)) if !p.is_empty() => Ok(Station::province(self.region, p)),
            (Region::Xsmn, _) => Err(BotError::InvalidInput(format!(
                "{} draw on {} has no province",
                self.region, self.draw_date
            ))),
        }
    }

    /// `station date` for log lines, even when the station is unknown
    pub fn label(&self) -> String {
        match self.station() {
            Ok(station) => format!("{} {}", station, self.draw_date),
            Err(_) => format!("{}/? {}", self.region, self.draw_date),
        }
    }
}

/// Derived fact: one pair observed in one prize tier of one draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailObservation {
    pub draw_id: i64,
    pub station: Station,
    pub draw_date: NaiveDate,
    pub prize_tier: PrizeTier,
    pub pair: Pair,
}

/// Pairs realized by one station's draw on one date, with occurrence counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailSet {
    counts: BTreeMap<Pair, u32>,
}

impl TailSet {
    pub fn from_pairs(pairs: impl IntoIterator<Item = Pair>) -> Self {
        let mut counts = BTreeMap::new();
        for p in pairs {
            *counts.entry(p).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn contains(&self, pair: Pair) -> bool {
        self.counts.contains_key(&pair)
    }

    /// How many prize numbers ended in `pair`
    pub fn occurrences(&self, pair: Pair) -> u32 {
        self.counts.get(&pair).copied().unwrap_or(0)
    }

    /// Number of distinct pairs
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.counts.keys().copied()
    }
}

/// One ranked slot of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedPair {
    pub pair: Pair,
    pub probability: f64,
}

/// Top-k pairs for one station and date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_date: NaiveDate,
    pub station: Station,
    /// Highest probability first
    pub ranked: Vec<RankedPair>,
    pub model_version: String,
}

impl Prediction {
    pub fn pairs(&self) -> Vec<Pair> {
        self.ranked.iter().map(|r| r.pair).collect()
    }
}

/// Cost/revenue of a settlement for a station under financial tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Financials {
    pub cost: Decimal,
    pub revenue: Decimal,
    pub profit: Decimal,
    /// Occurrence count per matched pair
    pub details: BTreeMap<Pair, u32>,
}

/// Outcome of reconciling a prediction against the realized tail set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub prediction_date: NaiveDate,
    pub station: Station,
    pub predicted: Vec<Pair>,
    pub hit: bool,
    pub matched_pairs: Vec<Pair>,
    pub tail_set: Vec<Pair>,
    pub financials: Option<Financials>,
}

/// Lifecycle status of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Deprecated,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Active => "active",
            ModelStatus::Deprecated => "deprecated",
        }
    }
}

impl FromStr for ModelStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ModelStatus::Active),
            "deprecated" => Ok(ModelStatus::Deprecated),
            other => Err(BotError::InvalidInput(format!("unknown model status: {}", other))),
        }
    }
}

/// One trained artifact in the model registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistryEntry {
    pub id: Option<i64>,
    pub station: Station,
    pub scope: WeekdayScope,
    pub version: String,
    pub status: ModelStatus,
    /// Artifact path relative to the artifact directory
    pub file_path: String,
    /// SHA-256 of the artifact file
    pub digest: String,
    pub backend: String,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    /// Distinct dates used (train + validation)
    pub train_periods: i64,
    pub row_count: i64,
    pub metric_auc: f64,
    pub metric_hit_rate: f64,
    pub trained_at: DateTime<Utc>,
}
