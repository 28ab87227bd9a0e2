//! Feature engineering over tail history
//!
//! For one station and target date, turns the ordered tail sets strictly
//! before that date into a dense 100-row table (one row per pair):
//! - Rolling-window frequencies (30/60/100 periods)
//! - Gap since last appearance and inter-occurrence gap statistics
//! - Pair-intrinsic attributes (parity, magnitude, digit sum)
//! - Day of week of the target date
//!
//! Rows never look at the target date itself or anything after it. The
//! label is attached separately, only when the realized tail set is known.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{BotError, Result};
use crate::types::{day_of_week, Pair, Station, TailSet, PAIR_COUNT};

/// Number of model inputs per row
pub const FEATURE_COUNT: usize = 11;

/// Frequency windows, in periods
pub const FREQ_WINDOWS: [usize; 3] = [30, 60, 100];

/// Keeps the z-score finite when a pair's gaps never vary
const GAP_EPSILON: f64 = 1e-6;

/// Average gap used when there is no history at all
const EMPTY_HISTORY_GAP: f64 = 100.0;

/// Model input vector, in [`FeatureRow::feature_names`] order
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Features of one pair for one station and target date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub station: Station,
    pub target_date: NaiveDate,
    pub pair: Pair,
    /// Fraction of the last 30 periods in which the pair appeared
    pub freq_30: f64,
    pub freq_60: f64,
    pub freq_100: f64,
    /// Periods since the most recent appearance; history length if never seen
    pub gap_since_last: u32,
    pub avg_gap: f64,
    /// Population standard deviation of the gaps
    pub std_gap: f64,
    pub gap_zscore: f64,
    pub is_even: bool,
    /// Pair >= 50
    pub is_high: bool,
    pub sum_digits: u8,
    /// 0 = Monday
    pub day_of_week: u8,
    /// Whether the pair is in the target date's tail set, when known
    pub label: Option<bool>,
}

impl FeatureRow {
    /// Convert to model input
    pub fn to_vector(&self) -> FeatureVector {
        [
            self.freq_30,
            self.freq_60,
            self.freq_100,
            self.gap_since_last as f64,
            self.avg_gap,
            self.std_gap,
            self.gap_zscore,
            if self.is_even { 1.0 } else { 0.0 },
            if self.is_high { 1.0 } else { 0.0 },
            self.sum_digits as f64,
            self.day_of_week as f64,
        ]
    }

    /// Feature names in vector order
    pub fn feature_names() -> [&'static str; FEATURE_COUNT] {
        [
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
        ]
    }
}

/// Gap statistics of one pair over a history window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapStats {
    pub gap_since_last: u32,
    pub avg_gap: f64,
    pub std_gap: f64,
    pub zscore: f64,
}

impl GapStats {
    /// `positions` are ascending period indices (0 = oldest) where the pair
    /// appeared, out of `n` periods.
    pub fn from_positions(positions: &[usize], n: usize) -> Self {
        let gap_since_last = match positions.last() {
            Some(last) => (n - 1 - last) as u32,
            None => n as u32,
        };

        let (avg_gap, std_gap) = match positions.len() {
            0 if n == 0 => (EMPTY_HISTORY_GAP, 0.0),
            0 => (n as f64, 0.0),
            1 => (gap_since_last as f64, 0.0),
            _ => {
                let gaps: Vec<f64> = positions
                    .windows(2)
                    .map(|w| (w[1] - w[0]) as f64)
                    .collect();
                let avg = gaps.iter().mean();
                let std = if gaps.len() > 1 {
                    gaps.iter().population_std_dev()
                } else {
                    0.0
                };
                (avg, std)
            }
        };

        Self {
            gap_since_last,
            avg_gap,
            std_gap,
            zscore: (gap_since_last as f64 - avg_gap) / (std_gap + GAP_EPSILON),
        }
    }
}

/// Fraction of the last `min(window, n)` periods containing the pair
pub fn window_frequency(present: &[bool], window: usize) -> f64 {
    let w = window.min(present.len());
    if w == 0 {
        return 0.0;
    }
    let hits = present[present.len() - w..].iter().filter(|p| **p).count();
    hits as f64 / w as f64
}

/// Ordered tail sets of one station, one per draw date
#[derive(Debug, Clone, Default)]
pub struct TailHistory {
    periods: Vec<(NaiveDate, TailSet)>,
}

impl TailHistory {
    /// Sorts by date; a later entry for the same date replaces an earlier one
    pub fn new(periods: impl IntoIterator<Item = (NaiveDate, TailSet)>) -> Self {
        let mut periods: Vec<_> = periods.into_iter().collect();
        periods.sort_by_key(|(d, _)| *d);
        let mut deduped: Vec<(NaiveDate, TailSet)> = Vec::with_capacity(periods.len());
        for (date, set) in periods {
            match deduped.last_mut() {
                Some((last, existing)) if *last == date => *existing = set,
                _ => deduped.push((date, set)),
            }
        }
        Self { periods: deduped }
    }

    /// Group `(date, pair)` observations into per-date tail sets
    pub fn from_observations(observations: impl IntoIterator<Item = (NaiveDate, Pair)>) -> Self {
        let mut grouped: std::collections::BTreeMap<NaiveDate, Vec<Pair>> = Default::default();
        for (date, pair) in observations {
            grouped.entry(date).or_default().push(pair);
        }
        Self::new(
            grouped
                .into_iter()
                .map(|(d, pairs)| (d, TailSet::from_pairs(pairs))),
        )
    }

    /// The most recent `limit` periods strictly before `date`
    pub fn before(&self, date: NaiveDate, limit: usize) -> &[(NaiveDate, TailSet)] {
        let end = self.periods.partition_point(|(d, _)| *d < date);
        let start = end.saturating_sub(limit);
        &self.periods[start..end]
    }

    pub fn tail_set_on(&self, date: NaiveDate) -> Option<&TailSet> {
        self.periods
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| &self.periods[i].1)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.periods.iter().map(|(d, _)| *d)
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Builds the per-pair feature table for a station and target date
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    history_periods: usize,
}

impl FeatureBuilder {
    pub fn new(history_periods: usize) -> Self {
        Self { history_periods }
    }

    pub fn history_periods(&self) -> usize {
        self.history_periods
    }

    /// Build 100 rows from `history`, ascending tail sets before `target_date`.
    ///
    /// Only the most recent `history_periods` entries are used. A history
    /// entry on or after `target_date` is rejected.
    pub fn build(
        &self,
        station: &Station,
        target_date: NaiveDate,
        history: &[(NaiveDate, TailSet)],
        label: Option<&TailSet>,
    ) -> Result<Vec<FeatureRow>> {
        if let Some((d, _)) = history.iter().find(|(d, _)| *d >= target_date) {
            return Err(BotError::Integrity(format!(
                "{} history for {} contains {}",
                station, target_date, d
            )));
        }
        if history.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(BotError::Integrity(format!(
                "{} history for {} is not strictly ascending",
                station, target_date
            )));
        }

        let start = history.len().saturating_sub(self.history_periods);
        let window = &history[start..];
        let n = window.len();
        let weekday = day_of_week(target_date);

        let mut rows = Vec::with_capacity(PAIR_COUNT);
        for pair in 0..PAIR_COUNT as Pair {
            let present: Vec<bool> = window.iter().map(|(_, set)| set.contains(pair)).collect();
            let positions: Vec<usize> = present
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.then_some(i))
                .collect();
            let gaps = GapStats::from_positions(&positions, n);

            rows.push(FeatureRow {
                station: station.clone(),
                target_date,
                pair,
                freq_30: window_frequency(&present, FREQ_WINDOWS[0]),
                freq_60: window_frequency(&present, FREQ_WINDOWS[1]),
                freq_100: window_frequency(&present, FREQ_WINDOWS[2]),
                gap_since_last: gaps.gap_since_last,
                avg_gap: gaps.avg_gap,
                std_gap: gaps.std_gap,
                gap_zscore: gaps.zscore,
                is_even: pair % 2 == 0,
                is_high: pair >= 50,
                sum_digits: pair / 10 + pair % 10,
                day_of_week: weekday,
                label: label.map(|set| set.contains(pair)),
            });
        }

        Ok(rows)
    }

    /// Build from a full station history, labelling when the target date's
    /// tail set is present
    pub fn build_from_history(
        &self,
        station: &Station,
        target_date: NaiveDate,
        history: &TailHistory,
    ) -> Result<Vec<FeatureRow>> {
        let past = history.before(target_date, self.history_periods);
        self.build(station, target_date, past, history.tail_set_on(target_date))
    }
}

/// Check a row set is one complete table: 100 rows, pairs 0..99 once each,
/// all for the same station and date.
pub fn validate_feature_set(rows: &[FeatureRow]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Err(BotError::Integrity("empty feature set".into()));
    };
    if rows.len() != PAIR_COUNT {
        return Err(BotError::Integrity(format!(
            "{} {}: expected {} feature rows, got {}",
            first.station,
            first.target_date,
            PAIR_COUNT,
            rows.len()
        )));
    }

    let mut seen = [false; PAIR_COUNT];
    for row in rows {
        if row.station != first.station || row.target_date != first.target_date {
            return Err(BotError::Integrity(format!(
                "feature set mixes {} {} with {} {}",
                first.station, first.target_date, row.station, row.target_date
            )));
        }
        let idx = row.pair as usize;
        if idx >= PAIR_COUNT || seen[idx] {
            return Err(BotError::Integrity(format!(
                "{} {}: pair {} out of range or duplicated",
                first.station, first.target_date, row.pair
            )));
        }
        seen[idx] = true;
    }
    Ok(())
}
