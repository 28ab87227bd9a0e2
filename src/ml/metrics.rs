//! Evaluation metrics and deterministic ranking

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{BotError, Result};
use crate::types::{Pair, RankedPair, PAIR_COUNT};

/// Order by probability descending, then pair ascending
fn rank_order(a: &RankedPair, b: &RankedPair) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then(a.pair.cmp(&b.pair))
}

/// The `k` highest-probability pairs; ties go to the smaller pair
pub fn rank_top_k(scored: impl IntoIterator<Item = (Pair, f64)>, k: usize) -> Vec<RankedPair> {
    let mut ranked: Vec<RankedPair> = scored
        .into_iter()
        .map(|(pair, probability)| RankedPair { pair, probability })
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(k);
    ranked
}

/// Area under the ROC curve via the rank-sum statistic, with tied scores
/// sharing their average rank. `None` when only one class is present.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 || scores.len() != labels.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks i+1..=j+1 share their mean
        let avg_rank = (i + j + 2) as f64 / 2.0;
        rank_sum += order[i..=j].iter().filter(|idx| labels[**idx]).count() as f64 * avg_rank;
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// One scored validation row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    pub date: NaiveDate,
    pub pair: Pair,
    pub probability: f64,
    pub label: bool,
}

/// Result of a hit-rate@k backtest
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRate {
    pub hits: usize,
    pub dates: usize,
    pub rate: f64,
}

/// Fraction of dates whose top-k pairs include a realized one.
///
/// Rows are grouped per date and each group must be a full 100-row block.
pub fn hit_rate_at_k(rows: &[ScoredRow], k: usize) -> Result<HitRate> {
    let mut blocks: BTreeMap<NaiveDate, Vec<&ScoredRow>> = BTreeMap::new();
    for row in rows {
        blocks.entry(row.date).or_default().push(row);
    }

    let mut hits = 0;
    for (date, block) in &blocks {
        if block.len() != PAIR_COUNT {
            return Err(BotError::Integrity(format!(
                "validation block {} has {} rows, expected {}",
                date,
                block.len(),
                PAIR_COUNT
            )));
        }
        let top = rank_top_k(block.iter().map(|r| (r.pair, r.probability)), k);
        let hit = top
            .iter()
            .any(|t| block.iter().any(|r| r.pair == t.pair && r.label));
        if hit {
            hits += 1;
        }
    }

    let dates = blocks.len();
    Ok(HitRate {
        hits,
        dates,
        rate: if dates == 0 { 0.0 } else { hits as f64 / dates as f64 },
    })
}
