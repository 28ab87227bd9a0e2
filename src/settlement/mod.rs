//! Settlement
//!
//! Reconciles a prediction with the realized tail set of its station and
//! date. Hit means any predicted pair was realized. Stations whose region
//! has a payout schedule also get cost, revenue and profit:
//! - cost is every slot's points times the cost per point, win or lose
//! - each slot whose pair was realized earns its points times the number
//!   of prize numbers ending in that pair times the revenue per point

mod report;

pub use report::{DailyProfit, ProfitReport};

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::config::PayoutSchedule;
use crate::error::{BotError, Result};
use crate::types::{Financials, Pair, Prediction, SettlementRecord, TailSet};

/// Cost and revenue of one prediction under a payout schedule
pub fn compute_financials(
    predicted: &[Pair],
    tail_set: &TailSet,
    schedule: &PayoutSchedule,
) -> Result<Financials> {
    if predicted.len() != schedule.points.len() {
        return Err(BotError::Integrity(format!(
            "{} predicted pairs but the payout schedule has {} slots",
            predicted.len(),
            schedule.points.len()
        )));
    }

    let cost = Decimal::from(schedule.total_points()) * schedule.cost_per_point;
    let mut revenue = Decimal::ZERO;
    let mut details = BTreeMap::new();
    for (pair, points) in predicted.iter().zip(&schedule.points) {
        let occurrences = tail_set.occurrences(*pair);
        if occurrences == 0 {
            continue;
        }
        revenue += Decimal::from(*points) * Decimal::from(occurrences) * schedule.revenue_per_point;
        details.insert(*pair, occurrences);
    }

    Ok(Financials {
        cost,
        revenue,
        profit: revenue - cost,
        details,
    })
}

/// Settle `prediction` against its realized tail set.
///
/// No tail set yet is [`BotError::MissingResult`]: the prediction stays
/// pending and is retried on a later run.
pub fn settle(
    prediction: &Prediction,
    tail_set: Option<&TailSet>,
    schedule: Option<&PayoutSchedule>,
) -> Result<SettlementRecord> {
    let tail_set = match tail_set {
        Some(set) if !set.is_empty() => set,
        _ => {
            return Err(BotError::MissingResult(format!(
                "{} {}",
                prediction.station, prediction.prediction_date
            )))
        }
    };

    let predicted = prediction.pairs();
    let matched_pairs: Vec<Pair> = predicted
        .iter()
        .copied()
        .filter(|p| tail_set.contains(*p))
        .collect();
    let financials = schedule
        .map(|s| compute_financials(&predicted, tail_set, s))
        .transpose()?;

    Ok(SettlementRecord {
        prediction_date: prediction.prediction_date,
        station: prediction.station.clone(),
        hit: !matched_pairs.is_empty(),
        predicted,
        matched_pairs,
        tail_set: tail_set.pairs().collect(),
        financials,
    })
}
