//! Tail extraction
//!
//! Reduces a draw's heterogeneous prize fields to one observation per
//! winning number: the last two decimal digits.

use crate::error::{BotError, Result};
use crate::types::{DrawRecord, Pair, TailObservation, TailSet};

/// Last two digits of a number string after dropping non-digits.
/// `None` when fewer than two digits remain.
pub fn extract_tail(value: &str) -> Option<Pair> {
    let digits: Vec<u8> = value
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();
    match digits.as_slice() {
        [.., tens, ones] => Some(tens * 10 + ones),
        _ => None,
    }
}

/// Warn about tiers whose value count differs from the region's layout.
/// The tier is still processed. Returns the number of mismatched tiers.
pub fn check_tier_counts(draw: &DrawRecord) -> usize {
    let mut mismatched = 0;
    for (tier, value) in &draw.prizes {
        let expected = tier.expected_count(draw.region);
        if value.len() != expected {
            mismatched += 1;
            tracing::warn!(
                "⚠️ {} tier {}: expected {} numbers, got {}",
                draw.label(),
                tier.code(),
                expected,
                value.len()
            );
        }
    }
    mismatched
}

/// Derive the tail observations of a stored draw.
///
/// The draw must carry its store identity; observations are keyed by it.
pub fn extract_tails(draw: &DrawRecord) -> Result<Vec<TailObservation>> {
    let draw_id = draw.id.ok_or_else(|| {
        BotError::InvalidInput(format!("draw {} has no store id", draw.label()))
    })?;
    let station = draw.station()?;

    check_tier_counts(draw);

    let mut observations = Vec::new();
    for (tier, value) in &draw.prizes {
        for raw in value.values() {
            match extract_tail(raw) {
                Some(pair) => observations.push(TailObservation {
                    draw_id,
                    station: station.clone(),
                    draw_date: draw.draw_date,
                    prize_tier: *tier,
                    pair,
                }),
                None => tracing::debug!("Skipping short prize value {:?} in tier {}", raw, tier.code()),
            }
        }
    }

    Ok(observations)
}

pub fn build_tail_set(observations: &[TailObservation]) -> TailSet {
    TailSet::from_pairs(observations.iter().map(|o| o.pair))
}
