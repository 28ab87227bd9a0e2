//! Profit reports over a date range

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::SettlementRecord;

/// Totals of one prediction date
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyProfit {
    pub settled: u32,
    pub hits: u32,
    pub cost: Decimal,
    pub revenue: Decimal,
    pub profit: Decimal,
}

impl DailyProfit {
    fn add(&mut self, record: &SettlementRecord) {
        self.settled += 1;
        if record.hit {
            self.hits += 1;
        }
        if let Some(fin) = &record.financials {
            self.cost += fin.cost;
            self.revenue += fin.revenue;
            self.profit += fin.profit;
        }
    }
}

/// Per-day and overall settlement results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: BTreeMap<NaiveDate, DailyProfit>,
    pub total: DailyProfit,
}

impl ProfitReport {
    pub fn from_settlements(from: NaiveDate, to: NaiveDate, records: &[SettlementRecord]) -> Self {
        let mut days: BTreeMap<NaiveDate, DailyProfit> = BTreeMap::new();
        let mut total = DailyProfit::default();
        for record in records
            .iter()
            .filter(|r| r.prediction_date >= from && r.prediction_date <= to)
        {
            days.entry(record.prediction_date).or_default().add(record);
            total.add(record);
        }
        Self {
            from,
            to,
            days,
            total,
        }
    }

    pub fn hit_rate(&self) -> f64 {
        if self.total.settled == 0 {
            0.0
        } else {
            self.total.hits as f64 / self.total.settled as f64
        }
    }

    /// Profit over cost, in percent; `None` with nothing staked
    pub fn roi_percent(&self) -> Option<Decimal> {
        if self.total.cost.is_zero() {
            None
        } else {
            Some((self.total.profit / self.total.cost * Decimal::ONE_HUNDRED).round_dp(2))
        }
    }

    pub fn to_html(&self) -> String {
        let emoji = if self.total.profit >= Decimal::ZERO { "📈" } else { "📉" };
        let mut text = format!(
            "{} <b>Profit report {} → {}</b>\n\n",
            emoji, self.from, self.to
        );
        for (date, day) in &self.days {
            text.push_str(&format!(
                "<code>{}</code> {}/{} hits | cost {} | rev {} | <b>{:+}</b>\n",
                date, day.hits, day.settled, day.cost, day.revenue, day.profit
            ));
        }
        text.push_str(&format!(
            "\n<b>Total</b>: {}/{} hits ({:.1}%)\nCost: <code>{}</code>\nRevenue: <code>{}</code>\nProfit: <code>{:+}</code>",
            self.total.hits,
            self.total.settled,
            self.hit_rate() * 100.0,
            self.total.cost,
            self.total.revenue,
            self.total.profit
        ));
        if let Some(roi) = self.roi_percent() {
            text.push_str(&format!("\nROI: <code>{}%</code>", roi));
        }
        text
    }
}
