//! End-of-run summaries
//!
//! Every batch step records one outcome per station (or per station/date)
//! and a few step counters. Failures are classified by [`ErrorKind`] so a
//! run never aborts on one station.

use std::fmt;

use crate::error::{BotError, ErrorKind};
use crate::notify::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Succeeded,
    /// Data insufficiency; nothing written
    Skipped,
    /// Waiting on results; retried next run
    Pending,
    Failed(ErrorKind),
}

impl Status {
    fn emoji(&self) -> &'static str {
        match self {
            Status::Succeeded => "✅",
            Status::Skipped => "⏭️",
            Status::Pending => "⏳",
            Status::Failed(_) => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationOutcome {
    pub label: String,
    pub status: Status,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub step: String,
    pub outcomes: Vec<StationOutcome>,
    /// Step-specific figures, in insertion order
    pub counters: Vec<(String, String)>,
}

impl RunSummary {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            outcomes: Vec::new(),
            counters: Vec::new(),
        }
    }

    fn push(&mut self, label: impl Into<String>, status: Status, detail: impl Into<String>) {
        self.outcomes.push(StationOutcome {
            label: label.into(),
            status,
            detail: detail.into(),
        });
    }

    pub fn succeeded(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.push(label, Status::Succeeded, detail);
    }

    pub fn skipped(&mut self, label: impl Into<String>, reason: impl Into<String>) {
        let (label, reason) = (label.into(), reason.into());
        tracing::warn!("⏭️ {} {}: {}", self.step, label, reason);
        self.push(label, Status::Skipped, reason);
    }

    pub fn pending(&mut self, label: impl Into<String>, reason: impl Into<String>) {
        let (label, reason) = (label.into(), reason.into());
        tracing::info!("⏳ {} {}: {}", self.step, label, reason);
        self.push(label, Status::Pending, reason);
    }

    /// Record a per-station error under its kind
    pub fn record_error(&mut self, label: impl Into<String>, err: &BotError) {
        let label = label.into();
        match err.kind() {
            ErrorKind::DataInsufficiency => self.skipped(label, err.to_string()),
            ErrorKind::MissingResult => self.pending(label, err.to_string()),
            kind => {
                tracing::error!("❌ {} {}: {}", self.step, label, err);
                self.push(label, Status::Failed(kind), err.to_string());
            }
        }
    }

    pub fn counter(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.counters.push((name.into(), value.to_string()));
    }

    pub fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, Status::Failed(_)))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn outcome(&self, label: &str) -> Option<&StationOutcome> {
        self.outcomes.iter().find(|o| o.label == label)
    }

    pub fn to_html(&self) -> String {
        let mut text = format!(
            "📋 <b>{}</b>\n✅ {} | ⏭️ {} | ⏳ {} | ❌ {}\n",
            escape_html(&self.step),
            self.count(Status::Succeeded),
            self.count(Status::Skipped),
            self.count(Status::Pending),
            self.failed()
        );
        if !self.outcomes.is_empty() {
            text.push('\n');
        }
        for outcome in &self.outcomes {
            text.push_str(&format!(
                "{} <b>{}</b>: {}\n",
                outcome.status.emoji(),
                escape_html(&outcome.label),
                escape_html(&outcome.detail)
            ));
        }
        if !self.counters.is_empty() {
            text.push('\n');
            for (name, value) in &self.counters {
                text.push_str(&format!("{}: <code>{}</code>\n", escape_html(name), escape_html(value)));
            }
        }
        text
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} skipped, {} pending, {} failed",
            self.step,
            self.count(Status::Succeeded),
            self.count(Status::Skipped),
            self.count(Status::Pending),
            self.failed()
        )?;
        for (name, value) in &self.counters {
            write!(f, ", {}={}", name, value)?;
        }
        Ok(())
    }
}
