//! Lottery Tail-Pair Pipeline
//!
//! Turns a daily stream of lottery draw results into per-station feature
//! tables, trained classifiers, top-k pair predictions and settled
//! profit reports.
//!
//! ## Architecture
//!
//! ```text
//! Draw source → Ingester (tails) → Features → Trainer → Registry
//!                                      ↓                   ↓
//!                                  Predictor ←─────── active model
//!                                      ↓
//!                  Settlement (hit, cost/revenue) → Report → Notifier
//! ```
//!
//! Everything runs as idempotent batch steps driven by [`pipeline::Pipeline`].

pub mod config;
pub mod error;
pub mod ingester;
pub mod ml;
pub mod notify;
pub mod pipeline;
pub mod schedule;
pub mod settlement;
pub mod storage;
pub mod types;
