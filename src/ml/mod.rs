//! Machine learning over tail history
//!
//! Provides:
//! - Feature engineering (100 rows per station and date)
//! - A classifier capability with gradient-boosted and logistic backends
//! - Chronological training with AUC and hit-rate@k evaluation
//! - Deterministic top-k prediction

pub mod classifier;
pub mod features;
pub mod gbdt;
pub mod logistic;
pub mod metrics;
pub mod predictor;
pub mod trainer;


pub use classifier::{Classifier, ModelArtifact, TrainedModel};
pub use features::{
    validate_feature_set, FeatureBuilder, FeatureRow, FeatureVector, GapStats, TailHistory,
    FEATURE_COUNT,
};
pub use metrics::{hit_rate_at_k, rank_top_k, roc_auc, HitRate, ScoredRow};
pub use predictor::Predictor;
pub use trainer::{model_version, split_by_date, Trainer, TrainingMetrics, TrainingOutcome};
