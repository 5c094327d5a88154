//! Metric scoring: a fixed, versioned set of named metrics with an explicit
//! undefined sentinel, and the weighted composite score used for ranking.

mod metric_set;
mod scorer;

pub use metric_set::{MetricName, MetricSet, MetricValue, METRIC_SET_VERSION};
pub use scorer::{
    bellman_error, composite_score, compute_metrics, convergence_score, policy_entropy,
    score_report, ScoringInput,
};
