use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::training::MetricsSource;

/// Current layout of [`MetricSet`]. Bumped whenever a field changes meaning.
pub const METRIC_SET_VERSION: u32 = 1;

/// One metric value. `Undefined` replaces a division by zero and is never
/// read as 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    Exact(f64),
    /// Estimated from training statistics or a fallback formula.
    Approximate(f64),
    Undefined,
}

impl MetricValue {
    pub fn value(&self) -> Option<f64> {
        match *self {
            MetricValue::Exact(v) | MetricValue::Approximate(v) => Some(v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, MetricValue::Undefined)
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, MetricValue::Approximate(_))
    }

    /// Same value, tagged approximate when `approximate` is set.
    pub fn tagged(value: f64, approximate: bool) -> Self {
        if approximate {
            MetricValue::Approximate(value)
        } else {
            MetricValue::Exact(value)
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Exact(v) => write!(f, "{v:.4}"),
            MetricValue::Approximate(v) => write!(f, "~{v:.4}"),
            MetricValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// Names of the metrics in a [`MetricSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    PerformanceScore,
    EfficiencyScore,
    RobustnessScore,
    LearningSpeed,
    ConvergenceScore,
    BellmanError,
    TdErrorMean,
    TdErrorStd,
    ReturnVariance,
    SampleEfficiency,
    PolicyEntropy,
    CompositeScore,
}

impl MetricName {
    pub const ALL: [MetricName; 12] = [
        MetricName::PerformanceScore,
        MetricName::EfficiencyScore,
        MetricName::RobustnessScore,
        MetricName::LearningSpeed,
        MetricName::ConvergenceScore,
        MetricName::BellmanError,
        MetricName::TdErrorMean,
        MetricName::TdErrorStd,
        MetricName::ReturnVariance,
        MetricName::SampleEfficiency,
        MetricName::PolicyEntropy,
        MetricName::CompositeScore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::PerformanceScore => "performance_score",
            MetricName::EfficiencyScore => "efficiency_score",
            MetricName::RobustnessScore => "robustness_score",
            MetricName::LearningSpeed => "learning_speed",
            MetricName::ConvergenceScore => "convergence_score",
            MetricName::BellmanError => "bellman_error",
            MetricName::TdErrorMean => "td_error_mean",
            MetricName::TdErrorStd => "td_error_std",
            MetricName::ReturnVariance => "return_variance",
            MetricName::SampleEfficiency => "sample_efficiency",
            MetricName::PolicyEntropy => "policy_entropy",
            MetricName::CompositeScore => "composite_score",
        }
    }

    /// Whether smaller values rank higher.
    pub fn lower_is_better(self) -> bool {
        matches!(
            self,
            MetricName::BellmanError
                | MetricName::TdErrorMean
                | MetricName::TdErrorStd
                | MetricName::ReturnVariance
                | MetricName::PolicyEntropy
        )
    }

    /// Orders two values of this metric best first. Undefined values sort
    /// after every defined one.
    pub fn cmp_best_first(self, a: MetricValue, b: MetricValue) -> Ordering {
        match (a.value(), b.value()) {
            (Some(x), Some(y)) if self.lower_is_better() => x.total_cmp(&y),
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Whether `candidate` strictly beats `incumbent`.
    pub fn is_better(self, candidate: MetricValue, incumbent: MetricValue) -> bool {
        self.cmp_best_first(candidate, incumbent) == Ordering::Less
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Every metric computed for one (agent, statistics, table) triple. All
/// fields are always present; missing values are `Undefined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub version: u32,
    pub metrics_source: MetricsSource,
    /// Rates (percent) of the statistics block the metrics came from.
    pub win_rate: f64,
    pub draw_rate: f64,
    pub loss_rate: f64,
    pub states_learned: usize,
    pub total_episodes: usize,

    pub performance_score: MetricValue,
    pub efficiency_score: MetricValue,
    pub robustness_score: MetricValue,
    pub learning_speed: MetricValue,
    pub convergence_score: MetricValue,
    pub bellman_error: MetricValue,
    pub td_error_mean: MetricValue,
    pub td_error_std: MetricValue,
    pub return_variance: MetricValue,
    pub sample_efficiency: MetricValue,
    pub policy_entropy: MetricValue,
    pub composite_score: MetricValue,

    /// Composite inputs left out because they were undefined.
    pub excluded_from_composite: Vec<MetricName>,
}

impl MetricSet {
    /// A set with every metric undefined and zero context counters.
    pub fn undefined(metrics_source: MetricsSource) -> Self {
        let u = MetricValue::Undefined;
        MetricSet {
            version: METRIC_SET_VERSION,
            metrics_source,
            win_rate: 0.0,
            draw_rate: 0.0,
            loss_rate: 0.0,
            states_learned: 0,
            total_episodes: 0,
            performance_score: u,
            efficiency_score: u,
            robustness_score: u,
            learning_speed: u,
            convergence_score: u,
            bellman_error: u,
            td_error_mean: u,
            td_error_std: u,
            return_variance: u,
            sample_efficiency: u,
            policy_entropy: u,
            composite_score: u,
            excluded_from_composite: Vec::new(),
        }
    }

    pub fn get(&self, name: MetricName) -> MetricValue {
        match name {
            MetricName::PerformanceScore => self.performance_score,
            MetricName::EfficiencyScore => self.efficiency_score,
            MetricName::RobustnessScore => self.robustness_score,
            MetricName::LearningSpeed => self.learning_speed,
            MetricName::ConvergenceScore => self.convergence_score,
            MetricName::BellmanError => self.bellman_error,
            MetricName::TdErrorMean => self.td_error_mean,
            MetricName::TdErrorStd => self.td_error_std,
            MetricName::ReturnVariance => self.return_variance,
            MetricName::SampleEfficiency => self.sample_efficiency,
            MetricName::PolicyEntropy => self.policy_entropy,
            MetricName::CompositeScore => self.composite_score,
        }
    }

    /// `(name, value)` for every metric, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricName, MetricValue)> + '_ {
        MetricName::ALL.iter().map(move |&n| (n, self.get(n)))
    }
}
