use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ai::QLearningConfig;
use crate::error::ConfigError;

/// One point of the hyperparameter space. `epsilon_start` always comes from
/// the base configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon_decay: f64,
    pub epsilon_min: f64,
}

impl SearchConfig {
    pub fn from_base(base: &QLearningConfig) -> Self {
        SearchConfig {
            alpha: base.alpha,
            gamma: base.gamma,
            epsilon_decay: base.epsilon_decay,
            epsilon_min: base.epsilon_min,
        }
    }

    pub fn apply(&self, base: &QLearningConfig) -> QLearningConfig {
        QLearningConfig {
            alpha: self.alpha,
            gamma: self.gamma,
            epsilon_decay: self.epsilon_decay,
            epsilon_min: self.epsilon_min,
            ..base.clone()
        }
    }
}

impl std::fmt::Display for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "alpha={:.4} gamma={:.4} decay={:.5} eps_min={:.4}",
            self.alpha, self.gamma, self.epsilon_decay, self.epsilon_min
        )
    }
}

/// Finite value lists per hyperparameter. An empty list keeps the base value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub alpha: Vec<f64>,
    pub gamma: Vec<f64>,
    pub epsilon_decay: Vec<f64>,
    pub epsilon_min: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            alpha: vec![0.1, 0.15, 0.2, 0.25, 0.3],
            gamma: vec![0.90, 0.92, 0.95, 0.97, 0.99],
            epsilon_decay: vec![0.990, 0.995, 0.997, 0.999],
            epsilon_min: Vec::new(),
        }
    }
}

impl ParamGrid {
    /// Number of points in the full cartesian product.
    pub fn size(&self) -> usize {
        [&self.alpha, &self.gamma, &self.epsilon_decay, &self.epsilon_min]
            .iter()
            .map(|axis| axis.len().max(1))
            .product()
    }

    /// Cartesian product in row-major order (alpha slowest, epsilon_min
    /// fastest), truncated to `max_configs`.
    pub fn configs(&self, base: &QLearningConfig, max_configs: Option<usize>) -> Vec<SearchConfig> {
        let axis = |values: &Vec<f64>, default: f64| -> Vec<f64> {
            if values.is_empty() {
                vec![default]
            } else {
                values.clone()
            }
        };
        let alphas = axis(&self.alpha, base.alpha);
        let gammas = axis(&self.gamma, base.gamma);
        let decays = axis(&self.epsilon_decay, base.epsilon_decay);
        let mins = axis(&self.epsilon_min, base.epsilon_min);

        let mut out = Vec::with_capacity(self.size());
        for &alpha in &alphas {
            for &gamma in &gammas {
                for &epsilon_decay in &decays {
                    for &epsilon_min in &mins {
                        out.push(SearchConfig {
                            alpha,
                            gamma,
                            epsilon_decay,
                            epsilon_min,
                        });
                    }
                }
            }
        }
        if let Some(max) = max_configs {
            out.truncate(max);
        }
        out
    }
}

/// How a range is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    Linear,
    /// Log-uniform over `x`; needs `min > 0`.
    Log,
    /// Log-uniform over `1 - x`, for factors close to 1; needs `max < 1`.
    LogComplement,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_scale")]
    pub scale: Scale,
}

fn default_scale() -> Scale {
    Scale::Linear
}

impl ParamRange {
    pub fn new(min: f64, max: f64, scale: Scale) -> Self {
        ParamRange { min, max, scale }
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::Validation(format!(
                "search.space.{name}: need finite min <= max, got [{}, {}]",
                self.min, self.max
            )));
        }
        match self.scale {
            Scale::Log if self.min <= 0.0 => Err(ConfigError::Validation(format!(
                "search.space.{name}: log scale needs min > 0"
            ))),
            Scale::LogComplement if self.max >= 1.0 => Err(ConfigError::Validation(format!(
                "search.space.{name}: log_complement scale needs max < 1"
            ))),
            _ => Ok(()),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let value = match self.scale {
            Scale::Linear => rng.random_range(self.min..=self.max),
            Scale::Log => rng.random_range(self.min.ln()..=self.max.ln()).exp(),
            Scale::LogComplement => {
                1.0 - rng
                    .random_range((1.0 - self.max).ln()..=(1.0 - self.min).ln())
                    .exp()
            }
        };
        value.clamp(self.min, self.max)
    }
}

/// Sampling ranges for random search. A missing range keeps the base value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSpace {
    pub alpha: Option<ParamRange>,
    pub gamma: Option<ParamRange>,
    pub epsilon_decay: Option<ParamRange>,
    pub epsilon_min: Option<ParamRange>,
}

impl Default for ParamSpace {
    fn default() -> Self {
        ParamSpace {
            alpha: Some(ParamRange::new(0.05, 0.5, Scale::Linear)),
            gamma: Some(ParamRange::new(0.85, 0.99, Scale::Linear)),
            epsilon_decay: Some(ParamRange::new(0.98, 0.9999, Scale::LogComplement)),
            epsilon_min: Some(ParamRange::new(0.001, 0.1, Scale::Log)),
        }
    }
}

impl ParamSpace {
    fn ranges(&self) -> [(&'static str, Option<&ParamRange>); 4] {
        [
            ("alpha", self.alpha.as_ref()),
            ("gamma", self.gamma.as_ref()),
            ("epsilon_decay", self.epsilon_decay.as_ref()),
            ("epsilon_min", self.epsilon_min.as_ref()),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, range) in self.ranges() {
            if let Some(range) = range {
                range.validate(name)?;
            }
        }
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, base: &QLearningConfig, rng: &mut R) -> SearchConfig {
        let mut draw = |range: &Option<ParamRange>, default: f64| match range {
            Some(r) => r.sample(rng),
            None => default,
        };
        SearchConfig {
            alpha: draw(&self.alpha, base.alpha),
            gamma: draw(&self.gamma, base.gamma),
            epsilon_decay: draw(&self.epsilon_decay, base.epsilon_decay),
            epsilon_min: draw(&self.epsilon_min, base.epsilon_min),
        }
    }

    /// `iterations` independent samples, reproducible from `seed`.
    pub fn configs(&self, base: &QLearningConfig, iterations: usize, seed: u64) -> Vec<SearchConfig> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..iterations).map(|_| self.sample(base, &mut rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_size() {
        let grid = ParamGrid::default();
        assert_eq!(grid.size(), 100);
        assert_eq!(grid.configs(&QLearningConfig::default(), None).len(), 100);
    }

    #[test]
    fn test_grid_order_and_empty_axis() {
        let base = QLearningConfig::default();
        let grid = ParamGrid {
            alpha: vec![0.1, 0.2],
            gamma: vec![0.9, 0.95],
            epsilon_decay: vec![0.99, 0.995],
            epsilon_min: Vec::new(),
        };
        let configs = grid.configs(&base, None);
        assert_eq!(configs.len(), 8);
        assert_eq!(configs[0].alpha, 0.1);
        assert_eq!(configs[0].epsilon_decay, 0.99);
        assert_eq!(configs[1].epsilon_decay, 0.995);
        assert_eq!(configs[7].alpha, 0.2);
        assert!(configs.iter().all(|c| c.epsilon_min == base.epsilon_min));
    }

    #[test]
    fn test_max_configs_truncates() {
        let grid = ParamGrid::default();
        let configs = grid.configs(&QLearningConfig::default(), Some(7));
        assert_eq!(configs.len(), 7);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let space = ParamSpace::default();
        let configs = space.configs(&QLearningConfig::default(), 500, 11);
        for c in &configs {
            assert!((0.05..=0.5).contains(&c.alpha));
            assert!((0.85..=0.99).contains(&c.gamma));
            assert!((0.98..=0.9999).contains(&c.epsilon_decay));
            assert!((0.001..=0.1).contains(&c.epsilon_min));
        }
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let space = ParamSpace::default();
        let base = QLearningConfig::default();
        assert_eq!(space.configs(&base, 10, 3), space.configs(&base, 10, 3));
        assert_ne!(space.configs(&base, 10, 3), space.configs(&base, 10, 4));
    }

    #[test]
    fn test_log_complement_favours_values_near_one() {
        let range = ParamRange::new(0.9, 0.9999, Scale::LogComplement);
        let mut rng = StdRng::seed_from_u64(5);
        let above = (0..2000)
            .filter(|_| range.sample(&mut rng) > 0.99)
            .count();
        // Two thirds of the log mass of [1e-4, 0.1] lies below 1e-2.
        assert!(above > 800, "{above}");
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(ParamRange::new(0.5, 0.1, Scale::Linear).validate("alpha").is_err());
        assert!(ParamRange::new(0.0, 0.1, Scale::Log).validate("epsilon_min").is_err());
        assert!(ParamRange::new(0.9, 1.0, Scale::LogComplement)
            .validate("epsilon_decay")
            .is_err());
        assert!(ParamSpace::default().validate().is_ok());
    }

    #[test]
    fn test_missing_range_keeps_base() {
        let base = QLearningConfig::default();
        let space = ParamSpace {
            alpha: None,
            gamma: None,
            epsilon_decay: None,
            epsilon_min: None,
        };
        let c = space.configs(&base, 1, 0)[0];
        assert_eq!(c, SearchConfig::from_base(&base));
        assert_eq!(c.apply(&base), base);
    }
}
