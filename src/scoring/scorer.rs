//! Turns trainer output plus Q-table introspection into a [`MetricSet`].
//!
//! Rates are percentages. The composite is a fixed linear combination:
//!
//! | metric | weight | contribution |
//! |---|---|---|
//! | performance_score | 0.30 | value |
//! | efficiency_score | 0.12 | value |
//! | robustness_score | 0.15 | value |
//! | learning_speed | 0.12 | value |
//! | convergence_score | 0.08 | value |
//! | sample_efficiency | 0.10 | value * 10 |
//! | return_variance | 0.08 | 100 - value * 100 |
//! | policy_entropy | 0.05 | 100 - value * 100 |
//!
//! Undefined inputs are dropped and the remaining weights renormalised; the
//! result is clamped to [0, 100].

use crate::ai::{QLearningAgent, QTable};
use crate::game::{Action, StateKey};
use crate::training::{
    EvaluationStats, MetricsSource, OutcomeTally, RunningStats, SampledTransition, TrainingReport,
    TrainingRunStats,
};

use super::metric_set::{MetricName, MetricSet, MetricValue, METRIC_SET_VERSION};

const COMPOSITE_WEIGHTS: [(MetricName, f64); 8] = [
    (MetricName::PerformanceScore, 0.30),
    (MetricName::EfficiencyScore, 0.12),
    (MetricName::RobustnessScore, 0.15),
    (MetricName::LearningSpeed, 0.12),
    (MetricName::ConvergenceScore, 0.08),
    (MetricName::SampleEfficiency, 0.10),
    (MetricName::ReturnVariance, 0.08),
    (MetricName::PolicyEntropy, 0.05),
];

/// Everything the scorer reads. Nothing here is mutated.
pub struct ScoringInput<'a, S> {
    pub training: &'a TrainingRunStats,
    pub evaluation: &'a EvaluationStats,
    pub metrics_source: MetricsSource,
    pub table: &'a QTable<S>,
    /// Recent training transitions; empty when none were kept.
    pub transitions: &'a [SampledTransition<S>],
    /// Legal actions per state, for the Bellman fallback when no sample was
    /// kept.
    pub legal_actions: Option<&'a dyn Fn(&S) -> Vec<Action>>,
    pub gamma: f64,
    pub epsilon: f64,
    pub epsilon_min: f64,
}

impl<'a, S: StateKey> ScoringInput<'a, S> {
    pub fn from_report(report: &'a TrainingReport<S>, agent: &'a QLearningAgent<S>) -> Self {
        ScoringInput {
            training: &report.training,
            evaluation: &report.evaluation,
            metrics_source: report.metrics_source,
            table: agent.table(),
            transitions: &report.transitions,
            legal_actions: None,
            gamma: agent.config().gamma,
            epsilon: agent.epsilon(),
            epsilon_min: agent.config().epsilon_min,
        }
    }
}

/// Score a finished trainer run.
pub fn score_report<S: StateKey>(report: &TrainingReport<S>, agent: &QLearningAgent<S>) -> MetricSet {
    compute_metrics(&ScoringInput::from_report(report, agent))
}

/// Compute every metric and the composite score.
///
/// Evaluation statistics are used whenever `metrics_source` says so; rates
/// taken from training statistics are tagged approximate.
pub fn compute_metrics<S: StateKey>(input: &ScoringInput<'_, S>) -> MetricSet {
    let (tally, approx): (&OutcomeTally, bool) = match input.metrics_source {
        MetricsSource::Evaluation if !input.evaluation.is_empty() => (&input.evaluation.total, false),
        _ => (&input.training.tally, true),
    };
    let states = input.table.num_states();
    let total_episodes = input.training.episodes();
    let has_games = !tally.is_empty();

    let win_rate = tally.win_rate();
    let rated = |value: f64, defined: bool| -> MetricValue {
        if defined {
            MetricValue::tagged(value, approx)
        } else {
            MetricValue::Undefined
        }
    };

    let performance_score = rated(win_rate + 0.5 * tally.draw_rate(), has_games);
    let efficiency_score = rated(
        win_rate / ((states + 10) as f64).log10(),
        has_games && states > 0,
    );
    let robustness_score = rated(
        tally.avg_reward() * (10.0 / tally.avg_moves().max(1.0)),
        has_games,
    );
    let learning_speed = rated(
        win_rate / ((total_episodes + 10) as f64).log10(),
        has_games && total_episodes > 0,
    );
    let sample_efficiency = rated(
        win_rate / (total_episodes as f64 / 1000.0),
        has_games && total_episodes > 0,
    );
    let return_variance = rated(tally.return_variance(), has_games);

    let convergence_score = convergence_score(input.epsilon, input.epsilon_min);
    let bellman_error = bellman_error(
        input.table,
        input.transitions,
        input.legal_actions,
        input.gamma,
    );
    let policy_entropy = policy_entropy(input.table);
    let (td_error_mean, td_error_std) = td_error_stats(&input.training.td_error);

    let mut set = MetricSet {
        version: METRIC_SET_VERSION,
        metrics_source: input.metrics_source,
        win_rate,
        draw_rate: tally.draw_rate(),
        loss_rate: tally.loss_rate(),
        states_learned: states,
        total_episodes,
        performance_score,
        efficiency_score,
        robustness_score,
        learning_speed,
        convergence_score,
        bellman_error,
        td_error_mean,
        td_error_std,
        return_variance,
        sample_efficiency,
        policy_entropy,
        composite_score: MetricValue::Undefined,
        excluded_from_composite: Vec::new(),
    };
    let (composite, excluded) = composite_score(&set);
    set.composite_score = composite;
    set.excluded_from_composite = excluded;
    set
}

/// `(1 - (eps - eps_min) / (1 - eps_min)) * 100`, clamped to [0, 100].
pub fn convergence_score(epsilon: f64, epsilon_min: f64) -> MetricValue {
    if epsilon_min >= 1.0 {
        return MetricValue::Undefined;
    }
    let score = (1.0 - (epsilon - epsilon_min) / (1.0 - epsilon_min)) * 100.0;
    MetricValue::Exact(score.clamp(0.0, 100.0))
}

/// Mean `|Q(s,a) - (r + gamma * max_a' Q(s',a'))|` over the sampled
/// transitions (target `r` when terminal). The max runs over the actions
/// that were legal in `s'`, untried ones counting as 0, exactly as the
/// update rule bootstraps.
///
/// Without a sample, falls back to the table's internal consistency
/// `|Q(s,a) - gamma * max_a Q(s,.)|`, tagged approximate. With
/// `legal_actions` the max covers every legal action of `s`; without it,
/// only the stored ones.
pub fn bellman_error<S: StateKey>(
    table: &QTable<S>,
    transitions: &[SampledTransition<S>],
    legal_actions: Option<&dyn Fn(&S) -> Vec<Action>>,
    gamma: f64,
) -> MetricValue {
    if table.is_empty() {
        return MetricValue::Undefined;
    }

    if !transitions.is_empty() {
        let total: f64 = transitions
            .iter()
            .map(|sampled| {
                let t = &sampled.transition;
                let target = if t.done {
                    t.reward
                } else {
                    t.reward + gamma * table.max_value(&t.next_state, &sampled.next_legal)
                };
                (table.get(&t.state, t.action) - target).abs()
            })
            .sum();
        return MetricValue::Exact(total / transitions.len() as f64);
    }

    let mut total = 0.0;
    let mut count = 0usize;
    for (state, values) in table.iter() {
        let max_q = match legal_actions {
            Some(legal) => table.max_value(state, &legal(state)),
            None => match values.values().copied().reduce(f64::max) {
                Some(max_q) => max_q,
                None => continue,
            },
        };
        for q in values.values() {
            total += (q - gamma * max_q).abs();
            count += 1;
        }
    }
    if count == 0 {
        return MetricValue::Undefined;
    }
    MetricValue::Approximate(total / count as f64)
}

/// Mean over visited states of the softmax (temperature 1) entropy of the
/// stored Q-values, normalised by `ln(n_actions)` so it lies in [0, 1].
/// Single-action states contribute 0.
pub fn policy_entropy<S: StateKey>(table: &QTable<S>) -> MetricValue {
    let mut total = 0.0;
    let mut count = 0usize;
    for (_, values) in table.iter() {
        let n = values.len();
        if n == 0 {
            continue;
        }
        count += 1;
        if n == 1 {
            continue;
        }
        let max_q = values.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = values.values().map(|q| (q - max_q).exp()).collect();
        let sum: f64 = exps.iter().sum();
        let entropy: f64 = exps
            .iter()
            .map(|e| e / sum)
            .filter(|&p| p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        total += entropy / (n as f64).ln();
    }
    if count == 0 {
        return MetricValue::Undefined;
    }
    MetricValue::Exact((total / count as f64).clamp(0.0, 1.0))
}

fn td_error_stats(td: &RunningStats) -> (MetricValue, MetricValue) {
    if td.is_empty() {
        return (MetricValue::Undefined, MetricValue::Undefined);
    }
    (MetricValue::Exact(td.mean), MetricValue::Exact(td.std()))
}

/// Weighted composite of the set's metrics with renormalisation over the
/// defined ones. Returns the score and the names that were left out.
pub fn composite_score(set: &MetricSet) -> (MetricValue, Vec<MetricName>) {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    let mut approx = false;
    let mut excluded = Vec::new();

    for (name, weight) in COMPOSITE_WEIGHTS {
        let metric = set.get(name);
        let Some(value) = metric.value() else {
            excluded.push(name);
            continue;
        };
        let contribution = match name {
            MetricName::SampleEfficiency => value * 10.0,
            MetricName::ReturnVariance | MetricName::PolicyEntropy => 100.0 - value * 100.0,
            _ => value,
        };
        weighted += weight * contribution;
        weight_sum += weight;
        approx |= metric.is_approximate();
    }

    if weight_sum == 0.0 {
        return (MetricValue::Undefined, excluded);
    }
    let score = (weighted / weight_sum).clamp(0.0, 100.0);
    (MetricValue::tagged(score, approx), excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{QLearningConfig, Transition};
    use crate::game::{GameState, TicTacToe};
    use crate::training::{SeedStats, Trainer, TrainerConfig};

    fn tally(wins: usize, draws: usize, losses: usize, moves: usize) -> OutcomeTally {
        OutcomeTally {
            games: wins + draws + losses,
            wins,
            draws,
            losses,
            total_moves: moves,
        }
    }

    fn table_with(states: u32) -> QTable<u32> {
        let mut table = QTable::new();
        for s in 0..states {
            table.set(&s, 0, 0.5);
            table.set(&s, 1, -0.25);
        }
        table
    }

    fn eval_stats(t: OutcomeTally) -> EvaluationStats {
        EvaluationStats::from_seeds(t.games, vec![SeedStats::new(42, t)])
    }

    fn training_stats(episodes: usize) -> TrainingRunStats {
        let mut stats = TrainingRunStats {
            tally: tally(episodes / 2, episodes / 4, episodes - episodes / 2 - episodes / 4, episodes * 7),
            ..TrainingRunStats::default()
        };
        stats.td_error.push(0.5);
        stats.td_error.push(1.5);
        stats
    }

    fn input<'a>(
        training: &'a TrainingRunStats,
        evaluation: &'a EvaluationStats,
        source: MetricsSource,
        table: &'a QTable<u32>,
    ) -> ScoringInput<'a, u32> {
        ScoringInput {
            training,
            evaluation,
            metrics_source: source,
            table,
            transitions: &[],
            legal_actions: None,
            gamma: 0.9,
            epsilon: 0.01,
            epsilon_min: 0.01,
        }
    }

    #[test]
    fn test_formulas_from_evaluation() {
        let training = training_stats(1000);
        let evaluation = eval_stats(tally(60, 30, 10, 600));
        let table = table_with(90);
        let set = compute_metrics(&input(&training, &evaluation, MetricsSource::Evaluation, &table));

        assert_eq!(set.win_rate, 60.0);
        assert_eq!(set.performance_score, MetricValue::Exact(75.0));
        // log10(100) = 2
        let efficiency = set.efficiency_score.value().unwrap();
        assert!((efficiency - 30.0).abs() < 1e-9);
        // avg reward 0.5, avg moves 6
        let robustness = set.robustness_score.value().unwrap();
        assert!((robustness - 0.5 * 10.0 / 6.0).abs() < 1e-12);
        let speed = set.learning_speed.value().unwrap();
        assert!((speed - 60.0 / 1010f64.log10()).abs() < 1e-12);
        assert_eq!(set.sample_efficiency, MetricValue::Exact(60.0));
        assert_eq!(set.convergence_score, MetricValue::Exact(100.0));
        assert_eq!(set.td_error_mean, MetricValue::Exact(1.0));
        assert_eq!(set.td_error_std, MetricValue::Exact(0.5));
        assert!(set.excluded_from_composite.is_empty());
        assert!(!set.composite_score.is_approximate());
    }

    #[test]
    fn test_training_source_is_approximate() {
        let training = training_stats(400);
        let evaluation = EvaluationStats::default();
        let table = table_with(5);
        let set = compute_metrics(&input(&training, &evaluation, MetricsSource::Training, &table));
        assert!(set.performance_score.is_approximate());
        assert!(set.sample_efficiency.is_approximate());
        assert!(set.composite_score.is_approximate());
        assert_eq!(set.metrics_source, MetricsSource::Training);
        // Table-derived metrics do not depend on the source.
        assert!(!set.policy_entropy.is_approximate());
    }

    #[test]
    fn test_zero_states_is_undefined_not_zero() {
        let training = training_stats(100);
        let evaluation = eval_stats(tally(50, 0, 50, 700));
        let table = QTable::new();
        let set = compute_metrics(&input(&training, &evaluation, MetricsSource::Evaluation, &table));
        assert_eq!(set.efficiency_score, MetricValue::Undefined);
        assert_eq!(set.bellman_error, MetricValue::Undefined);
        assert_eq!(set.policy_entropy, MetricValue::Undefined);
        assert_eq!(
            set.excluded_from_composite,
            vec![MetricName::EfficiencyScore, MetricName::PolicyEntropy]
        );
        assert!(set.composite_score.is_defined());
    }

    #[test]
    fn test_renormalisation_excludes_undefined_weight() {
        let training = training_stats(100);
        let evaluation = eval_stats(tally(50, 0, 50, 700));
        let empty = QTable::new();
        let set = compute_metrics(&input(&training, &evaluation, MetricsSource::Evaluation, &empty));

        let mut expected = 0.0;
        let mut weights = 0.0;
        for (name, w) in COMPOSITE_WEIGHTS {
            if let Some(v) = set.get(name).value() {
                let c = match name {
                    MetricName::SampleEfficiency => v * 10.0,
                    MetricName::ReturnVariance | MetricName::PolicyEntropy => 100.0 - v * 100.0,
                    _ => v,
                };
                expected += w * c;
                weights += w;
            }
        }
        assert!((weights - 0.83).abs() < 1e-12);
        let composite = set.composite_score.value().unwrap();
        assert!((composite - (expected / weights).clamp(0.0, 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_composite_always_in_range() {
        let table = table_with(30);
        for episodes in [0usize, 1, 10, 5000] {
            for (w, d, l) in [(0, 0, 0), (10, 0, 0), (0, 0, 10), (3, 4, 3), (1, 9, 0)] {
                for eps in [0.0, 0.01, 0.5, 1.0] {
                    let training = training_stats(episodes);
                    let evaluation = eval_stats(tally(w, d, l, (w + d + l) * 5));
                    let mut inp = input(&training, &evaluation, MetricsSource::Evaluation, &table);
                    inp.epsilon = eps;
                    let set = compute_metrics(&inp);
                    if let Some(c) = set.composite_score.value() {
                        assert!((0.0..=100.0).contains(&c), "composite {c} out of range");
                    }
                }
            }
        }
    }

    #[test]
    fn test_convergence_score() {
        assert_eq!(convergence_score(1.0, 0.01), MetricValue::Exact(0.0));
        assert_eq!(convergence_score(0.01, 0.01), MetricValue::Exact(100.0));
        let mid = convergence_score(0.505, 0.01).value().unwrap();
        assert!((mid - 50.0).abs() < 1e-9);
        assert_eq!(convergence_score(0.5, 1.0), MetricValue::Undefined);
    }

    #[test]
    fn test_policy_entropy_bounds() {
        let mut uniform = QTable::new();
        uniform.set(&0u32, 0, 0.0);
        uniform.set(&0u32, 1, 0.0);
        uniform.set(&0u32, 2, 0.0);
        let h = policy_entropy(&uniform).value().unwrap();
        assert!((h - 1.0).abs() < 1e-12);

        let mut single = QTable::new();
        single.set(&0u32, 4, 3.0);
        assert_eq!(policy_entropy(&single), MetricValue::Exact(0.0));

        let mut peaked = QTable::new();
        peaked.set(&0u32, 0, 50.0);
        peaked.set(&0u32, 1, -50.0);
        assert!(policy_entropy(&peaked).value().unwrap() < 1e-6);
    }

    fn sampled(
        state: u32,
        reward: f64,
        next_state: u32,
        done: bool,
        next_legal: Vec<usize>,
    ) -> SampledTransition<u32> {
        SampledTransition {
            transition: Transition {
                state,
                action: 0,
                reward,
                next_state,
                done,
            },
            next_legal,
        }
    }

    #[test]
    fn test_bellman_error_with_sample_and_fallback() {
        let mut table = QTable::new();
        table.set(&0u32, 0, 0.5);
        table.set(&1u32, 0, 1.0);
        let sample = vec![
            sampled(0, 0.0, 1, false, vec![0]),
            sampled(1, 1.0, 2, true, Vec::new()),
        ];
        // |0.5 - 0.9| = 0.4 and |1.0 - 1.0| = 0
        let exact = bellman_error(&table, &sample, None, 0.9).value().unwrap();
        assert!((exact - 0.2).abs() < 1e-12);

        let fallback = bellman_error(&table, &[], None, 0.9);
        assert!(fallback.is_approximate());
        // |0.5 - 0.45| and |1.0 - 0.9|
        assert!((fallback.value().unwrap() - 0.075).abs() < 1e-12);
    }

    #[test]
    fn test_bellman_target_counts_untried_legal_actions_as_zero() {
        // Q(1, 0) = -0.5 with 1 still legal and untried, so the bootstrap is
        // 0 and Q(0, 0) = 0 is already the update's fixed point.
        let mut table = QTable::new();
        table.set(&0u32, 0, 0.0);
        table.set(&1u32, 0, -0.5);
        let sample = vec![sampled(0, 0.0, 1, false, vec![0, 1])];
        assert_eq!(bellman_error(&table, &sample, None, 0.9), MetricValue::Exact(0.0));

        // Fallback over legal actions {0, 1}: |0 - 0| and |-0.5 - 0|.
        let legal: &dyn Fn(&u32) -> Vec<usize> = &|_| vec![0, 1];
        let fallback = bellman_error(&table, &[], Some(legal), 0.9);
        assert!(fallback.is_approximate());
        assert!((fallback.value().unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_agent_update_fixed_point_has_zero_bellman_error() {
        let mut agent: QLearningAgent<u32> = QLearningAgent::new(QLearningConfig::default());
        let mut prime = Transition {
            state: 1u32,
            action: 0,
            reward: -1.0,
            next_state: 9,
            done: true,
        };
        agent.update(&prime, &[]);
        prime.state = 0;
        prime.reward = 0.0;
        prime.next_state = 1;
        prime.done = false;
        // Q(0, 0) starts at 0 and the bootstrap over {0, 1} at state 1 is 0.
        let td = agent.update(&prime, &[0, 1]).unwrap();
        assert_eq!(td, 0.0);
        let sample = vec![SampledTransition {
            transition: prime,
            next_legal: vec![0, 1],
        }];
        let error = bellman_error(agent.table(), &sample, None, agent.config().gamma);
        assert_eq!(error, MetricValue::Exact(0.0));
    }

    #[test]
    fn test_score_report_after_training() {
        let game = TicTacToe;
        let config = TrainerConfig {
            num_episodes: 300,
            eval_games: 20,
            eval_seeds: 2,
            training_seed: Some(1),
            ..TrainerConfig::default()
        };
        let mut agent: QLearningAgent<GameState> =
            QLearningAgent::with_seed(QLearningConfig::default(), 2);
        let report = Trainer::new(&game, config).unwrap().run(&mut agent).unwrap();
        let set = score_report(&report, &agent);
        assert_eq!(set.metrics_source, MetricsSource::Evaluation);
        assert_eq!(set.total_episodes, 300);
        assert_eq!(set.states_learned, agent.table().num_states());
        assert!(set.bellman_error.is_defined());
        assert!(!set.bellman_error.is_approximate());
        let composite = set.composite_score.value().unwrap();
        assert!((0.0..=100.0).contains(&composite));
    }
}
