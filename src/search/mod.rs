//! Grid and random hyperparameter search. Each configuration is an
//! independent train-and-score unit; results go to a CSV log.

mod engine;
mod csv_log;
mod space;

pub use engine::{
    ConfigEvaluator, SearchEngine, SearchResult, SearchSettings, SearchStrategy, SearchSummary,
    TargetMetric, TrainingEvaluator,
};
pub use csv_log::SearchLog;
pub use space::{ParamGrid, ParamRange, ParamSpace, Scale, SearchConfig};
