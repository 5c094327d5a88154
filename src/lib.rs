//! # ML Tic-Tac-Toe
//!
//! Tabular Q-learning for two-player board games, with frozen multi-seed
//! evaluation, a versioned metric scorer, ELO-rated tournaments and grid or
//! random hyperparameter search.
//!
//! ## Modules
//!
//! - [`game`] — `Game` trait and the tic-tac-toe reference game
//! - [`ai`] — Q-learning agent, its frozen view and the random baseline
//! - [`training`] — Episode runner, trainer state machine, evaluation, run statistics
//! - [`scoring`] — Metric set and composite score
//! - [`checkpoint`] — Agent snapshots and metadata on disk
//! - [`rating`] — ELO arithmetic and the shared rating store
//! - [`tournament`] — Round-robin and single-elimination tournaments
//! - [`search`] — Grid and random hyperparameter search
//! - [`config`] — TOML configuration loading and validation
//! - [`error`] — Structured error types

pub mod ai;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod game;
pub mod rating;
pub mod scoring;
pub mod search;
pub mod tournament;
pub mod training;
