//! Win/draw/loss probability engine for timed two-innings cricket.
//!
//! The library scores a [`match_state::MatchState`] with a trained classifier
//! ([`classify::Predictor`]), hands tight run chases to a Monte Carlo
//! simulator ([`monte_carlo`]), and turns whole matches into worm-chart
//! series ([`series`]). Offline tooling around the core lives in
//! [`cricsheet`], [`ratings`], [`dataset`], [`backtest`] and [`export`].

pub mod artifact;
pub mod backtest;
pub mod classify;
pub mod cricsheet;
pub mod dataset;
pub mod export;
pub mod features;
pub mod hybrid;
pub mod match_state;
pub mod monte_carlo;
pub mod ratings;
pub mod series;
