use serde::{Deserialize, Serialize};

use crate::match_state::MatchState;

// Floors keep the chase ratios finite when overs or wickets run out.
const MIN_RUNS_PER_WICKET: f64 = 0.5;
const MIN_OVERS_DIVISOR: f64 = 0.5;

pub const SCORECARD_FEATURES: [&str; 5] = [
    "overs_left",
    "first_team_wickets_remaining",
    "second_team_wickets_remaining",
    "first_team_lead",
    "first_team_won_toss",
];

pub const TEAM_AWARE_FEATURES: [&str; 8] = [
    "overs_left",
    "first_team_wickets_remaining",
    "second_team_wickets_remaining",
    "first_team_lead",
    "first_team_is_home",
    "first_team_won_toss",
    "first_team_rating",
    "second_team_rating",
];

pub const CHASE_AWARE_FEATURES: [&str; 10] = [
    "overs_left",
    "first_team_wickets_remaining",
    "second_team_wickets_remaining",
    "first_team_lead",
    "first_team_is_home",
    "first_team_won_toss",
    "first_team_rating",
    "second_team_rating",
    "chase_ease",
    "required_run_rate",
];

/// Which feature vector a model was trained on. Order is part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureConfig {
    ScorecardOnly,
    TeamAware,
    ChaseAware,
}

impl FeatureConfig {
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            FeatureConfig::ScorecardOnly => &SCORECARD_FEATURES,
            FeatureConfig::TeamAware => &TEAM_AWARE_FEATURES,
            FeatureConfig::ChaseAware => &CHASE_AWARE_FEATURES,
        }
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Recover the config from an artifact's declared feature names.
    pub fn from_names(names: &[String]) -> Option<FeatureConfig> {
        let configs = [
            FeatureConfig::ScorecardOnly,
            FeatureConfig::TeamAware,
            FeatureConfig::ChaseAware,
        ];
        configs
            .into_iter()
            .find(|config| config.names().iter().zip(names).all(|(a, b)| a == b) && config.len() == names.len())
    }
}

/// Pre-match context the scorecard alone cannot supply.
#[derive(Debug, Clone, Copy)]
pub struct TeamContext {
    pub first_rating: f64,
    pub second_rating: f64,
    pub first_is_home: bool,
    pub first_won_toss: bool,
}

impl Default for TeamContext {
    fn default() -> TeamContext {
        TeamContext {
            first_rating: crate::ratings::BASE_RATING,
            second_rating: crate::ratings::BASE_RATING,
            first_is_home: false,
            first_won_toss: false,
        }
    }
}

/// Reward per wicket the chase can afford to spend. Higher is easier.
/// Exactly zero outside a live chase so the feature stays inert.
pub fn chase_ease(state: &MatchState) -> f64 {
    let Some(required) = state.runs_required() else {
        return 0.0;
    };
    let needed = required.max(0) as f64;
    let wickets = f64::from(state.batting_wickets_in_hand()).max(MIN_RUNS_PER_WICKET);
    let runs_per_wicket = (needed / wickets).max(MIN_RUNS_PER_WICKET);
    1.0 / runs_per_wicket
}

pub fn required_run_rate(state: &MatchState) -> f64 {
    let Some(required) = state.runs_required() else {
        return 0.0;
    };
    let needed = required.max(0) as f64;
    needed / state.overs_left.max(MIN_OVERS_DIVISOR)
}

/// Assemble the raw (unstandardized) vector in the order the config declares.
pub fn extract(state: &MatchState, ctx: &TeamContext, config: FeatureConfig) -> Vec<f64> {
    let mut out = Vec::with_capacity(config.len());
    out.push(state.overs_left);
    out.push(f64::from(state.first_wickets_remaining()));
    out.push(f64::from(state.second_wickets_remaining()));
    out.push(state.lead() as f64);
    if config == FeatureConfig::ScorecardOnly {
        out.push(if ctx.first_won_toss { 1.0 } else { 0.0 });
        return out;
    }
    out.push(if ctx.first_is_home { 1.0 } else { 0.0 });
    out.push(if ctx.first_won_toss { 1.0 } else { 0.0 });
    out.push(ctx.first_rating);
    out.push(ctx.second_rating);
    if config == FeatureConfig::ChaseAware {
        out.push(chase_ease(state));
        out.push(required_run_rate(state));
    }
    out
}
