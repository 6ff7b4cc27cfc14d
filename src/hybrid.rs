use anyhow::{Result, bail};

use crate::classify::Predictor;
use crate::features::TeamContext;
use crate::match_state::{MatchState, Prob3};
use crate::monte_carlo::{self, ChaseState, DEFAULT_TRIALS, PartnershipTable};

#[derive(Debug, Clone, Copy)]
pub struct HybridPrediction {
    /// First-batting perspective, whichever path produced it.
    pub probs: Prob3,
    pub used_simulation: bool,
}

/// Routes each state to the classifier or, in a narrow fourth-innings
/// endgame, to the chase simulator. The simulator's output replaces the
/// classifier's outright; nothing is blended.
pub struct HybridPredictor<'a> {
    predictor: &'a Predictor,
    table: &'a PartnershipTable,
    trials: u32,
    seed: u64,
}

impl<'a> HybridPredictor<'a> {
    pub fn new(predictor: &'a Predictor, table: &'a PartnershipTable) -> HybridPredictor<'a> {
        HybridPredictor { predictor, table, trials: DEFAULT_TRIALS, seed: rand::random() }
    }

    /// Fixed seed and trial count, for reproducible runs.
    pub fn seeded(
        predictor: &'a Predictor,
        table: &'a PartnershipTable,
        trials: u32,
        seed: u64,
    ) -> HybridPredictor<'a> {
        HybridPredictor { predictor, table, trials, seed }
    }

    pub fn predict(&self, state: &MatchState, ctx: &TeamContext) -> Result<HybridPrediction> {
        if !monte_carlo::should_simulate(state) {
            let probs = self.predictor.predict(state, ctx)?;
            return Ok(HybridPrediction { probs, used_simulation: false });
        }
        let Some(chase) = ChaseState::from_state(state) else {
            bail!("simulation trigger fired outside a live chase");
        };
        let sim = monte_carlo::simulate_chase(&chase, self.table, self.trials, self.seed)?;
        // The simulator scores the chasing side; the report stays with the
        // side that batted first.
        Ok(HybridPrediction { probs: sim.flipped(), used_simulation: true })
    }
}
