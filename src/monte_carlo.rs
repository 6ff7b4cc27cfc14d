use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::match_state::{MatchState, Outcome, Prob3, WICKETS_PER_INNINGS};

pub const PARTNERSHIP_VERSION: u32 = 1;
pub const DEFAULT_TRIALS: u32 = 5_000;

// Trigger thresholds: the classifier goes blind late in a long chase, so the
// simulator takes over once the endgame is narrow but time is plentiful.
pub const TRIGGER_MAX_WICKETS_LEFT: u32 = 3;
pub const TRIGGER_MAX_RUNS_REQUIRED: i64 = 80;
pub const TRIGGER_MIN_OVERS_LEFT: f64 = 30.0;

// Fitted rows with fewer observations than this fall back to the defaults.
const MIN_FIT_SAMPLES: usize = 20;
const CV_FLOOR: f64 = 0.25;
const CV_CEIL: f64 = 2.5;

/// Runs and overs profile for the stand ending in a given wicket (1..=10).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnershipStat {
    pub wicket: u32,
    pub mean_runs: f64,
    pub mean_overs: f64,
    /// Coefficient of variation (sd over mean) for the gamma draw.
    pub runs_cv: f64,
    pub overs_cv: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnershipTable {
    pub version: u32,
    pub source: String,
    pub entries: Vec<PartnershipStat>,
}

// Long-format priors, used until a fitted table is supplied.
static BUILTIN: Lazy<PartnershipTable> = Lazy::new(|| {
    let rows: [(f64, f64, f64, f64); 10] = [
        (36.8, 12.9, 1.02, 0.96),
        (41.9, 14.1, 1.04, 0.98),
        (44.6, 14.9, 1.05, 0.99),
        (42.3, 13.8, 1.06, 1.00),
        (37.4, 12.0, 1.07, 1.01),
        (31.8, 10.1, 1.09, 1.03),
        (26.1, 8.2, 1.12, 1.06),
        (20.7, 6.4, 1.16, 1.10),
        (15.6, 4.8, 1.20, 1.14),
        (11.2, 3.4, 1.24, 1.18),
    ];
    PartnershipTable {
        version: PARTNERSHIP_VERSION,
        source: "long-format priors".to_string(),
        entries: rows
            .iter()
            .enumerate()
            .map(|(idx, &(mean_runs, mean_overs, runs_cv, overs_cv))| PartnershipStat {
                wicket: idx as u32 + 1,
                mean_runs,
                mean_overs,
                runs_cv,
                overs_cv,
                samples: 0,
            })
            .collect(),
    }
});

impl PartnershipTable {
    pub fn builtin() -> &'static PartnershipTable {
        &BUILTIN
    }

    pub fn stat(&self, wicket: u32) -> Option<&PartnershipStat> {
        self.entries.get(wicket.checked_sub(1)? as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != PARTNERSHIP_VERSION {
            bail!(
                "partnership table version {} does not match supported version {}",
                self.version,
                PARTNERSHIP_VERSION
            );
        }
        if self.entries.len() != WICKETS_PER_INNINGS as usize {
            bail!("partnership table has {} rows, want {}", self.entries.len(), WICKETS_PER_INNINGS);
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.wicket != idx as u32 + 1 {
                bail!("partnership row {idx} labelled wicket {}", entry.wicket);
            }
            if entry.mean_runs <= 0.0 || entry.mean_overs <= 0.0 {
                bail!("partnership row for wicket {} has nonpositive means", entry.wicket);
            }
            if entry.runs_cv <= 0.0 || entry.overs_cv <= 0.0 {
                bail!("partnership row for wicket {} has nonpositive spread", entry.wicket);
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<PartnershipTable> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read partnership table {}", path.display()))?;
        let table: PartnershipTable = serde_json::from_str(&raw)
            .with_context(|| format!("parse partnership table {}", path.display()))?;
        table
            .validate()
            .with_context(|| format!("validate partnership table {}", path.display()))?;
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate().context("refusing to save an invalid partnership table")?;
        let json = serde_json::to_string_pretty(self).context("serialize partnership table")?;
        crate::artifact::write_atomic(path, &json)
    }
}

/// One observed stand: the wicket position it ended at plus its size.
#[derive(Debug, Clone, Copy)]
pub struct PartnershipSample {
    pub wicket: u32,
    pub runs: f64,
    pub overs: f64,
}

/// Reduce observed stands to per-position gamma parameters. Positions with
/// too few observations keep the builtin row.
pub fn fit_partnership_table(samples: &[PartnershipSample]) -> PartnershipTable {
    let builtin = PartnershipTable::builtin();
    let mut entries = Vec::with_capacity(WICKETS_PER_INNINGS as usize);
    for wicket in 1..=WICKETS_PER_INNINGS {
        let runs: Vec<f64> = samples.iter().filter(|s| s.wicket == wicket).map(|s| s.runs).collect();
        let overs: Vec<f64> = samples.iter().filter(|s| s.wicket == wicket).map(|s| s.overs).collect();
        if runs.len() < MIN_FIT_SAMPLES {
            let mut row = builtin.entries[wicket as usize - 1];
            row.samples = runs.len();
            entries.push(row);
            continue;
        }
        let (mean_runs, runs_cv) = mean_and_cv(&runs);
        let (mean_overs, overs_cv) = mean_and_cv(&overs);
        entries.push(PartnershipStat {
            wicket,
            mean_runs: mean_runs.max(0.5),
            mean_overs: mean_overs.max(0.2),
            runs_cv,
            overs_cv,
            samples: runs.len(),
        });
    }
    PartnershipTable {
        version: PARTNERSHIP_VERSION,
        source: format!("fitted from {} partnerships", samples.len()),
        entries,
    }
}

fn mean_and_cv(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let cv = if mean > 0.0 { (var.sqrt() / mean).clamp(CV_FLOOR, CV_CEIL) } else { CV_FLOOR };
    (mean, cv)
}

/// Fourth-innings endgame as the simulator sees it.
#[derive(Debug, Clone, Copy)]
pub struct ChaseState {
    pub runs_required: i64,
    pub wickets_down: u32,
    pub overs_remaining: f64,
}

impl ChaseState {
    /// Only meaningful for a live fourth-innings chase.
    pub fn from_state(state: &MatchState) -> Option<ChaseState> {
        let required = state.runs_required()?;
        Some(ChaseState {
            runs_required: required,
            wickets_down: state.inn[3].wickets,
            overs_remaining: state.overs_left,
        })
    }
}

/// When the simulator replaces the classifier: a narrow fourth-innings
/// endgame with plenty of overs, where scoreboard features stop separating
/// the three results.
pub fn should_simulate(state: &MatchState) -> bool {
    if state.innings != 4 {
        return false;
    }
    let Some(required) = state.runs_required() else {
        return false;
    };
    if required <= 0 {
        return false;
    }
    let wickets_left = WICKETS_PER_INNINGS.saturating_sub(state.inn[3].wickets);
    if wickets_left == 0 {
        return false;
    }
    (wickets_left <= TRIGGER_MAX_WICKETS_LEFT || required <= TRIGGER_MAX_RUNS_REQUIRED)
        && state.overs_left > TRIGGER_MIN_OVERS_LEFT
}

struct PartnershipDraw {
    runs: Gamma<f64>,
    overs: Gamma<f64>,
}

fn gamma_from(mean: f64, cv: f64) -> Result<Gamma<f64>> {
    let shape = 1.0 / (cv * cv);
    let scale = mean * cv * cv;
    Gamma::new(shape, scale).map_err(|e| anyhow!("gamma parameters mean={mean} cv={cv}: {e}"))
}

fn run_trial(samplers: &[PartnershipDraw], chase: &ChaseState, rng: &mut ChaCha8Rng) -> Outcome {
    let required = chase.runs_required as f64;
    let mut runs = 0.0;
    let mut overs = 0.0;
    for draw in samplers {
        let stand_runs = draw.runs.sample(rng);
        let stand_overs = draw.overs.sample(rng);
        let left = chase.overs_remaining - overs;
        if stand_overs >= left {
            // The clock cuts the stand short; runs scale with the share played.
            let frac = if stand_overs > 0.0 { (left / stand_overs).max(0.0) } else { 0.0 };
            runs += stand_runs * frac;
            return if runs >= required { Outcome::Win } else { Outcome::Draw };
        }
        runs += stand_runs;
        overs += stand_overs;
        if runs >= required {
            return Outcome::Win;
        }
    }
    // Ten down short of the target.
    Outcome::Loss
}

/// Empirical win/draw/loss fractions over `trials` simulated endgames, from
/// the chasing side's point of view. Deterministic for a given seed.
pub fn simulate_chase(
    chase: &ChaseState,
    table: &PartnershipTable,
    trials: u32,
    seed: u64,
) -> Result<Prob3> {
    debug_assert!(chase.wickets_down < WICKETS_PER_INNINGS, "no live chase without wickets in hand");
    if chase.wickets_down >= WICKETS_PER_INNINGS {
        bail!("chase simulation invoked with all ten wickets down");
    }
    if chase.runs_required <= 0 {
        bail!("chase simulation invoked after the target was reached");
    }
    if trials == 0 {
        bail!("chase simulation needs at least one trial");
    }
    table.validate()?;

    let samplers: Vec<PartnershipDraw> = table.entries[chase.wickets_down as usize..]
        .iter()
        .map(|stat| {
            Ok(PartnershipDraw {
                runs: gamma_from(stat.mean_runs, stat.runs_cv)?,
                overs: gamma_from(stat.mean_overs, stat.overs_cv)?,
            })
        })
        .collect::<Result<_>>()?;

    // One counter-stream per trial keeps the result independent of how rayon
    // schedules the work.
    let (win, draw, loss) = (0..trials)
        .into_par_iter()
        .map(|trial| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(u64::from(trial)));
            run_trial(&samplers, chase, &mut rng)
        })
        .fold(
            || (0u64, 0u64, 0u64),
            |mut acc, outcome| {
                match outcome {
                    Outcome::Win => acc.0 += 1,
                    Outcome::Draw => acc.1 += 1,
                    Outcome::Loss => acc.2 += 1,
                }
                acc
            },
        )
        .reduce(|| (0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    let n = f64::from(trials);
    Ok(Prob3 { win: win as f64 / n, draw: draw as f64 / n, loss: loss as f64 / n })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::match_state::InningsScore;

    fn fourth_innings(required_left: i64, wickets_down: u32, overs_left: f64) -> MatchState {
        // Target = 281; innings-4 runs fill in the rest.
        let inn4 = 281 - required_left;
        MatchState::new(
            4,
            0,
            overs_left,
            [
                InningsScore { runs: 300, wickets: 10 },
                InningsScore { runs: 220, wickets: 10 },
                InningsScore { runs: 200, wickets: 10 },
                InningsScore { runs: inn4, wickets: wickets_down },
            ],
        )
    }

    #[test]
    fn builtin_table_is_well_formed() {
        assert!(PartnershipTable::builtin().validate().is_ok());
        let opener = PartnershipTable::builtin().stat(1).unwrap();
        assert_eq!(opener.wicket, 1);
        assert!(opener.mean_runs > 0.0);
    }

    #[test]
    fn trigger_needs_a_narrow_endgame_and_time() {
        // Close on runs, time available.
        assert!(should_simulate(&fourth_innings(65, 0, 110.0)));
        // Close on wickets even with a mountain of runs left.
        assert!(should_simulate(&fourth_innings(200, 7, 110.0)));
        // Neither margin narrow.
        assert!(!should_simulate(&fourth_innings(200, 4, 110.0)));
        // Out of time: the classifier keeps the call.
        assert!(!should_simulate(&fourth_innings(65, 0, 30.0)));
        assert!(should_simulate(&fourth_innings(65, 0, 30.5)));
        // Boundary on runs.
        assert!(should_simulate(&fourth_innings(80, 4, 110.0)));
        assert!(!should_simulate(&fourth_innings(81, 4, 110.0)));
        // Boundary on wickets.
        assert!(should_simulate(&fourth_innings(81, 7, 110.0)));
        assert!(!should_simulate(&fourth_innings(81, 6, 110.0)));
    }

    #[test]
    fn trigger_ignores_other_innings_and_dead_chases() {
        let mut third = fourth_innings(65, 0, 110.0);
        third.innings = 3;
        assert!(!should_simulate(&third));
        // Target already reached.
        assert!(!should_simulate(&fourth_innings(0, 2, 110.0)));
        // All out: no live chase.
        assert!(!should_simulate(&fourth_innings(65, 10, 110.0)));
    }

    #[test]
    fn all_out_chase_is_a_contract_violation() {
        let chase = ChaseState { runs_required: 40, wickets_down: 10, overs_remaining: 80.0 };
        let result = std::panic::catch_unwind(|| {
            simulate_chase(&chase, PartnershipTable::builtin(), 10, 7)
        });
        // Debug builds assert; release builds surface an error.
        match result {
            Ok(inner) => assert!(inner.is_err()),
            Err(_) => {}
        }
    }

    #[test]
    fn same_seed_reproduces_the_estimate() {
        let chase = ChaseState { runs_required: 120, wickets_down: 5, overs_remaining: 60.0 };
        let a = simulate_chase(&chase, PartnershipTable::builtin(), 2_000, 42).unwrap();
        let b = simulate_chase(&chase, PartnershipTable::builtin(), 2_000, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fractions_sum_to_one() {
        let chase = ChaseState { runs_required: 90, wickets_down: 6, overs_remaining: 55.0 };
        let probs = simulate_chase(&chase, PartnershipTable::builtin(), 3_000, 9).unwrap();
        assert_abs_diff_eq!(probs.sum(), 1.0, epsilon = 1e-12);
        assert!(probs.win > 0.0 && probs.loss > 0.0);
    }

    #[test]
    fn tiny_target_with_wickets_in_hand_is_nearly_certain() {
        let chase = ChaseState { runs_required: 10, wickets_down: 0, overs_remaining: 200.0 };
        let probs = simulate_chase(&chase, PartnershipTable::builtin(), 5_000, 11).unwrap();
        assert!(probs.win > 0.9, "pWin was {}", probs.win);
    }

    #[test]
    fn no_overs_left_forces_the_draw() {
        let chase = ChaseState { runs_required: 50, wickets_down: 2, overs_remaining: 0.0 };
        let probs = simulate_chase(&chase, PartnershipTable::builtin(), 500, 3).unwrap();
        assert_abs_diff_eq!(probs.draw, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn fit_recovers_sample_moments() {
        // 40 identical stands at wicket 1: mean exact, cv clamped to the floor.
        let mut samples = vec![PartnershipSample { wicket: 1, runs: 30.0, overs: 10.0 }; 40];
        // A couple of stragglers elsewhere keep the fallback path exercised.
        samples.push(PartnershipSample { wicket: 2, runs: 12.0, overs: 3.0 });
        let table = fit_partnership_table(&samples);
        assert!(table.validate().is_ok());

        let fitted = table.stat(1).unwrap();
        assert_abs_diff_eq!(fitted.mean_runs, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fitted.runs_cv, CV_FLOOR, epsilon = 1e-12);
        assert_eq!(fitted.samples, 40);

        let fallback = table.stat(2).unwrap();
        assert_eq!(fallback.samples, 1);
        assert_abs_diff_eq!(
            fallback.mean_runs,
            PartnershipTable::builtin().stat(2).unwrap().mean_runs,
            epsilon = 1e-12
        );
    }

    #[test]
    fn table_rejects_bad_rows() {
        let mut table = PartnershipTable::builtin().clone();
        table.entries[4].mean_runs = 0.0;
        assert!(table.validate().is_err());

        let mut short = PartnershipTable::builtin().clone();
        short.entries.pop();
        assert!(short.validate().is_err());
    }
}
