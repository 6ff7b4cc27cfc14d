use anyhow::Result;
use rayon::prelude::*;

use crate::classify::Predictor;
use crate::dataset::StoredState;
use crate::features::TeamContext;
use crate::hybrid::HybridPredictor;
use crate::match_state::{Outcome, Prob3};
use crate::monte_carlo::PartnershipTable;
use crate::ratings::RatingsBook;

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    pub fn empty() -> Metrics {
        Metrics { samples: 0, brier: 0.0, log_loss: 0.0, accuracy: 0.0 }
    }
}

/// Proper-scoring summary of a prediction batch against realized results.
pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = Prob3::certain(*outcome);
        brier_sum +=
            (p.win - y.win).powi(2) + (p.draw - y.draw).powi(2) + (p.loss - y.loss).powi(2);

        let actual_prob = match outcome {
            Outcome::Win => p.win,
            Outcome::Draw => p.draw,
            Outcome::Loss => p.loss,
        }
        .clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if p.most_likely() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

#[derive(Debug)]
pub struct BacktestReport {
    pub overall: Metrics,
    /// Innings number paired with the metrics over states from that innings.
    pub by_innings: Vec<(u8, Metrics)>,
    /// States scored through the chase simulator rather than the classifier.
    pub simulated: usize,
}

/// Team context for a stored state. Ratings are taken as of the match date
/// so no result information leaks backwards.
pub fn context_for(row: &StoredState, book: Option<&RatingsBook>) -> TeamContext {
    match book {
        Some(book) => TeamContext {
            first_rating: book.rating_as_of(&row.first_team, &row.start_date),
            second_rating: book.rating_as_of(&row.second_team, &row.start_date),
            first_is_home: book.is_home(&row.first_team, &row.venue),
            first_won_toss: row.first_won_toss,
        },
        None => TeamContext { first_won_toss: row.first_won_toss, ..TeamContext::default() },
    }
}

pub fn backtest_classifier(
    states: &[StoredState],
    predictor: &Predictor,
    book: Option<&RatingsBook>,
) -> Result<BacktestReport> {
    let scored: Vec<(u8, Prob3, Outcome, bool)> = states
        .par_iter()
        .map(|row| {
            let ctx = context_for(row, book);
            let probs = predictor.predict(&row.state, &ctx)?;
            Ok((row.state.innings, probs, row.outcome, false))
        })
        .collect::<Result<_>>()?;
    Ok(bucket_report(scored))
}

pub fn backtest_hybrid(
    states: &[StoredState],
    predictor: &Predictor,
    table: &PartnershipTable,
    trials: u32,
    seed: u64,
    book: Option<&RatingsBook>,
) -> Result<BacktestReport> {
    let hybrid = HybridPredictor::seeded(predictor, table, trials, seed);
    let scored: Vec<(u8, Prob3, Outcome, bool)> = states
        .par_iter()
        .map(|row| {
            let ctx = context_for(row, book);
            let pred = hybrid.predict(&row.state, &ctx)?;
            Ok((row.state.innings, pred.probs, row.outcome, pred.used_simulation))
        })
        .collect::<Result<_>>()?;
    Ok(bucket_report(scored))
}

fn bucket_report(scored: Vec<(u8, Prob3, Outcome, bool)>) -> BacktestReport {
    let predictions: Vec<Prob3> = scored.iter().map(|(_, p, _, _)| *p).collect();
    let outcomes: Vec<Outcome> = scored.iter().map(|(_, _, o, _)| *o).collect();
    let overall = evaluate_probs(&predictions, &outcomes);
    let simulated = scored.iter().filter(|(_, _, _, sim)| *sim).count();

    let mut by_innings = Vec::new();
    for innings in 1..=4u8 {
        let predictions: Vec<Prob3> = scored
            .iter()
            .filter(|(i, _, _, _)| *i == innings)
            .map(|(_, p, _, _)| *p)
            .collect();
        let outcomes: Vec<Outcome> = scored
            .iter()
            .filter(|(i, _, _, _)| *i == innings)
            .map(|(_, _, o, _)| *o)
            .collect();
        if !predictions.is_empty() {
            by_innings.push((innings, evaluate_probs(&predictions, &outcomes)));
        }
    }

    BacktestReport { overall, by_innings, simulated }
}
