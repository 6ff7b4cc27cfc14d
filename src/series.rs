use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cricsheet::ParsedMatch;
use crate::features::TeamContext;
use crate::hybrid::HybridPredictor;
use crate::match_state::{MATCH_OVERS_LIMIT, Outcome, Prob3};

pub const DEFAULT_SAMPLE_EVERY: u32 = 5;
pub const DEFAULT_EXTEND_STEP: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct SeriesOptions {
    /// Emit a point every this many overs within an innings.
    pub sample_every: u32,
    /// Spacing of the flat tail appended after a decided match.
    pub extend_step: u32,
}

impl Default for SeriesOptions {
    fn default() -> SeriesOptions {
        SeriesOptions { sample_every: DEFAULT_SAMPLE_EVERY, extend_step: DEFAULT_EXTEND_STEP }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilityPoint {
    /// Cumulative-over x coordinate: innings never overlap on this axis.
    pub x_over: u32,
    pub innings: u8,
    pub over: u32,
    pub score: String,
    pub p_win: f64,
    pub p_draw: f64,
    pub p_loss: f64,
    pub used_simulation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InningsBoundary {
    pub innings: u8,
    pub x_over: u32,
    pub batting_team: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WicketFall {
    pub innings: u8,
    pub x_over: u32,
    pub wickets: u32,
    pub score: String,
}

/// Full probability trace of one match, ready for the worm chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WormSeries {
    pub match_id: String,
    pub first_team: String,
    pub second_team: String,
    /// Team whose win chance pWin reports.
    pub perspective: String,
    pub result: Option<Outcome>,
    pub points: Vec<ProbabilityPoint>,
    pub innings_boundaries: Vec<InningsBoundary>,
    pub wicket_falls: Vec<WicketFall>,
    pub match_end_over: Option<u32>,
}

impl WormSeries {
    /// The same trace seen from the other dressing room.
    pub fn flipped(&self) -> WormSeries {
        let perspective = if self.perspective == self.first_team {
            self.second_team.clone()
        } else {
            self.first_team.clone()
        };
        WormSeries {
            match_id: self.match_id.clone(),
            first_team: self.first_team.clone(),
            second_team: self.second_team.clone(),
            perspective,
            result: self.result.map(Outcome::flipped),
            points: self
                .points
                .iter()
                .map(|p| ProbabilityPoint {
                    p_win: p.p_loss,
                    p_loss: p.p_win,
                    score: p.score.clone(),
                    ..*p
                })
                .collect(),
            innings_boundaries: self.innings_boundaries.clone(),
            wicket_falls: self.wicket_falls.clone(),
            match_end_over: self.match_end_over,
        }
    }
}

fn batting_team(parsed: &ParsedMatch, innings: u8) -> String {
    if innings % 2 == 1 {
        parsed.card.first_team.clone()
    } else {
        parsed.card.second_team.clone()
    }
}

/// Sample the match into a worm trace. Points before a decided result come
/// from the hybrid predictor; once the result is known every later point is
/// the final distribution and the predictor is left alone.
pub fn build_worm_series(
    parsed: &ParsedMatch,
    ctx: &TeamContext,
    predictor: &HybridPredictor,
    opts: &SeriesOptions,
) -> Result<WormSeries> {
    let sample_every = opts.sample_every.max(1);
    let extend_step = opts.extend_step.max(1);

    // Overs actually bowled per innings fix the x offsets.
    let mut innings_len = [0u32; 4];
    for s in &parsed.snapshots {
        let idx = (s.innings - 1) as usize;
        innings_len[idx] = innings_len[idx].max(s.over + 1);
    }
    let offset_of = |innings: u8| -> u32 { innings_len[..(innings - 1) as usize].iter().sum() };

    let innings_boundaries: Vec<InningsBoundary> = (1..=4u8)
        .filter(|n| innings_len[(n - 1) as usize] > 0)
        .map(|n| InningsBoundary {
            innings: n,
            x_over: offset_of(n),
            batting_team: batting_team(parsed, n),
        })
        .collect();

    let mut wicket_falls = Vec::new();
    let mut prev_wickets = [0u32; 4];
    for s in &parsed.snapshots {
        let idx = (s.innings - 1) as usize;
        let score = s.inn[idx];
        if score.wickets > prev_wickets[idx] {
            wicket_falls.push(WicketFall {
                innings: s.innings,
                x_over: offset_of(s.innings) + s.over,
                wickets: score.wickets,
                score: format!("{}/{}", score.runs, score.wickets),
            });
        }
        prev_wickets[idx] = score.wickets;
    }

    let mut points = Vec::new();
    let mut decided: Option<Outcome> = None;
    for (i, s) in parsed.snapshots.iter().enumerate() {
        // The chase reaching its target decides the match no matter what the
        // header says; subsequent overs only confirm it.
        if decided.is_none() && s.innings == 4 && s.runs_required().is_some_and(|r| r <= 0) {
            decided = Some(Outcome::Loss);
        }

        let last_of_innings = parsed
            .snapshots
            .get(i + 1)
            .is_none_or(|next| next.innings != s.innings);
        if s.over % sample_every != 0 && !last_of_innings {
            continue;
        }

        let score = s.current_score();
        let x_over = offset_of(s.innings) + s.over;
        let (probs, used_simulation) = match decided {
            Some(outcome) => (Prob3::certain(outcome), false),
            None => {
                let pred = predictor.predict(s, ctx)?;
                (pred.probs, pred.used_simulation)
            }
        };
        points.push(ProbabilityPoint {
            x_over,
            innings: s.innings,
            over: s.over,
            score: format!("{}/{}", score.runs, score.wickets),
            p_win: probs.win,
            p_draw: probs.draw,
            p_loss: probs.loss,
            used_simulation,
        });
    }

    // Completed matches hold their final distribution out to the full 450
    // overs so traces of different lengths share an axis.
    let final_outcome = decided.or(parsed.card.outcome);
    let mut match_end_over = None;
    if let (Some(outcome), Some(last)) = (final_outcome, parsed.snapshots.last()) {
        let end_x = offset_of(last.innings) + last.over;
        match_end_over = Some(end_x);
        wicket_falls.retain(|fall| fall.x_over <= end_x);
        let certain = Prob3::certain(outcome);
        let mut x = end_x + extend_step;
        while x <= MATCH_OVERS_LIMIT as u32 {
            points.push(ProbabilityPoint {
                x_over: x,
                innings: last.innings,
                over: x - offset_of(last.innings),
                score: "match complete".to_string(),
                p_win: certain.win,
                p_draw: certain.draw,
                p_loss: certain.loss,
                used_simulation: false,
            });
            x += extend_step;
        }
    }

    Ok(WormSeries {
        match_id: parsed.card.match_id.clone(),
        first_team: parsed.card.first_team.clone(),
        second_team: parsed.card.second_team.clone(),
        perspective: parsed.card.first_team.clone(),
        result: final_outcome,
        points,
        innings_boundaries,
        wicket_falls,
        match_end_over,
    })
}
