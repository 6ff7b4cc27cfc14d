use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::match_state::{InningsScore, MATCH_OVERS_LIMIT, MatchState, Outcome, WICKETS_PER_INNINGS};
use crate::monte_carlo::PartnershipSample;

const BALLS_PER_OVER: f64 = 6.0;
const MAX_INNINGS: usize = 4;

#[derive(Debug, Deserialize)]
struct RawMatch {
    info: RawInfo,
    #[serde(default)]
    innings: Vec<RawInnings>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    teams: Vec<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    dates: Vec<String>,
    #[serde(default)]
    toss: Option<RawToss>,
    #[serde(default)]
    outcome: Option<RawOutcome>,
}

#[derive(Debug, Deserialize)]
struct RawToss {
    winner: String,
}

#[derive(Debug, Deserialize)]
struct RawOutcome {
    #[serde(default)]
    winner: Option<String>,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInnings {
    team: String,
    #[serde(default)]
    overs: Vec<RawOver>,
}

#[derive(Debug, Deserialize)]
struct RawOver {
    #[serde(default)]
    deliveries: Vec<RawDelivery>,
}

#[derive(Debug, Deserialize)]
struct RawDelivery {
    runs: RawRuns,
    #[serde(default)]
    wickets: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRuns {
    total: i64,
}

/// Header facts for one match. Dates stay as ISO strings so chronology is
/// plain string order.
#[derive(Debug, Clone)]
pub struct MatchCard {
    pub match_id: String,
    pub first_team: String,
    pub second_team: String,
    pub venue: String,
    pub start_date: String,
    pub first_won_toss: bool,
    /// First-batting perspective. None for ties, no-results and live matches.
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone)]
pub struct ParsedMatch {
    pub card: MatchCard,
    /// One snapshot per completed over, in playing order.
    pub snapshots: Vec<MatchState>,
    /// Completed stands only; the not-out stand at an innings close is censored.
    pub partnerships: Vec<PartnershipSample>,
}

#[derive(Debug, Default)]
pub struct DirLoad {
    pub matches: Vec<ParsedMatch>,
    /// Files that failed to parse, with the reason.
    pub skipped: Vec<String>,
}

pub fn parse_match_str(raw: &str, match_id: &str) -> Result<ParsedMatch> {
    let parsed: RawMatch = serde_json::from_str(raw).context("decode match json")?;
    if parsed.info.teams.len() != 2 {
        bail!("match file lists {} teams, want 2", parsed.info.teams.len());
    }

    // The side that takes innings 1 also takes innings 3.
    let first_team = parsed
        .innings
        .first()
        .map(|inn| inn.team.clone())
        .unwrap_or_else(|| parsed.info.teams[0].clone());
    let second_team = parsed
        .info
        .teams
        .iter()
        .find(|t| **t != first_team)
        .cloned()
        .unwrap_or_default();

    let venue = match (&parsed.info.venue, &parsed.info.city) {
        (Some(v), Some(c)) if !c.is_empty() && !v.contains(c.as_str()) => format!("{v}, {c}"),
        (Some(v), _) => v.clone(),
        (None, Some(c)) => c.clone(),
        (None, None) => String::new(),
    };

    let outcome = parsed.info.outcome.as_ref().and_then(|o| {
        if let Some(winner) = &o.winner {
            if *winner == first_team {
                Some(Outcome::Win)
            } else if *winner == second_team {
                Some(Outcome::Loss)
            } else {
                None
            }
        } else if o.result.as_deref().is_some_and(|r| r.contains("draw")) {
            Some(Outcome::Draw)
        } else {
            None
        }
    });

    let card = MatchCard {
        match_id: match_id.to_string(),
        first_team: first_team.clone(),
        second_team,
        venue,
        start_date: parsed.info.dates.first().cloned().unwrap_or_default(),
        first_won_toss: parsed.info.toss.as_ref().is_some_and(|t| t.winner == first_team),
        outcome,
    };

    let (snapshots, partnerships) = walk_innings(&parsed.innings);
    Ok(ParsedMatch { card, snapshots, partnerships })
}

pub fn parse_match_file(path: &Path) -> Result<ParsedMatch> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let match_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    parse_match_str(&raw, &match_id).with_context(|| format!("parse {}", path.display()))
}

/// Load every *.json under `dir`. Unparseable files are noted and skipped,
/// never fatal. `on_progress` fires after each file with (done, total).
pub fn load_match_dir(dir: &Path, mut on_progress: impl FnMut(usize, usize)) -> Result<DirLoad> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("read match directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let total = paths.len();
    let mut load = DirLoad::default();
    for (done, path) in paths.iter().enumerate() {
        match parse_match_file(path) {
            Ok(parsed) => load.matches.push(parsed),
            Err(err) => load.skipped.push(format!("{}: {err:#}", path.display())),
        }
        on_progress(done + 1, total);
    }
    Ok(load)
}

fn walk_innings(innings: &[RawInnings]) -> (Vec<MatchState>, Vec<PartnershipSample>) {
    let mut snapshots = Vec::new();
    let mut partnerships = Vec::new();
    let mut tallies = [InningsScore::default(); 4];
    // Overs already used by completed innings, in fractional overs.
    let mut cumulative_overs = 0.0;

    for (idx, inn) in innings.iter().enumerate().take(MAX_INNINGS) {
        let innings_no = idx as u8 + 1;
        let mut runs: i64 = 0;
        let mut wickets: u32 = 0;
        let mut balls: u32 = 0;

        // Partnership bookkeeping within this innings.
        let mut stand_start_runs: i64 = 0;
        let mut stand_start_balls: u32 = 0;

        for (over_idx, over) in inn.overs.iter().enumerate() {
            for delivery in &over.deliveries {
                runs += delivery.runs.total;
                balls += 1;
                for _ in &delivery.wickets {
                    wickets += 1;
                    partnerships.push(PartnershipSample {
                        wicket: wickets,
                        runs: (runs - stand_start_runs) as f64,
                        overs: f64::from(balls - stand_start_balls) / BALLS_PER_OVER,
                    });
                    stand_start_runs = runs;
                    stand_start_balls = balls;
                }
            }

            tallies[idx] = InningsScore { runs, wickets };
            let bowled = cumulative_overs + over_idx as f64 + 1.0;
            snapshots.push(MatchState::new(
                innings_no,
                over_idx as u32,
                (MATCH_OVERS_LIMIT - bowled).max(0.0),
                tallies,
            ));

            if wickets >= WICKETS_PER_INNINGS {
                break;
            }
        }

        tallies[idx] = InningsScore { runs, wickets };
        cumulative_overs += f64::from(balls) / BALLS_PER_OVER;
    }

    (snapshots, partnerships)
}
