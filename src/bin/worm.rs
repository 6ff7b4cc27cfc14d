use std::path::PathBuf;

use anyhow::{Context, Result};

use wicketline::artifact::ModelArtifact;
use wicketline::classify::Predictor;
use wicketline::cricsheet;
use wicketline::export;
use wicketline::features::TeamContext;
use wicketline::hybrid::HybridPredictor;
use wicketline::monte_carlo::{DEFAULT_TRIALS, PartnershipTable};
use wicketline::ratings::RatingsBook;
use wicketline::series::{self, SeriesOptions};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let match_path = parse_path_arg("--match")
        .or_else(first_positional)
        .context("pass --match <cricsheet.json>")?;
    let model_path = parse_path_arg("--model")
        .or_else(|| std::env::var("APP_MODEL_PATH").ok().map(PathBuf::from))
        .context("pass --model <artifact.json> or set APP_MODEL_PATH")?;
    let out_path = parse_path_arg("--out").unwrap_or_else(|| PathBuf::from("worm.json"));
    let trials = parse_u32_arg("--trials")
        .or_else(|| env_u32("APP_TRIALS"))
        .unwrap_or(DEFAULT_TRIALS);

    let parsed = cricsheet::parse_match_file(&match_path)?;
    let artifact = ModelArtifact::load(&model_path)?;
    let predictor = Predictor::from_artifact(&artifact)?;

    let book = match parse_path_arg("--ratings")
        .or_else(|| std::env::var("APP_RATINGS_PATH").ok().map(PathBuf::from))
    {
        Some(path) => Some(RatingsBook::load(&path)?),
        None => None,
    };
    let table = match parse_path_arg("--partnerships") {
        Some(path) => PartnershipTable::load(&path)?,
        None => PartnershipTable::builtin().clone(),
    };

    let card = &parsed.card;
    let ctx = match &book {
        Some(book) => TeamContext {
            first_rating: book.rating_as_of(&card.first_team, &card.start_date),
            second_rating: book.rating_as_of(&card.second_team, &card.start_date),
            first_is_home: book.is_home(&card.first_team, &card.venue),
            first_won_toss: card.first_won_toss,
        },
        None => TeamContext { first_won_toss: card.first_won_toss, ..TeamContext::default() },
    };

    let hybrid = match parse_u64_arg("--seed") {
        Some(seed) => HybridPredictor::seeded(&predictor, &table, trials, seed),
        None => HybridPredictor::new(&predictor, &table),
    };

    let opts = SeriesOptions {
        sample_every: parse_u32_arg("--every").unwrap_or(series::DEFAULT_SAMPLE_EVERY),
        ..SeriesOptions::default()
    };
    let mut worm = series::build_worm_series(&parsed, &ctx, &hybrid, &opts)?;
    if has_flag("--flip") {
        worm = worm.flipped();
    }

    export::save_worm_json(&out_path, &worm)?;

    println!("Worm series written to {}", out_path.display());
    println!("Match: {} ({} v {})", worm.match_id, worm.first_team, worm.second_team);
    println!("Perspective: {}", worm.perspective);
    match worm.result {
        Some(outcome) => println!("Result: {}", outcome.as_str()),
        None => println!("Result: none recorded"),
    }
    println!("Points: {}", worm.points.len());
    println!(
        "Simulated points: {}",
        worm.points.iter().filter(|p| p.used_simulation).count()
    );
    if let Some(end) = worm.match_end_over {
        println!("Decided at over {end}");
    }

    if let Some(xlsx) = parse_path_arg("--xlsx") {
        let report = export::export_worm_workbook(&xlsx, std::slice::from_ref(&worm))?;
        println!("Workbook: {} ({} rows)", xlsx.display(), report.rows);
    }

    Ok(())
}

fn first_positional() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_value = false;
    for arg in &args {
        if skip_value {
            skip_value = false;
            continue;
        }
        if let Some(flag) = arg.strip_prefix("--") {
            // `--flag value` consumes the next token unless written as --flag=value.
            skip_value = !flag.contains('=') && !matches!(flag, "flip");
            continue;
        }
        return Some(PathBuf::from(arg));
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_u32_arg(name: &str) -> Option<u32> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u32>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u32>()
        {
            return Some(v);
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.trim().parse::<u32>().ok()
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
