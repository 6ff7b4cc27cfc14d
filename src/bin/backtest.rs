use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use wicketline::artifact::ModelArtifact;
use wicketline::backtest::{self, BacktestReport};
use wicketline::classify::Predictor;
use wicketline::dataset;
use wicketline::monte_carlo::{DEFAULT_TRIALS, PartnershipTable};
use wicketline::ratings::RatingsBook;

const DEFAULT_SEED: u64 = 17;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = parse_path_arg("--db")
        .or_else(|| std::env::var("APP_DB_PATH").ok().map(PathBuf::from))
        .or_else(dataset::default_db_path)
        .context("unable to resolve sqlite path")?;
    let model_path = parse_path_arg("--model")
        .or_else(|| std::env::var("APP_MODEL_PATH").ok().map(PathBuf::from))
        .context("pass --model <artifact.json> or set APP_MODEL_PATH")?;
    let ratings_path = parse_path_arg("--ratings")
        .or_else(|| std::env::var("APP_RATINGS_PATH").ok().map(PathBuf::from));
    let hybrid = has_flag("--hybrid");
    let trials = parse_u32_arg("--trials")
        .or_else(|| env_u32("APP_TRIALS"))
        .unwrap_or(DEFAULT_TRIALS);
    let seed = parse_u64_arg("--seed").unwrap_or(DEFAULT_SEED);

    let artifact = ModelArtifact::load(&model_path)?;
    let predictor = Predictor::from_artifact(&artifact)?;
    let book = match &ratings_path {
        Some(path) => Some(RatingsBook::load(path)?),
        None => None,
    };
    let table = match parse_path_arg("--partnerships") {
        Some(path) => PartnershipTable::load(&path)?,
        None => PartnershipTable::builtin().clone(),
    };

    let conn = dataset::open_db(&db_path)?;
    let states = dataset::load_states(&conn)?;
    if states.is_empty() {
        return Err(anyhow!("no stored states in {}; run ingest first", db_path.display()));
    }

    println!("Backtest over {} stored states", states.len());
    println!("DB: {}", db_path.display());
    println!("Model: {} ({:?} features)", model_path.display(), predictor.config());
    match &ratings_path {
        Some(path) => println!("Ratings: {}", path.display()),
        None => println!("Ratings: none (base rating for every side)"),
    }
    println!();

    let classifier_report = backtest::backtest_classifier(&states, &predictor, book.as_ref())?;
    print_report("classifier", &classifier_report);

    let mut reports = vec![("classifier".to_string(), classifier_report)];
    if hybrid {
        let hybrid_report = backtest::backtest_hybrid(
            &states,
            &predictor,
            &table,
            trials,
            seed,
            book.as_ref(),
        )?;
        print_report("hybrid", &hybrid_report);
        reports.push(("hybrid".to_string(), hybrid_report));
    }

    if let Some(xlsx) = parse_path_arg("--xlsx") {
        let out = wicketline::export::export_backtest_workbook(&xlsx, &reports)?;
        println!("Workbook: {} ({} rows)", xlsx.display(), out.rows);
    }

    Ok(())
}

fn print_report(name: &str, report: &BacktestReport) {
    let m = report.overall;
    println!(
        "{name}: samples={} brier={:.4} log_loss={:.4} accuracy={:.4} simulated={}",
        m.samples, m.brier, m.log_loss, m.accuracy, report.simulated
    );
    for (innings, m) in &report.by_innings {
        println!(
            "  innings {innings}: samples={} brier={:.4} log_loss={:.4} accuracy={:.4}",
            m.samples, m.brier, m.log_loss, m.accuracy
        );
    }
    println!();
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
