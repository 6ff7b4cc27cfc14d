use std::path::PathBuf;

use anyhow::{Context, Result};

use wicketline::cricsheet;
use wicketline::dataset::{self, IngestCounts};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let source = parse_path_arg("--source")
        .or_else(|| std::env::var("APP_CRICSHEET_DIR").ok().map(PathBuf::from))
        .context("pass --source <dir> or set APP_CRICSHEET_DIR")?;
    let db_path = parse_path_arg("--db")
        .or_else(|| std::env::var("APP_DB_PATH").ok().map(PathBuf::from))
        .or_else(dataset::default_db_path)
        .context("unable to resolve sqlite path")?;

    let load = cricsheet::load_match_dir(&source, |done, total| {
        if done % 100 == 0 || done == total {
            println!("parsed {done}/{total} files");
        }
    })?;

    let mut conn = dataset::open_db(&db_path)?;
    let files_total = load.matches.len() + load.skipped.len();
    let run_id = dataset::begin_ingest_run(&conn, &source.display().to_string(), files_total)?;

    let mut counts = IngestCounts::default();
    let mut errors = load.skipped.clone();
    for parsed in &load.matches {
        if parsed.card.outcome.is_none() {
            counts.skipped_no_result += 1;
            continue;
        }
        match dataset::store_match(&mut conn, parsed) {
            Ok(states) => {
                counts.matches_upserted += 1;
                counts.states_upserted += states;
            }
            Err(err) => errors.push(format!("{}: {err:#}", parsed.card.match_id)),
        }
    }
    dataset::finish_ingest_run(&conn, run_id, load.matches.len(), &counts, &errors)?;

    println!("Cricsheet ingest complete");
    println!("DB: {}", db_path.display());
    println!("Files parsed: {}/{}", load.matches.len(), files_total);
    println!("Matches upserted: {}", counts.matches_upserted);
    println!("Over states upserted: {}", counts.states_upserted);
    println!("Skipped (no decided result): {}", counts.skipped_no_result);
    if !errors.is_empty() {
        println!("Errors: {}", errors.len());
        for err in errors.iter().take(6) {
            println!(" - {err}");
        }
    }

    Ok(())
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
