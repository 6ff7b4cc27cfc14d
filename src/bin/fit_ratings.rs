use std::path::PathBuf;

use anyhow::{Context, Result};

use wicketline::cricsheet::{self, MatchCard};
use wicketline::ratings;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let source = parse_path_arg("--source")
        .or_else(|| std::env::var("APP_CRICSHEET_DIR").ok().map(PathBuf::from))
        .context("pass --source <dir> or set APP_CRICSHEET_DIR")?;
    let out = parse_path_arg("--out")
        .or_else(|| std::env::var("APP_RATINGS_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("ratings.json"));

    let load = cricsheet::load_match_dir(&source, |done, total| {
        if done % 100 == 0 || done == total {
            println!("parsed {done}/{total} files");
        }
    })?;

    let cards: Vec<MatchCard> = load.matches.iter().map(|m| m.card.clone()).collect();
    let book = ratings::build_book(&cards);
    book.save(&out)?;

    println!("Ratings book written to {}", out.display());
    println!("Matches rated: {}", book.history.len());
    println!("Teams: {}", book.current.len());
    if !load.skipped.is_empty() {
        println!("Skipped files: {}", load.skipped.len());
    }

    let mut table: Vec<(&String, &f64)> = book.current.iter().collect();
    table.sort_by(|a, b| b.1.total_cmp(a.1));
    for (team, rating) in table.iter().take(12) {
        println!("{rating:7.1}  {team}");
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
