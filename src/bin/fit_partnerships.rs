use std::path::PathBuf;

use anyhow::{Context, Result};

use wicketline::cricsheet;
use wicketline::monte_carlo::{self, PartnershipSample};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let source = parse_path_arg("--source")
        .or_else(|| std::env::var("APP_CRICSHEET_DIR").ok().map(PathBuf::from))
        .context("pass --source <dir> or set APP_CRICSHEET_DIR")?;
    let out = parse_path_arg("--out")
        .or_else(|| std::env::var("APP_PARTNERSHIPS_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("partnerships.json"));

    let load = cricsheet::load_match_dir(&source, |done, total| {
        if done % 100 == 0 || done == total {
            println!("parsed {done}/{total} files");
        }
    })?;

    let samples: Vec<PartnershipSample> = load
        .matches
        .iter()
        .flat_map(|m| m.partnerships.iter().copied())
        .collect();
    let table = monte_carlo::fit_partnership_table(&samples);
    table.save(&out)?;

    println!("Partnership table written to {}", out.display());
    println!("Source: {}", table.source);
    println!("Stands observed: {}", samples.len());
    if !load.skipped.is_empty() {
        println!("Skipped files: {}", load.skipped.len());
    }
    println!("wicket  samples  runs(mean,cv)    overs(mean,cv)");
    for stat in &table.entries {
        println!(
            "{:>6}  {:>7}  {:>6.1}  {:>4.2}   {:>6.1}  {:>4.2}",
            stat.wicket, stat.samples, stat.mean_runs, stat.runs_cv, stat.mean_overs, stat.overs_cv
        );
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
