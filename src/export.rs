use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::artifact::write_atomic;
use crate::backtest::BacktestReport;
use crate::series::WormSeries;

pub struct WorkbookReport {
    pub sheets: usize,
    pub rows: usize,
}

pub fn save_worm_json(path: &Path, series: &WormSeries) -> Result<()> {
    let encoded = serde_json::to_string_pretty(series).context("encode worm series")?;
    write_atomic(path, &encoded)
}

pub fn load_worm_json(path: &Path) -> Result<WormSeries> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read worm series {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("decode worm series {}", path.display()))
}

/// One worksheet per series: a header block, the sampled points, then a
/// short summary.
pub fn export_worm_workbook(path: &Path, series: &[WormSeries]) -> Result<WorkbookReport> {
    let mut workbook = Workbook::new();
    let mut rows_written = 0usize;

    for s in series {
        let rows = worm_rows(s);
        rows_written += rows.len();
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(s))?;
        write_rows(sheet, &rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(WorkbookReport { sheets: series.len(), rows: rows_written })
}

pub fn export_backtest_workbook(
    path: &Path,
    reports: &[(String, BacktestReport)],
) -> Result<WorkbookReport> {
    let mut rows = vec![vec![
        "Run".to_string(),
        "Scope".to_string(),
        "Samples".to_string(),
        "Brier".to_string(),
        "Log Loss".to_string(),
        "Accuracy".to_string(),
        "Simulated".to_string(),
    ]];
    for (name, report) in reports {
        rows.push(vec![
            name.clone(),
            "overall".to_string(),
            report.overall.samples.to_string(),
            format!("{:.4}", report.overall.brier),
            format!("{:.4}", report.overall.log_loss),
            format!("{:.4}", report.overall.accuracy),
            report.simulated.to_string(),
        ]);
        for (innings, m) in &report.by_innings {
            rows.push(vec![
                name.clone(),
                format!("innings {innings}"),
                m.samples.to_string(),
                format!("{:.4}", m.brier),
                format!("{:.4}", m.log_loss),
                format!("{:.4}", m.accuracy),
                String::new(),
            ]);
        }
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Backtest")?;
        write_rows(sheet, &rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(WorkbookReport { sheets: 1, rows: rows.len() })
}

fn worm_rows(series: &WormSeries) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["Match".to_string(), series.match_id.clone()],
        vec![
            "Teams".to_string(),
            format!("{} v {}", series.first_team, series.second_team),
        ],
        vec!["Perspective".to_string(), series.perspective.clone()],
        vec![
            "Result".to_string(),
            series.result.map(|o| o.as_str().to_string()).unwrap_or_else(|| "no result".to_string()),
        ],
        vec![],
        vec![
            "Over".to_string(),
            "Innings".to_string(),
            "Innings Over".to_string(),
            "Score".to_string(),
            "P Win".to_string(),
            "P Draw".to_string(),
            "P Loss".to_string(),
            "Simulated".to_string(),
        ],
    ];

    for p in &series.points {
        rows.push(vec![
            p.x_over.to_string(),
            p.innings.to_string(),
            p.over.to_string(),
            p.score.clone(),
            format!("{:.4}", p.p_win),
            format!("{:.4}", p.p_draw),
            format!("{:.4}", p.p_loss),
            if p.used_simulation { "yes".to_string() } else { "no".to_string() },
        ]);
    }

    rows.push(vec![]);
    rows.push(vec!["Points".to_string(), series.points.len().to_string()]);
    rows.push(vec![
        "Simulated points".to_string(),
        series.points.iter().filter(|p| p.used_simulation).count().to_string(),
    ]);
    rows.push(vec![
        "Wicket falls".to_string(),
        series.wicket_falls.len().to_string(),
    ]);
    if let Some(end) = series.match_end_over {
        rows.push(vec!["Match end over".to_string(), end.to_string()]);
    }
    rows
}

// Worksheet names top out at 31 characters.
fn sheet_name(series: &WormSeries) -> String {
    let raw = format!("{} {}", series.match_id, series.perspective);
    raw.chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { ' ' } else { c })
        .take(31)
        .collect()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
