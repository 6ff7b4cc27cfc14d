use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::cricsheet::ParsedMatch;
use crate::match_state::{InningsScore, MatchState, Outcome};

const DB_DIR: &str = "wicketline";
const DB_FILE: &str = "matches.sqlite";

/// One over-state row joined with its match header, ready for scoring.
#[derive(Debug, Clone)]
pub struct StoredState {
    pub match_id: String,
    pub first_team: String,
    pub second_team: String,
    pub venue: String,
    pub start_date: String,
    pub first_won_toss: bool,
    pub outcome: Outcome,
    pub state: MatchState,
}

#[derive(Debug, Default)]
pub struct IngestCounts {
    pub matches_upserted: usize,
    pub states_upserted: usize,
    pub skipped_no_result: usize,
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache, fall back to ~/.cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(DB_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(DB_DIR))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            first_team TEXT NOT NULL,
            second_team TEXT NOT NULL,
            venue TEXT NOT NULL,
            start_date TEXT NOT NULL,
            first_won_toss INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(start_date);

        CREATE TABLE IF NOT EXISTS over_states (
            match_id TEXT NOT NULL,
            innings INTEGER NOT NULL,
            over INTEGER NOT NULL,
            overs_left REAL NOT NULL,
            inn1_runs INTEGER NOT NULL,
            inn1_wkts INTEGER NOT NULL,
            inn2_runs INTEGER NOT NULL,
            inn2_wkts INTEGER NOT NULL,
            inn3_runs INTEGER NOT NULL,
            inn3_wkts INTEGER NOT NULL,
            inn4_runs INTEGER NOT NULL,
            inn4_wkts INTEGER NOT NULL,
            PRIMARY KEY (match_id, innings, over)
        );
        CREATE INDEX IF NOT EXISTS idx_states_match ON over_states(match_id);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            source_dir TEXT NOT NULL,
            files_total INTEGER NOT NULL,
            files_parsed INTEGER NOT NULL,
            matches_upserted INTEGER NOT NULL,
            states_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn begin_ingest_run(conn: &Connection, source_dir: &str, files_total: usize) -> Result<i64> {
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, source_dir, files_total, files_parsed, matches_upserted, states_upserted, errors_json)
         VALUES (?1, NULL, ?2, ?3, 0, 0, 0, '[]')",
        params![started_at, source_dir, files_total as i64],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_ingest_run(
    conn: &Connection,
    run_id: i64,
    files_parsed: usize,
    counts: &IngestCounts,
    errors: &[String],
) -> Result<()> {
    let finished_at = Utc::now().to_rfc3339();
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, files_parsed = ?2, matches_upserted = ?3, states_upserted = ?4, errors_json = ?5
         WHERE run_id = ?6",
        params![
            finished_at,
            files_parsed as i64,
            counts.matches_upserted as i64,
            counts.states_upserted as i64,
            errors_json,
            run_id
        ],
    )
    .context("update ingest run")?;
    Ok(())
}

/// Upsert a match header and its over states in one transaction. Matches
/// without a decided result are not training data and are rejected here.
pub fn store_match(conn: &mut Connection, parsed: &ParsedMatch) -> Result<usize> {
    let card = &parsed.card;
    let outcome = card
        .outcome
        .ok_or_else(|| anyhow!("match {} has no decided result", card.match_id))?;

    let tx = conn.transaction().context("begin store transaction")?;
    tx.execute(
        r#"
        INSERT INTO matches (
            match_id, first_team, second_team, venue, start_date,
            first_won_toss, outcome, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(match_id) DO UPDATE SET
            first_team = excluded.first_team,
            second_team = excluded.second_team,
            venue = excluded.venue,
            start_date = excluded.start_date,
            first_won_toss = excluded.first_won_toss,
            outcome = excluded.outcome,
            updated_at = excluded.updated_at
        "#,
        params![
            card.match_id,
            card.first_team,
            card.second_team,
            card.venue,
            card.start_date,
            card.first_won_toss,
            outcome.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert match header")?;

    // Replace the state rows wholesale: a re-ingest may have fewer overs if
    // the source file was corrected.
    tx.execute("DELETE FROM over_states WHERE match_id = ?1", params![card.match_id])
        .context("clear old over states")?;
    let mut written = 0usize;
    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO over_states (
                    match_id, innings, over, overs_left,
                    inn1_runs, inn1_wkts, inn2_runs, inn2_wkts,
                    inn3_runs, inn3_wkts, inn4_runs, inn4_wkts
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .context("prepare over state insert")?;
        for s in &parsed.snapshots {
            stmt.execute(params![
                card.match_id,
                i64::from(s.innings),
                i64::from(s.over),
                s.overs_left,
                s.inn[0].runs,
                i64::from(s.inn[0].wickets),
                s.inn[1].runs,
                i64::from(s.inn[1].wickets),
                s.inn[2].runs,
                i64::from(s.inn[2].wickets),
                s.inn[3].runs,
                i64::from(s.inn[3].wickets),
            ])
            .context("insert over state")?;
            written += 1;
        }
    }
    tx.commit().context("commit store transaction")?;
    Ok(written)
}

pub fn count_matches(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))
        .context("count matches")
}

/// Every stored over state with its match header, chronological.
pub fn load_states(conn: &Connection) -> Result<Vec<StoredState>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                s.match_id, m.first_team, m.second_team, m.venue, m.start_date,
                m.first_won_toss, m.outcome,
                s.innings, s.over, s.overs_left,
                s.inn1_runs, s.inn1_wkts, s.inn2_runs, s.inn2_wkts,
                s.inn3_runs, s.inn3_wkts, s.inn4_runs, s.inn4_wkts
            FROM over_states s
            JOIN matches m ON m.match_id = s.match_id
            ORDER BY m.start_date ASC, s.match_id ASC, s.innings ASC, s.over ASC
            "#,
        )
        .context("prepare load states query")?;

    let rows = stmt
        .query_map([], |row| {
            let outcome_str: String = row.get(6)?;
            let inn = [
                InningsScore { runs: row.get(10)?, wickets: row.get::<_, u32>(11)? },
                InningsScore { runs: row.get(12)?, wickets: row.get::<_, u32>(13)? },
                InningsScore { runs: row.get(14)?, wickets: row.get::<_, u32>(15)? },
                InningsScore { runs: row.get(16)?, wickets: row.get::<_, u32>(17)? },
            ];
            Ok((
                StoredState {
                    match_id: row.get(0)?,
                    first_team: row.get(1)?,
                    second_team: row.get(2)?,
                    venue: row.get(3)?,
                    start_date: row.get(4)?,
                    first_won_toss: row.get::<_, i64>(5)? != 0,
                    // Placeholder until the outcome string is checked below.
                    outcome: Outcome::Draw,
                    state: MatchState::new(
                        row.get::<_, u32>(7)? as u8,
                        row.get::<_, u32>(8)?,
                        row.get::<_, f64>(9)?,
                        inn,
                    ),
                },
                outcome_str,
            ))
        })
        .context("query load states")?;

    let mut out = Vec::new();
    for row in rows {
        let (mut stored, outcome_str) = row.context("decode over state row")?;
        stored.outcome = Outcome::parse(&outcome_str)
            .ok_or_else(|| anyhow!("match {} has unknown outcome '{outcome_str}'", stored.match_id))?;
        out.push(stored);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cricsheet::{MatchCard, ParsedMatch};

    fn sample_match(id: &str, outcome: Option<Outcome>) -> ParsedMatch {
        let card = MatchCard {
            match_id: id.to_string(),
            first_team: "Australia".to_string(),
            second_team: "England".to_string(),
            venue: "Adelaide Oval, Adelaide".to_string(),
            start_date: "2021-12-16".to_string(),
            first_won_toss: true,
            outcome,
        };
        let snapshots = vec![
            MatchState::new(1, 0, 449.0, [InningsScore { runs: 8, wickets: 0 }, InningsScore::default(), InningsScore::default(), InningsScore::default()]),
            MatchState::new(1, 1, 448.0, [InningsScore { runs: 14, wickets: 1 }, InningsScore::default(), InningsScore::default(), InningsScore::default()]),
        ];
        ParsedMatch { card, snapshots, partnerships: vec![] }
    }

    #[test]
    fn store_and_load_round_trip() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let parsed = sample_match("1001", Some(Outcome::Win));
        let written = store_match(&mut conn, &parsed).unwrap();
        assert_eq!(written, 2);
        assert_eq!(count_matches(&conn).unwrap(), 1);

        let rows = load_states(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        let row = &rows[1];
        assert_eq!(row.match_id, "1001");
        assert_eq!(row.first_team, "Australia");
        assert_eq!(row.outcome, Outcome::Win);
        assert!(row.first_won_toss);
        assert_eq!(row.state.inn[0], InningsScore { runs: 14, wickets: 1 });
        assert_eq!(row.state.over, 1);
    }

    #[test]
    fn reingest_replaces_rather_than_duplicates() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut parsed = sample_match("1001", Some(Outcome::Win));
        store_match(&mut conn, &parsed).unwrap();

        // The corrected file has one fewer over and a different result.
        parsed.snapshots.pop();
        parsed.card.outcome = Some(Outcome::Draw);
        store_match(&mut conn, &parsed).unwrap();

        assert_eq!(count_matches(&conn).unwrap(), 1);
        let rows = load_states(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, Outcome::Draw);
    }

    #[test]
    fn undecided_matches_are_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let parsed = sample_match("1002", None);
        assert!(store_match(&mut conn, &parsed).is_err());
    }

    #[test]
    fn ingest_runs_are_auditable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let run_id = begin_ingest_run(&conn, "data/tests", 12).unwrap();
        let counts =
            IngestCounts { matches_upserted: 10, states_upserted: 3200, skipped_no_result: 1 };
        finish_ingest_run(&conn, run_id, 11, &counts, &["bad.json: decode match json".to_string()])
            .unwrap();

        let (files_total, states, errors_json): (i64, i64, String) = conn
            .query_row(
                "SELECT files_total, states_upserted, errors_json FROM ingest_runs WHERE run_id = ?1",
                params![run_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(files_total, 12);
        assert_eq!(states, 3200);
        assert!(errors_json.contains("bad.json"));
    }
}
