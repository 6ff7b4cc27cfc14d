use std::path::PathBuf;

use approx::assert_abs_diff_eq;

use wicketline::artifact::ModelArtifact;
use wicketline::classify::Predictor;
use wicketline::cricsheet::{self, ParsedMatch};
use wicketline::features::TeamContext;
use wicketline::hybrid::HybridPredictor;
use wicketline::match_state::Outcome;
use wicketline::monte_carlo::PartnershipTable;
use wicketline::series::{SeriesOptions, WormSeries, build_worm_series};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn fixture_match() -> ParsedMatch {
    cricsheet::parse_match_file(&fixture_path("cricsheet_match.json"))
        .expect("match fixture should parse")
}

fn fixture_series() -> WormSeries {
    let parsed = fixture_match();
    let artifact = ModelArtifact::load(&fixture_path("model_team_aware.json"))
        .expect("artifact fixture should load");
    let predictor =
        Predictor::from_artifact(&artifact).expect("artifact should build a predictor");
    let hybrid = HybridPredictor::seeded(&predictor, PartnershipTable::builtin(), 500, 9);
    let ctx = TeamContext { first_won_toss: parsed.card.first_won_toss, ..TeamContext::default() };
    // Tight sampling and a sparse tail keep the trace small enough to eyeball.
    let opts = SeriesOptions { sample_every: 1, extend_step: 50 };
    build_worm_series(&parsed, &ctx, &hybrid, &opts).expect("series should build")
}

#[test]
fn fixture_match_parses_to_a_full_card() {
    let parsed = fixture_match();

    assert_eq!(parsed.card.match_id, "cricsheet_match");
    assert_eq!(parsed.card.first_team, "Australia");
    assert_eq!(parsed.card.second_team, "England");
    assert_eq!(parsed.card.venue, "Adelaide Oval, Adelaide");
    assert_eq!(parsed.card.start_date, "2021-12-16");
    assert!(!parsed.card.first_won_toss, "England called correctly");
    assert_eq!(parsed.card.outcome, Some(Outcome::Loss));

    // 3 + 2 + 1 + 3 overs across the four innings.
    assert_eq!(parsed.snapshots.len(), 9);
    let last = parsed.snapshots.last().expect("snapshots should not be empty");
    assert_eq!(last.innings, 4);
    assert_eq!(last.inn[3].runs, 32);
}

#[test]
fn fixture_partnerships_track_each_stand() {
    let parsed = fixture_match();
    assert_eq!(parsed.partnerships.len(), 4);

    let expected = [(1u32, 22.0, 4.0 / 6.0), (2, 8.0, 1.0 / 6.0), (1, 15.0, 2.0 / 6.0), (1, 23.0, 2.0 / 6.0)];
    for (stand, (wicket, runs, overs)) in parsed.partnerships.iter().zip(expected) {
        assert_eq!(stand.wicket, wicket);
        assert_abs_diff_eq!(stand.runs, runs, epsilon = 1e-9);
        assert_abs_diff_eq!(stand.overs, overs, epsilon = 1e-9);
    }
}

#[test]
fn worm_series_tracks_the_fixture_chase() {
    let series = fixture_series();

    assert_eq!(series.perspective, "Australia");
    assert_eq!(series.result, Some(Outcome::Loss));

    // Innings stack on the x axis in playing order.
    let boundaries: Vec<(u8, u32, &str)> = series
        .innings_boundaries
        .iter()
        .map(|b| (b.innings, b.x_over, b.batting_team.as_str()))
        .collect();
    assert_eq!(
        boundaries,
        vec![
            (1, 0, "Australia"),
            (2, 3, "England"),
            (3, 5, "Australia"),
            (4, 6, "England"),
        ]
    );

    // Every bowled over sampled, then the flat tail out to 450.
    assert_eq!(series.points.len(), 17);
    let live_xs: Vec<u32> = series.points[..9].iter().map(|p| p.x_over).collect();
    assert_eq!(live_xs, (0..=8).collect::<Vec<u32>>());

    // The short chase runs through the simulator until the target falls.
    for p in &series.points[..9] {
        let in_window = p.x_over == 6 || p.x_over == 7;
        assert_eq!(p.used_simulation, in_window, "x={}", p.x_over);
    }
    let near_done = &series.points[7];
    assert!(near_done.p_loss > 0.9, "8 needed, 9 standing: pLoss was {}", near_done.p_loss);

    // Over 8 takes England past the target: pinned to the known result.
    let decided = &series.points[8];
    assert_eq!(decided.score, "32/1");
    assert_abs_diff_eq!(decided.p_loss, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(decided.p_win, 0.0, epsilon = 1e-12);
    assert!(!decided.used_simulation);

    assert_eq!(series.match_end_over, Some(8));
    let tail: Vec<u32> = series
        .points
        .iter()
        .filter(|p| p.score == "match complete")
        .map(|p| p.x_over)
        .collect();
    assert_eq!(tail, vec![58, 108, 158, 208, 258, 308, 358, 408]);

    let falls: Vec<(u32, &str)> =
        series.wicket_falls.iter().map(|f| (f.x_over, f.score.as_str())).collect();
    assert_eq!(falls, vec![(1, "22/1"), (2, "30/2"), (4, "15/1"), (7, "23/1")]);
}

#[test]
fn flipped_series_reports_the_winning_chase() {
    let series = fixture_series();
    let flipped = series.flipped();

    assert_eq!(flipped.perspective, "England");
    assert_eq!(flipped.result, Some(Outcome::Win));
    assert_abs_diff_eq!(flipped.points[8].p_win, 1.0, epsilon = 1e-12);

    for (a, b) in series.points.iter().zip(&flipped.points) {
        assert_eq!(a.p_win, b.p_loss);
        assert_eq!(a.p_loss, b.p_win);
        assert_eq!(a.p_draw, b.p_draw);
    }
    assert_eq!(flipped.wicket_falls.len(), series.wicket_falls.len());
}
