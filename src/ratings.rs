use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cricsheet::MatchCard;
use crate::match_state::Outcome;

pub const RATINGS_VERSION: u32 = 1;
pub const BASE_RATING: f64 = 1500.0;
pub const K_FACTOR: f64 = 40.0;

// Grounds and cities that count as home soil, keyed by Test side. Venue
// strings are matched by containment, so "Melbourne Cricket Ground" and
// "Lord's, London" both resolve.
static HOME_GROUNDS: &[(&str, &[&str])] = &[
    ("Australia", &["Melbourne", "Sydney", "Adelaide", "Perth", "Brisbane", "Hobart", "Canberra"]),
    (
        "England",
        &[
            "London",
            "Lord's",
            "Oval",
            "Leeds",
            "Manchester",
            "Birmingham",
            "Nottingham",
            "Southampton",
            "Chester-le-Street",
            "Cardiff",
        ],
    ),
    (
        "India",
        &[
            "Mumbai",
            "Delhi",
            "Kolkata",
            "Chennai",
            "Bangalore",
            "Bengaluru",
            "Nagpur",
            "Ahmedabad",
            "Hyderabad",
            "Mohali",
            "Kanpur",
            "Pune",
            "Rajkot",
            "Indore",
            "Visakhapatnam",
            "Ranchi",
            "Dharamsala",
        ],
    ),
    ("Pakistan", &["Karachi", "Lahore", "Rawalpindi", "Multan", "Faisalabad", "Peshawar"]),
    (
        "South Africa",
        &[
            "Johannesburg",
            "Cape Town",
            "Durban",
            "Centurion",
            "Gqeberha",
            "Port Elizabeth",
            "Bloemfontein",
            "Paarl",
        ],
    ),
    (
        "New Zealand",
        &["Auckland", "Wellington", "Christchurch", "Hamilton", "Dunedin", "Napier", "Mount Maunganui"],
    ),
    ("Sri Lanka", &["Colombo", "Galle", "Kandy", "Pallekele", "Moratuwa"]),
    (
        "West Indies",
        &[
            "Bridgetown",
            "Port of Spain",
            "Kingston",
            "Georgetown",
            "Gros Islet",
            "North Sound",
            "Antigua",
            "Roseau",
        ],
    ),
    ("Bangladesh", &["Dhaka", "Mirpur", "Chattogram", "Chittagong", "Sylhet", "Khulna"]),
    ("Zimbabwe", &["Harare", "Bulawayo"]),
    ("Ireland", &["Dublin", "Belfast", "Malahide"]),
    ("Afghanistan", &["Kabul"]),
];

/// Ratings around one match. `*_before` values feed training features;
/// `*_after` values answer as-of queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingEntry {
    pub match_id: String,
    pub date: String,
    pub first_team: String,
    pub second_team: String,
    pub first_before: f64,
    pub second_before: f64,
    pub first_after: f64,
    pub second_after: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingsBook {
    pub version: u32,
    pub k_factor: f64,
    pub base_rating: f64,
    pub current: HashMap<String, f64>,
    /// Chronological, one entry per rated match.
    pub history: Vec<RatingEntry>,
}

pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

impl Default for RatingsBook {
    fn default() -> RatingsBook {
        RatingsBook::new()
    }
}

impl RatingsBook {
    pub fn new() -> RatingsBook {
        RatingsBook {
            version: RATINGS_VERSION,
            k_factor: K_FACTOR,
            base_rating: BASE_RATING,
            current: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn rating(&self, team: &str) -> f64 {
        self.current.get(team).copied().unwrap_or(self.base_rating)
    }

    /// Rating a team carried into `date` (ISO day), i.e. after every match it
    /// finished strictly before then.
    pub fn rating_as_of(&self, team: &str, date: &str) -> f64 {
        self.history
            .iter()
            .rev()
            .find(|e| e.date.as_str() < date && (e.first_team == team || e.second_team == team))
            .map(|e| if e.first_team == team { e.first_after } else { e.second_after })
            .unwrap_or(self.base_rating)
    }

    pub fn is_home(&self, team: &str, venue: &str) -> bool {
        HOME_GROUNDS
            .iter()
            .find(|(name, _)| *name == team)
            .is_some_and(|(_, grounds)| grounds.iter().any(|g| venue.contains(g)))
    }

    /// Fold one decided match into the book. Matches without a result leave
    /// the ratings untouched.
    pub fn apply_match(&mut self, card: &MatchCard) {
        let Some(outcome) = card.outcome else {
            return;
        };
        let first_before = self.rating(&card.first_team);
        let second_before = self.rating(&card.second_team);
        let expected_first = expected_score(first_before, second_before);
        let actual_first = match outcome {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        };
        let first_after = first_before + self.k_factor * (actual_first - expected_first);
        let second_after = second_before + self.k_factor * ((1.0 - actual_first) - (1.0 - expected_first));

        self.current.insert(card.first_team.clone(), first_after);
        self.current.insert(card.second_team.clone(), second_after);
        self.history.push(RatingEntry {
            match_id: card.match_id.clone(),
            date: card.start_date.clone(),
            first_team: card.first_team.clone(),
            second_team: card.second_team.clone(),
            first_before,
            second_before,
            first_after,
            second_after,
        });
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != RATINGS_VERSION {
            bail!(
                "ratings book version {} does not match supported version {}",
                self.version,
                RATINGS_VERSION
            );
        }
        if self.k_factor <= 0.0 || self.base_rating <= 0.0 {
            bail!("ratings book carries nonpositive constants");
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<RatingsBook> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read ratings book {}", path.display()))?;
        let book: RatingsBook = serde_json::from_str(&raw)
            .with_context(|| format!("parse ratings book {}", path.display()))?;
        book.validate()
            .with_context(|| format!("validate ratings book {}", path.display()))?;
        Ok(book)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate().context("refusing to save an invalid ratings book")?;
        let json = serde_json::to_string_pretty(self).context("serialize ratings book")?;
        crate::artifact::write_atomic(path, &json)
    }
}

/// Replay decided matches in date order and return the finished book.
pub fn build_book(cards: &[MatchCard]) -> RatingsBook {
    let mut ordered: Vec<&MatchCard> = cards.iter().collect();
    // ISO dates sort as strings; the id breaks same-day ties stably.
    ordered.sort_by(|a, b| (&a.start_date, &a.match_id).cmp(&(&b.start_date, &b.match_id)));
    let mut book = RatingsBook::new();
    for card in ordered {
        book.apply_match(card);
    }
    book
}
