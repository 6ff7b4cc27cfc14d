use serde::{Deserialize, Serialize};

// A timed multi-day match: five days of ninety overs each.
pub const MATCH_OVERS_LIMIT: f64 = 450.0;
pub const WICKETS_PER_INNINGS: u32 = 10;

/// Result of a match from the first-batting side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Draw => "draw",
            Outcome::Loss => "loss",
        }
    }

    pub fn parse(s: &str) -> Option<Outcome> {
        match s {
            "win" => Some(Outcome::Win),
            "draw" => Some(Outcome::Draw),
            "loss" => Some(Outcome::Loss),
            _ => None,
        }
    }

    /// The same result seen from the other side.
    pub fn flipped(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Draw => Outcome::Draw,
            Outcome::Loss => Outcome::Win,
        }
    }
}

/// Win/draw/loss distribution, first-batting perspective unless stated otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prob3 {
    pub win: f64,
    pub draw: f64,
    pub loss: f64,
}

impl Prob3 {
    pub fn certain(outcome: Outcome) -> Prob3 {
        match outcome {
            Outcome::Win => Prob3 { win: 1.0, draw: 0.0, loss: 0.0 },
            Outcome::Draw => Prob3 { win: 0.0, draw: 1.0, loss: 0.0 },
            Outcome::Loss => Prob3 { win: 0.0, draw: 0.0, loss: 1.0 },
        }
    }

    pub fn flipped(&self) -> Prob3 {
        Prob3 { win: self.loss, draw: self.draw, loss: self.win }
    }

    pub fn sum(&self) -> f64 {
        self.win + self.draw + self.loss
    }

    pub fn most_likely(&self) -> Outcome {
        if self.win >= self.draw && self.win >= self.loss {
            Outcome::Win
        } else if self.draw >= self.loss {
            Outcome::Draw
        } else {
            Outcome::Loss
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InningsScore {
    pub runs: i64,
    pub wickets: u32,
}

/// End-of-over snapshot of the full scorecard. The first-batting side owns
/// innings 1 and 3, the other side innings 2 and 4. Tallies for innings not
/// yet started stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// Innings in progress, 1..=4.
    pub innings: u8,
    /// Zero-based index of the over just completed in that innings.
    pub over: u32,
    /// Whole-match overs still available out of 450.
    pub overs_left: f64,
    pub inn: [InningsScore; 4],
}

impl MatchState {
    pub fn new(innings: u8, over: u32, overs_left: f64, inn: [InningsScore; 4]) -> MatchState {
        MatchState { innings, over, overs_left, inn }
    }

    /// Signed run lead for the first-batting side.
    pub fn lead(&self) -> i64 {
        (self.inn[0].runs + self.inn[2].runs) - (self.inn[1].runs + self.inn[3].runs)
    }

    /// Wickets the first-batting side still has across both of its innings.
    pub fn first_wickets_remaining(&self) -> u32 {
        (2 * WICKETS_PER_INNINGS).saturating_sub(self.inn[0].wickets + self.inn[2].wickets)
    }

    pub fn second_wickets_remaining(&self) -> u32 {
        (2 * WICKETS_PER_INNINGS).saturating_sub(self.inn[1].wickets + self.inn[3].wickets)
    }

    pub fn current_score(&self) -> InningsScore {
        self.inn[self.innings.saturating_sub(1) as usize]
    }

    pub fn completed_innings(&self) -> u8 {
        self.innings.saturating_sub(1)
    }

    /// A live fourth-innings pursuit of a known target.
    pub fn is_chasing(&self) -> bool {
        self.innings == 4
    }

    /// Runs the chasing side must reach to win. Known only in innings 4.
    pub fn chase_target(&self) -> Option<i64> {
        if self.innings != 4 {
            return None;
        }
        Some(self.inn[0].runs + self.inn[2].runs - self.inn[1].runs + 1)
    }

    /// Runs still needed in the chase. Zero or negative once the target is reached.
    pub fn runs_required(&self) -> Option<i64> {
        self.chase_target().map(|target| target - self.inn[3].runs)
    }

    /// Wickets in hand for the side batting right now, within this innings.
    pub fn batting_wickets_in_hand(&self) -> u32 {
        let score = self.current_score();
        WICKETS_PER_INNINGS.saturating_sub(score.wickets)
    }
}
