//! Module defining the rule function a referee delegates adjudication to, and the Even/Odd game.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Points awarded for a win.
pub const WIN_POINTS: u32 = 3;
/// Points awarded to each side of a draw.
pub const DRAW_POINTS: u32 = 1;
/// Points awarded for a loss, technical or not.
pub const LOSS_POINTS: u32 = 0;

/// Game types a league can be played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    EvenOdd,
}

impl GameType {
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::EvenOdd => "even_odd",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a game ended, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Win,
    Draw,
    TechnicalLoss,
    DoubleTechnicalLoss,
}

/// Which side won a resolved game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    PlayerA,
    PlayerB,
    Draw,
}

impl Outcome {
    /// Points of player A and player B.
    pub fn points(self) -> (u32, u32) {
        match self {
            Outcome::PlayerA => (WIN_POINTS, LOSS_POINTS),
            Outcome::PlayerB => (LOSS_POINTS, WIN_POINTS),
            Outcome::Draw => (DRAW_POINTS, DRAW_POINTS),
        }
    }
}

/// Game-specific part of a result, tagged by game type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game_type", rename_all = "snake_case")]
pub enum GameDetails {
    EvenOdd {
        drawn_number: u8,
        number_parity: Parity,
    },
}

/// Output of a rule function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub reason: String,
    pub details: GameDetails,
}

/// The pure rule function of a game. A referee owns one and never looks inside decisions.
pub trait GameRules: Send + Sync + 'static {
    /// What a player answers to a decision request.
    type Decision: Clone + fmt::Display + Send + Sync;

    fn game_type(&self) -> GameType;

    /// `None` when `raw` is not a legal decision.
    fn parse_decision(&self, raw: &str) -> Option<Self::Decision>;

    /// Adjudicates one game. All randomness comes from `rng`.
    fn resolve<R: Rng + ?Sized>(
        &self,
        a: &Self::Decision,
        b: &Self::Decision,
        rng: &mut R,
    ) -> Resolution;
}

/// Decision of the Even/Odd game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of(number: u8) -> Parity {
        if number % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn opposite(self) -> Parity {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "even" => Ok(Parity::Even),
            "odd" => Ok(Parity::Odd),
            other => Err(format!("{other:?} is neither even nor odd")),
        }
    }
}

/// Even/Odd: a number is drawn in `min..=max`; a side is right when it guessed its parity.
#[derive(Debug, Clone, Copy)]
pub struct EvenOdd {
    min: u8,
    max: u8,
}

impl Default for EvenOdd {
    fn default() -> Self {
        EvenOdd { min: 1, max: 10 }
    }
}

impl EvenOdd {
    /// Outcome for a given drawn number. Exactly one right side wins, otherwise it is a draw.
    pub fn judge(a: Parity, b: Parity, drawn_number: u8) -> (Outcome, String) {
        let parity = Parity::of(drawn_number);
        match (a == parity, b == parity) {
            (true, false) => (
                Outcome::PlayerA,
                format!("player A chose {a}, number {drawn_number} is {parity}"),
            ),
            (false, true) => (
                Outcome::PlayerB,
                format!("player B chose {b}, number {drawn_number} is {parity}"),
            ),
            (true, true) => (
                Outcome::Draw,
                format!("both chose {parity}, number {drawn_number} is {parity}"),
            ),
            (false, false) => (
                Outcome::Draw,
                format!("both chose {}, number {drawn_number} is {parity}", parity.opposite()),
            ),
        }
    }
}

impl GameRules for EvenOdd {
    type Decision = Parity;

    fn game_type(&self) -> GameType {
        GameType::EvenOdd
    }

    fn parse_decision(&self, raw: &str) -> Option<Parity> {
        raw.parse().ok()
    }

    fn resolve<R: Rng + ?Sized>(&self, a: &Parity, b: &Parity, rng: &mut R) -> Resolution {
        let drawn_number = rng.gen_range(self.min..=self.max);
        let (outcome, reason) = Self::judge(*a, *b, drawn_number);
        Resolution {
            outcome,
            reason,
            details: GameDetails::EvenOdd {
                drawn_number,
                number_parity: Parity::of(drawn_number),
            },
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Per-match seed: FNV-1a over the league seed (little-endian) followed by the match id bytes.
pub fn match_seed(seed: u64, match_id: &str) -> u64 {
    seed.to_le_bytes()
        .iter()
        .chain(match_id.as_bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Randomness of one match. With a seed, the stream only depends on `(seed, match_id)`, so
/// results do not depend on the order in which concurrent matches run.
pub fn match_rng(seed: Option<u64>, match_id: &str) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(match_seed(seed, match_id)),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod interface_tests {
    use super::*;

    #[test]
    fn exactly_one_right_side_wins() {
        assert_eq!(EvenOdd::judge(Parity::Even, Parity::Odd, 4).0, Outcome::PlayerA);
        assert_eq!(EvenOdd::judge(Parity::Even, Parity::Odd, 7).0, Outcome::PlayerB);
        assert_eq!(EvenOdd::judge(Parity::Odd, Parity::Odd, 7).0, Outcome::Draw);
        assert_eq!(EvenOdd::judge(Parity::Odd, Parity::Odd, 2).0, Outcome::Draw);
    }

    #[test]
    fn resolve_records_the_drawn_number() {
        let rules = EvenOdd::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let resolution = rules.resolve(&Parity::Even, &Parity::Odd, &mut rng);
            let GameDetails::EvenOdd {
                drawn_number,
                number_parity,
            } = resolution.details;
            assert!((1..=10).contains(&drawn_number));
            assert_eq!(number_parity, Parity::of(drawn_number));
            let expected = if number_parity == Parity::Even {
                Outcome::PlayerA
            } else {
                Outcome::PlayerB
            };
            assert_eq!(resolution.outcome, expected);
        }
    }

    #[test]
    fn parse_decision_is_case_insensitive_and_strict() {
        let rules = EvenOdd::default();
        assert_eq!(rules.parse_decision("EVEN"), Some(Parity::Even));
        assert_eq!(rules.parse_decision(" odd "), Some(Parity::Odd));
        assert_eq!(rules.parse_decision("maybe"), None);
    }

    #[test]
    fn match_seed_is_pinned() {
        assert_eq!(match_seed(0, ""), 0xa8c7_f832_281a_39c5);
        assert_eq!(match_seed(42, "R1M1"), 0x6db6_5971_24dd_a004);
        assert_eq!(match_seed(42, "R1M2"), 0x6db6_5c71_24dd_a51d);
    }

    #[test]
    fn seeded_match_rng_is_reproducible_per_match() {
        let first: Vec<u8> = (0..5)
            .map(|_| match_rng(Some(42), "R1M1").gen_range(1..=10))
            .collect();
        assert!(first.windows(2).all(|w| w[0] == w[1]));

        let mut a = match_rng(Some(42), "R1M1");
        let mut b = match_rng(Some(42), "R1M1");
        let xs: Vec<u32> = (0..8).map(|_| a.gen()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.gen()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn details_are_tagged_by_game_type() {
        let details = GameDetails::EvenOdd {
            drawn_number: 8,
            number_parity: Parity::Even,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"game_type": "even_odd", "drawn_number": 8, "number_parity": "even"})
        );
    }
}
