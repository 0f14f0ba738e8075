//! League table: points per player and ranking.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use crate::error::{ErrorCode, LeagueError};
use crate::game_interface::{GameStatus, DRAW_POINTS, LOSS_POINTS, WIN_POINTS};
use crate::protocol::messages::{PlayerStats, StandingRow};

/// Record of one player. `played == wins + draws + losses` at all times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Standing {
    pub player_id: String,
    pub display_name: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub points: u32,
}

impl Standing {
    pub fn new(player_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Standing {
            player_id: player_id.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    fn record_win(&mut self) {
        self.played += 1;
        self.wins += 1;
        self.points += WIN_POINTS;
    }

    fn record_draw(&mut self) {
        self.played += 1;
        self.draws += 1;
        self.points += DRAW_POINTS;
    }

    fn record_loss(&mut self) {
        self.played += 1;
        self.losses += 1;
        self.points += LOSS_POINTS;
    }

    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            played: self.played,
            wins: self.wins,
            draws: self.draws,
            losses: self.losses,
            points: self.points,
        }
    }

    fn row(&self, rank: usize) -> StandingRow {
        StandingRow {
            rank,
            player_id: self.player_id.clone(),
            display_name: self.display_name.clone(),
            played: self.played,
            wins: self.wins,
            draws: self.draws,
            losses: self.losses,
            points: self.points,
        }
    }
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} pts (win: {}, draw: {}, lose: {})",
            self.player_id, self.points, self.wins, self.draws, self.losses
        )
    }
}

/// Standings of every registered player.
#[derive(Debug, Clone, Default)]
pub struct StandingsTable {
    standings: HashMap<String, Standing>,
}

impl StandingsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zeroed standing. Existing standings are kept.
    pub fn add_player(&mut self, player_id: &str, display_name: &str) {
        self.standings
            .entry(player_id.to_string())
            .or_insert_with(|| Standing::new(player_id, display_name));
    }

    pub fn get(&self, player_id: &str) -> Option<&Standing> {
        self.standings.get(player_id)
    }

    pub fn stats(&self, player_id: &str) -> Option<PlayerStats> {
        self.get(player_id).map(Standing::stats)
    }

    pub fn len(&self) -> usize {
        self.standings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }

    /// Applies the result of a game between `a` and `b`. Nothing changes on error.
    pub fn apply(
        &mut self,
        a: &str,
        b: &str,
        status: GameStatus,
        winner: Option<&str>,
    ) -> Result<(), LeagueError> {
        for id in [a, b] {
            if !self.standings.contains_key(id) {
                return Err(LeagueError::protocol(
                    ErrorCode::PlayerNotRegistered,
                    format!("{id} has no standing"),
                ));
            }
        }

        enum Effect {
            Winner { winner: String, loser: String },
            Draw,
            BothLose,
        }

        let effect = match (status, winner) {
            (GameStatus::Win | GameStatus::TechnicalLoss, Some(w)) if w == a || w == b => {
                let loser = if w == a { b } else { a };
                Effect::Winner {
                    winner: w.to_string(),
                    loser: loser.to_string(),
                }
            }
            (GameStatus::Draw, None) => Effect::Draw,
            (GameStatus::DoubleTechnicalLoss, None) => Effect::BothLose,
            (status, winner) => {
                return Err(LeagueError::InvalidParams(format!(
                    "inconsistent result {status:?} with winner {winner:?} for {a} vs {b}"
                )))
            }
        };

        let mut side = |id: &str, f: fn(&mut Standing)| {
            if let Some(standing) = self.standings.get_mut(id) {
                f(standing);
            }
        };
        match effect {
            Effect::Winner { winner, loser } => {
                side(&winner, Standing::record_win);
                side(&loser, Standing::record_loss);
            }
            Effect::Draw => {
                side(a, Standing::record_draw);
                side(b, Standing::record_draw);
            }
            Effect::BothLose => {
                side(a, Standing::record_loss);
                side(b, Standing::record_loss);
            }
        }
        Ok(())
    }

    /// Ranked by points, then wins, then draws, then player id.
    pub fn ranked(&self) -> Vec<StandingRow> {
        let mut standings: Vec<&Standing> = self.standings.values().collect();
        standings.sort_by_key(|s| {
            (
                Reverse(s.points),
                Reverse(s.wins),
                Reverse(s.draws),
                s.player_id.clone(),
            )
        });
        standings
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.row(i + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ids: &[&str]) -> StandingsTable {
        let mut table = StandingsTable::new();
        for id in ids {
            table.add_player(id, &id.to_lowercase());
        }
        table
    }

    fn assert_consistent(table: &StandingsTable) {
        for row in table.ranked() {
            assert_eq!(row.played, row.wins + row.draws + row.losses, "{row:?}");
        }
    }

    #[test]
    fn win_gives_three_points_to_the_winner_only() {
        let mut t = table(&["P01", "P02"]);
        t.apply("P01", "P02", GameStatus::Win, Some("P02")).unwrap();
        assert_eq!(t.get("P02").unwrap().points, 3);
        assert_eq!(t.get("P02").unwrap().wins, 1);
        assert_eq!(t.get("P01").unwrap().points, 0);
        assert_eq!(t.get("P01").unwrap().losses, 1);
        assert_consistent(&t);
    }

    #[test]
    fn draw_gives_one_point_each() {
        let mut t = table(&["P01", "P02"]);
        t.apply("P01", "P02", GameStatus::Draw, None).unwrap();
        for id in ["P01", "P02"] {
            let s = t.get(id).unwrap();
            assert_eq!((s.draws, s.points, s.played), (1, 1, 1));
        }
        assert_consistent(&t);
    }

    #[test]
    fn technical_loss_counts_as_a_win_for_the_responsive_side() {
        let mut t = table(&["P01", "P02"]);
        t.apply("P01", "P02", GameStatus::TechnicalLoss, Some("P01"))
            .unwrap();
        assert_eq!(t.get("P01").unwrap().points, 3);
        assert_eq!(t.get("P02").unwrap().losses, 1);
    }

    #[test]
    fn double_technical_loss_is_a_pointless_loss_for_both() {
        let mut t = table(&["P01", "P02"]);
        t.apply("P01", "P02", GameStatus::DoubleTechnicalLoss, None)
            .unwrap();
        for id in ["P01", "P02"] {
            let s = t.get(id).unwrap();
            assert_eq!((s.losses, s.points, s.played), (1, 0, 1));
        }
        assert_consistent(&t);
    }

    #[test]
    fn inconsistent_results_change_nothing() {
        let mut t = table(&["P01", "P02"]);
        assert!(t.apply("P01", "P02", GameStatus::Win, None).is_err());
        assert!(t.apply("P01", "P02", GameStatus::Win, Some("P03")).is_err());
        assert!(t.apply("P01", "P02", GameStatus::Draw, Some("P01")).is_err());
        let err = t.apply("P01", "P09", GameStatus::Draw, None).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::PlayerNotRegistered));
        assert_eq!(t.get("P01").unwrap().played, 0);
    }

    #[test]
    fn ranking_uses_points_then_wins_then_draws() {
        let mut t = table(&["P01", "P02", "P03", "P04"]);
        t.apply("P01", "P02", GameStatus::Draw, None).unwrap();
        t.apply("P01", "P03", GameStatus::Draw, None).unwrap();
        t.apply("P01", "P04", GameStatus::Draw, None).unwrap();
        t.apply("P03", "P02", GameStatus::Win, Some("P03")).unwrap();
        t.apply("P03", "P04", GameStatus::Win, Some("P04")).unwrap();

        let ranked = t.ranked();
        let order: Vec<&str> = ranked.iter().map(|r| r.player_id.as_str()).collect();
        // P03: 1W 1D 1L = 4, P04: 1W 1D = 4, P01: 3D = 3, P02: 1D 1L = 1.
        assert_eq!(order, vec!["P03", "P04", "P01", "P02"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[3].rank, 4);
        assert_consistent(&t);
    }

    #[test]
    fn ranking_is_stable_without_new_results() {
        let mut t = table(&["P02", "P01"]);
        t.apply("P01", "P02", GameStatus::Draw, None).unwrap();
        assert_eq!(t.ranked(), t.ranked());
        assert_eq!(t.ranked()[0].player_id, "P01");
    }
}
