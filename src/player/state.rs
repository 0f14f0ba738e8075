//! Player-local memory: the games in flight, the finished ones and the running totals.

use std::collections::HashMap;

use serde::Serialize;

use crate::game_interface::{GameDetails, GameStatus, Parity, DRAW_POINTS, LOSS_POINTS, WIN_POINTS};
use crate::protocol::messages::{GameResult, PlayerStats};

/// How a finished game went for this player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameRecord {
    pub match_id: String,
    pub opponent_id: String,
    pub my_choice: Option<Parity>,
    pub opponent_choice: Option<Parity>,
    pub drawn_number: Option<u8>,
    pub status: GameStatus,
    pub result: GameOutcome,
    pub points_earned: u32,
}

/// A game this player joined and has not heard the end of.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingGame {
    opponent_id: String,
    my_choice: Option<Parity>,
}

#[derive(Debug, Default)]
pub struct PlayerState {
    stats: PlayerStats,
    history: Vec<GameRecord>,
    pending: HashMap<String, PendingGame>,
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats
    }

    pub fn history(&self) -> &[GameRecord] {
        &self.history
    }

    pub fn games_played(&self) -> usize {
        self.history.len()
    }

    /// Share of games won, `0.0` before the first game.
    pub fn win_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.stats.wins as f64 / self.history.len() as f64
    }

    /// Finished games against `opponent_id`, oldest first.
    pub fn against<'a>(&'a self, opponent_id: &'a str) -> impl Iterator<Item = &'a GameRecord> {
        self.history
            .iter()
            .filter(move |record| record.opponent_id == opponent_id)
    }

    pub fn joined(&mut self, match_id: &str, opponent_id: &str) {
        self.pending.insert(
            match_id.to_string(),
            PendingGame {
                opponent_id: opponent_id.to_string(),
                my_choice: None,
            },
        );
    }

    pub fn chose(&mut self, match_id: &str, opponent_id: &str, choice: Parity) {
        self.pending
            .entry(match_id.to_string())
            .or_insert_with(|| PendingGame {
                opponent_id: opponent_id.to_string(),
                my_choice: None,
            })
            .my_choice = Some(choice);
    }

    /// Files the result of `match_id` and updates the totals. `None` if the match was already
    /// recorded.
    pub fn record(
        &mut self,
        match_id: &str,
        player_id: &str,
        result: &GameResult,
    ) -> Option<&GameRecord> {
        if self.history.iter().any(|record| record.match_id == match_id) {
            return None;
        }
        let pending = self.pending.remove(match_id);

        let (outcome, points) = match (&result.status, result.winner_player_id.as_deref()) {
            (GameStatus::DoubleTechnicalLoss, _) => (GameOutcome::Loss, LOSS_POINTS),
            (_, Some(winner)) if winner == player_id => (GameOutcome::Win, WIN_POINTS),
            (_, Some(_)) => (GameOutcome::Loss, LOSS_POINTS),
            (_, None) => (GameOutcome::Draw, DRAW_POINTS),
        };

        let opponent = result
            .choices
            .iter()
            .find(|(id, _)| id.as_str() != player_id);
        let opponent_id = opponent
            .map(|(id, _)| id.clone())
            .or_else(|| pending.as_ref().map(|p| p.opponent_id.clone()))
            .unwrap_or_default();
        let my_choice = result
            .choices
            .get(player_id)
            .and_then(|c| c.parse().ok())
            .or_else(|| pending.as_ref().and_then(|p| p.my_choice));
        let drawn_number = match result.details {
            Some(GameDetails::EvenOdd { drawn_number, .. }) => Some(drawn_number),
            None => None,
        };

        self.stats.played += 1;
        self.stats.points += points;
        match outcome {
            GameOutcome::Win => self.stats.wins += 1,
            GameOutcome::Loss => self.stats.losses += 1,
            GameOutcome::Draw => self.stats.draws += 1,
        }
        self.history.push(GameRecord {
            match_id: match_id.to_string(),
            opponent_id,
            my_choice,
            opponent_choice: opponent.and_then(|(_, c)| c.parse().ok()),
            drawn_number,
            status: result.status,
            result: outcome,
            points_earned: points,
        });
        self.history.last()
    }
}
