//! Referee-local bookkeeping of the matches being played.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    WaitingForPlayers,
    CollectingChoices,
    Finished,
    Error,
}

/// Live state of one match. Discarded once the result is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveMatch {
    pub match_id: String,
    pub round_id: u32,
    pub player_a_id: String,
    pub player_b_id: String,
    pub conversation_id: String,
    pub state: MatchState,
    pub player_a_joined: bool,
    pub player_b_joined: bool,
    pub player_a_choice: Option<String>,
    pub player_b_choice: Option<String>,
    pub drawn_number: Option<u8>,
    pub winner: Option<String>,
}

impl ActiveMatch {
    pub fn new(
        match_id: impl Into<String>,
        round_id: u32,
        player_a_id: impl Into<String>,
        player_b_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        ActiveMatch {
            match_id: match_id.into(),
            round_id,
            player_a_id: player_a_id.into(),
            player_b_id: player_b_id.into(),
            conversation_id: conversation_id.into(),
            state: MatchState::WaitingForPlayers,
            player_a_joined: false,
            player_b_joined: false,
            player_a_choice: None,
            player_b_choice: None,
            drawn_number: None,
            winner: None,
        }
    }

    /// Moves to `COLLECTING_CHOICES` once both players joined.
    pub fn mark_joined(&mut self, player_id: &str) {
        if player_id == self.player_a_id {
            self.player_a_joined = true;
        } else if player_id == self.player_b_id {
            self.player_b_joined = true;
        }
        if self.state == MatchState::WaitingForPlayers && self.player_a_joined && self.player_b_joined
        {
            self.state = MatchState::CollectingChoices;
        }
    }

    pub fn record_choice(&mut self, player_id: &str, choice: &str) {
        if player_id == self.player_a_id {
            self.player_a_choice = Some(choice.to_string());
        } else if player_id == self.player_b_id {
            self.player_b_choice = Some(choice.to_string());
        }
    }

    pub fn both_choices_received(&self) -> bool {
        self.player_a_choice.is_some() && self.player_b_choice.is_some()
    }

    pub fn finish(&mut self, winner: Option<&str>, drawn_number: Option<u8>) {
        self.state = MatchState::Finished;
        self.winner = winner.map(str::to_owned);
        self.drawn_number = drawn_number;
    }

    pub fn fail(&mut self) {
        self.state = MatchState::Error;
    }

    /// How far each side got: joined, then decided.
    pub fn progress(&self) -> (u8, u8) {
        let steps = |joined: bool, choice: &Option<String>| joined as u8 + choice.is_some() as u8;
        (
            steps(self.player_a_joined, &self.player_a_choice),
            steps(self.player_b_joined, &self.player_b_choice),
        )
    }
}

/// Matches currently refereed, keyed by match id.
#[derive(Debug, Default)]
pub struct ActiveMatches {
    matches: Mutex<HashMap<String, ActiveMatch>>,
}

impl ActiveMatches {
    /// False when a match with the same id is already active.
    pub fn insert(&self, active: ActiveMatch) -> bool {
        let mut matches = lock(&self.matches);
        if matches.contains_key(&active.match_id) {
            return false;
        }
        matches.insert(active.match_id.clone(), active);
        true
    }

    pub fn update(&self, match_id: &str, f: impl FnOnce(&mut ActiveMatch)) {
        if let Some(active) = lock(&self.matches).get_mut(match_id) {
            f(active);
        }
    }

    pub fn get(&self, match_id: &str) -> Option<ActiveMatch> {
        lock(&self.matches).get(match_id).cloned()
    }

    pub fn remove(&self, match_id: &str) -> Option<ActiveMatch> {
        lock(&self.matches).remove(match_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.matches).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ActiveMatch> {
        let mut matches: Vec<ActiveMatch> = lock(&self.matches).values().cloned().collect();
        matches.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        matches
    }
}
