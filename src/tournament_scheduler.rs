//! Round-robin schedule of a league and progress tracking of its matches.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::LeagueError;
use crate::game_interface::GameType;
use crate::protocol::messages::{MatchResult, MatchStatus, ScheduleEntry, ScheduledMatch};

/// One scheduled game between two players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub round_id: u32,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    pub status: MatchStatus,
    /// Referee the match was last assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referee_id: Option<String>,
    pub winner: Option<String>,
    pub result: Option<MatchResult>,
}

impl Match {
    fn new(match_id: String, round_id: u32, player_a_id: String, player_b_id: String) -> Self {
        Match {
            match_id,
            round_id,
            player_a_id,
            player_b_id,
            status: MatchStatus::Pending,
            referee_id: None,
            winner: None,
            result: None,
        }
    }

    pub fn involves(&self, player_id: &str) -> bool {
        self.player_a_id == player_id || self.player_b_id == player_id
    }

    pub fn entry(&self) -> ScheduleEntry {
        ScheduleEntry {
            match_id: self.match_id.clone(),
            round_id: self.round_id,
            player_a_id: self.player_a_id.clone(),
            player_b_id: self.player_b_id.clone(),
            status: self.status,
            winner: self.winner.clone(),
        }
    }

    pub fn announcement(&self, game_type: GameType, referee_endpoint: Option<&str>) -> ScheduledMatch {
        ScheduledMatch {
            match_id: self.match_id.clone(),
            game_type,
            player_a_id: self.player_a_id.clone(),
            player_b_id: self.player_b_id.clone(),
            referee_endpoint: referee_endpoint.map(str::to_owned),
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} VS {}]",
            self.match_id, self.player_a_id, self.player_b_id
        )
    }
}

/// Every unordered pair once, in combination order of `player_ids`.
///
/// Matches are packed `max(1, n / 2)` per round and named `R{round}M{index}` with a 1-based
/// global index. Fewer than two players give an empty schedule.
pub fn create_round_robin_schedule(player_ids: &[String]) -> Vec<Match> {
    let n = player_ids.len();
    if n < 2 {
        return vec![];
    }
    let matches_per_round = (n / 2).max(1);
    let mut matches = Vec::with_capacity(n * (n - 1) / 2);
    for (i, a) in player_ids.iter().enumerate() {
        for b in &player_ids[i + 1..] {
            let index = matches.len() + 1;
            let round_id = index.div_ceil(matches_per_round) as u32;
            matches.push(Match::new(
                format!("R{round_id}M{index}"),
                round_id,
                a.clone(),
                b.clone(),
            ));
        }
    }
    trace!(players = n, matches = matches.len(), "round robin schedule created");
    matches
}

pub fn matches_for_round(schedule: &[Match], round_id: u32) -> Vec<&Match> {
    schedule.iter().filter(|m| m.round_id == round_id).collect()
}

pub fn total_rounds(schedule: &[Match]) -> u32 {
    schedule.iter().map(|m| m.round_id).max().unwrap_or(0)
}

/// Outcome of recording a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Recorded,
    /// The match was already completed, nothing changed.
    AlreadyRecorded,
}

/// The schedule of a running league.
#[derive(Debug, Clone, Default)]
pub struct LeagueSchedule {
    matches: Vec<Match>,
}

impl LeagueSchedule {
    pub fn new(matches: Vec<Match>) -> Self {
        LeagueSchedule { matches }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, match_id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.match_id == match_id)
    }

    fn get_mut(&mut self, match_id: &str) -> Option<&mut Match> {
        self.matches.iter_mut().find(|m| m.match_id == match_id)
    }

    pub fn total_rounds(&self) -> u32 {
        total_rounds(&self.matches)
    }

    pub fn round(&self, round_id: u32) -> Vec<&Match> {
        matches_for_round(&self.matches, round_id)
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.matches.iter().map(Match::entry).collect()
    }

    /// A completed match is never re-opened, so only pending matches can start.
    pub fn set_in_progress(&mut self, match_id: &str, referee_id: &str) -> bool {
        match self.get_mut(match_id) {
            Some(m) if m.status == MatchStatus::Pending => {
                m.status = MatchStatus::InProgress;
                m.referee_id = Some(referee_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Undoes [`LeagueSchedule::set_in_progress`] when the assignment did not go through. The
    /// referee is kept until the match is assigned again, so its late report still counts.
    pub fn set_pending(&mut self, match_id: &str) {
        if let Some(m) = self.get_mut(match_id) {
            if m.status == MatchStatus::InProgress {
                m.status = MatchStatus::Pending;
            }
        }
    }

    /// Completes a match exactly once.
    pub fn complete(
        &mut self,
        match_id: &str,
        result: &MatchResult,
    ) -> Result<Completion, LeagueError> {
        let m = self
            .get_mut(match_id)
            .ok_or_else(|| LeagueError::InvalidParams(format!("unknown match {match_id}")))?;
        if m.status == MatchStatus::Completed {
            return Ok(Completion::AlreadyRecorded);
        }
        if let Some(winner) = &result.winner {
            if !m.involves(winner) {
                return Err(LeagueError::InvalidParams(format!(
                    "{winner} does not play in {match_id}"
                )));
            }
        }
        m.status = MatchStatus::Completed;
        m.winner = result.winner.clone();
        m.result = Some(result.clone());
        Ok(Completion::Recorded)
    }

    pub fn is_round_complete(&self, round_id: u32) -> bool {
        self.round(round_id)
            .iter()
            .all(|m| m.status == MatchStatus::Completed)
    }

    pub fn completed_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.status == MatchStatus::Completed)
            .count()
    }

    /// All matches were reported.
    pub fn is_finished(&self) -> bool {
        self.completed_count() == self.matches.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use super::*;
    use crate::game_interface::GameStatus;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("P{i:02}")).collect()
    }

    fn win(winner: &str) -> MatchResult {
        MatchResult {
            status: GameStatus::Win,
            winner: Some(winner.into()),
            score: BTreeMap::new(),
            choices: BTreeMap::new(),
            details: None,
            reason: String::new(),
        }
    }

    #[test]
    fn every_pair_plays_exactly_once() {
        for n in 2..=9 {
            let schedule = create_round_robin_schedule(&ids(n));
            assert_eq!(schedule.len(), n * (n - 1) / 2);
            let pairs: HashSet<(String, String)> = schedule
                .iter()
                .map(|m| (m.player_a_id.clone(), m.player_b_id.clone()))
                .collect();
            assert_eq!(pairs.len(), schedule.len());
            assert!(schedule.iter().all(|m| m.round_id >= 1));
            assert!(schedule.iter().all(|m| m.player_a_id != m.player_b_id));
        }
    }

    #[test]
    fn four_players_make_three_rounds_of_two() {
        let schedule = create_round_robin_schedule(&ids(4));
        let names: Vec<String> = schedule.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "R1M1 [P01 VS P02]",
                "R1M2 [P01 VS P03]",
                "R2M3 [P01 VS P04]",
                "R2M4 [P02 VS P03]",
                "R3M5 [P02 VS P04]",
                "R3M6 [P03 VS P04]",
            ]
        );
        assert_eq!(total_rounds(&schedule), 3);
        assert_eq!(matches_for_round(&schedule, 2).len(), 2);
    }

    #[test]
    fn degenerate_inputs_give_empty_schedules() {
        assert!(create_round_robin_schedule(&[]).is_empty());
        assert!(create_round_robin_schedule(&ids(1)).is_empty());
        let two = create_round_robin_schedule(&ids(2));
        assert_eq!(two.len(), 1);
        assert_eq!(two[0].match_id, "R1M1");
        // Three players: one match per round.
        assert_eq!(total_rounds(&create_round_robin_schedule(&ids(3))), 3);
    }

    #[test]
    fn matches_complete_exactly_once() {
        let mut schedule = LeagueSchedule::new(create_round_robin_schedule(&ids(4)));
        assert!(schedule.set_in_progress("R1M1", "REF01"));
        assert!(!schedule.set_in_progress("R1M1", "REF02"));
        assert_eq!(schedule.get("R1M1").unwrap().referee_id.as_deref(), Some("REF01"));

        assert_eq!(schedule.complete("R1M1", &win("P02")).unwrap(), Completion::Recorded);
        assert_eq!(
            schedule.complete("R1M1", &win("P01")).unwrap(),
            Completion::AlreadyRecorded
        );
        let m = schedule.get("R1M1").unwrap();
        assert_eq!(m.status, MatchStatus::Completed);
        assert_eq!(m.winner.as_deref(), Some("P02"));
        assert!(!schedule.set_in_progress("R1M1", "REF01"));

        assert!(!schedule.is_round_complete(1));
        schedule.complete("R1M2", &win("P03")).unwrap();
        assert!(schedule.is_round_complete(1));
        assert!(!schedule.is_finished());
    }

    #[test]
    fn reassignment_replaces_the_referee() {
        let mut schedule = LeagueSchedule::new(create_round_robin_schedule(&ids(2)));
        assert!(schedule.set_in_progress("R1M1", "REF01"));
        schedule.set_pending("R1M1");
        let m = schedule.get("R1M1").unwrap();
        assert_eq!(m.status, MatchStatus::Pending);
        assert_eq!(m.referee_id.as_deref(), Some("REF01"));
        assert!(schedule.set_in_progress("R1M1", "REF02"));
        assert_eq!(schedule.get("R1M1").unwrap().referee_id.as_deref(), Some("REF02"));
    }

    #[test]
    fn rejects_unknown_match_and_foreign_winner() {
        let mut schedule = LeagueSchedule::new(create_round_robin_schedule(&ids(4)));
        assert!(schedule.complete("R9M9", &win("P01")).is_err());
        assert!(schedule.complete("R1M1", &win("P04")).is_err());
        assert_eq!(schedule.get("R1M1").unwrap().status, MatchStatus::Pending);
    }
}
