//! Payloads of every message kind. Each is flattened next to an [`Envelope`](super::Envelope)
//! through [`Message`](super::Message).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game_interface::{GameDetails, GameStatus, GameType};

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_game_types() -> Vec<String> {
    vec![GameType::EvenOdd.as_str().to_string()]
}

fn default_max_concurrent_matches() -> u32 {
    2
}

/// Self-description sent by a referee when registering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefereeMeta {
    pub display_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_game_types")]
    pub game_types: Vec<String>,
    pub contact_endpoint: String,
    #[serde(default = "default_max_concurrent_matches")]
    pub max_concurrent_matches: u32,
}

/// Self-description sent by a player when registering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMeta {
    pub display_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_game_types")]
    pub game_types: Vec<String>,
    pub contact_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefereeRegisterRequest {
    pub referee_meta: RefereeMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRegisterRequest {
    pub player_meta: PlayerMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Accepted,
    Rejected,
}

/// Reply to `register_referee`. The issued token travels in the envelope's `auth_token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefereeRegisterResponse {
    pub status: RegistrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRegisterResponse {
    pub status: RegistrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Generic acknowledgement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    Accepted,
    Recorded,
    AlreadyRecorded,
    Acknowledged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub status: AckStatus,
}

impl Acknowledgement {
    pub fn new(status: AckStatus) -> Self {
        Acknowledgement { status }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    InProgress,
    Completed,
}

/// One match as announced to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMatch {
    pub match_id: String,
    pub game_type: GameType,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referee_endpoint: Option<String>,
}

/// `round_id` travels in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundAnnouncement {
    pub matches: Vec<ScheduledMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCompleted {
    pub matches_completed: usize,
    #[serde(default)]
    pub next_round_id: Option<u32>,
}

/// One ranked row of the standings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingRow {
    pub rank: usize,
    pub player_id: String,
    pub display_name: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsUpdate {
    pub standings: Vec<StandingRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueCompleted {
    pub total_rounds: u32,
    pub total_matches: usize,
    #[serde(default)]
    pub champion: Option<StandingRow>,
    pub standings: Vec<StandingRow>,
}

/// Sent by the League Manager to a referee. `match_id` and `round_id` travel in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchAssignment {
    pub game_type: GameType,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    #[serde(rename = "player_A_endpoint")]
    pub player_a_endpoint: String,
    #[serde(rename = "player_B_endpoint")]
    pub player_b_endpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchRole {
    #[serde(rename = "PLAYER_A")]
    PlayerA,
    #[serde(rename = "PLAYER_B")]
    PlayerB,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInvitation {
    pub game_type: GameType,
    pub role_in_match: MatchRole,
    pub opponent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameJoinAck {
    pub player_id: String,
    pub arrival_timestamp: String,
    pub accept: bool,
}

/// Cumulative record of one player, as seen by the league.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStats {
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub opponent_id: String,
    pub round_id: u32,
    #[serde(default)]
    pub your_standings: PlayerStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChooseParityCall {
    pub player_id: String,
    pub game_type: GameType,
    pub context: DecisionContext,
    pub deadline: String,
}

/// The choice is kept raw so the referee can tell an invalid choice from a malformed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChooseParityResponse {
    pub player_id: String,
    pub parity_choice: String,
}

/// Result of a game as told to the players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub status: GameStatus,
    #[serde(default)]
    pub winner_player_id: Option<String>,
    #[serde(default)]
    pub choices: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<GameDetails>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOver {
    pub game_type: GameType,
    pub game_result: GameResult,
}

/// Result of a match as reported to the League Manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub status: GameStatus,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub score: BTreeMap<String, u32>,
    #[serde(default)]
    pub choices: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<GameDetails>,
    #[serde(default)]
    pub reason: String,
}

/// `match_id` and `round_id` travel in the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultReport {
    pub game_type: GameType,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    pub result: MatchResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    GetStandings,
    GetSchedule,
    GetPlayerStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueQuery {
    pub query_type: QueryType,
    #[serde(default)]
    pub query_params: QueryParams,
}

/// One match as listed by `GET_SCHEDULE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub match_id: String,
    pub round_id: u32,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    pub status: MatchStatus,
    #[serde(default)]
    pub winner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueQueryResponse {
    pub query_type: QueryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standings: Option<Vec<StandingRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<ScheduleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PlayerStats>,
}

/// Payload of `LEAGUE_ERROR` and `GAME_ERROR`, carried in JSON-RPC `error.data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<crate::error::ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    pub reason: String,
}
