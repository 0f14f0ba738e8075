//! The Player: joins the matches it is invited to, answers decision requests with its strategy
//! and keeps its own record of the league.

pub mod state;
pub mod strategy;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{bail, Context};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::agent::{sender_name, AgentRole};
use crate::configuration::Configuration;
use crate::error::LeagueError;
use crate::game_interface::{match_rng, GameType};
use crate::lock;
use crate::logger::EventLog;
use crate::protocol::messages::{
    AckStatus, Acknowledgement, ChooseParityCall, ChooseParityResponse, GameInvitation,
    GameJoinAck, GameOver, LeagueCompleted, PlayerMeta, PlayerRegisterRequest,
    PlayerRegisterResponse, PlayerStats, RegistrationStatus, RoundAnnouncement, RoundCompleted,
    ScheduledMatch, StandingRow, StandingsUpdate,
};
use crate::protocol::{decode, new_conversation_id, utc_timestamp, Envelope, Message, MessageType};
use crate::server::{mcp_router, RpcService};
use crate::transport::McpClient;

pub use state::{GameOutcome, GameRecord, PlayerState};
pub use strategy::{Strategy, StrategyKind};

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub display_name: String,
    /// This player's own `POST /mcp` URL.
    pub contact_endpoint: String,
    /// The League Manager's `POST /mcp` URL.
    pub league_endpoint: String,
}

/// What the League Manager handed back at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCredentials {
    pub player_id: String,
    pub auth_token: String,
    pub league_id: Option<String>,
}

/// What the player heard from the League Manager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeagueView {
    pub current_round: Option<u32>,
    pub upcoming: Vec<ScheduledMatch>,
    pub standings: Vec<StandingRow>,
    pub completed: bool,
    pub champion: Option<String>,
}

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub player_id: Option<String>,
    pub display_name: String,
    pub strategy: &'static str,
    pub registered: bool,
    pub stats: PlayerStats,
    pub league: LeagueView,
}

pub struct Player {
    settings: PlayerSettings,
    config: Configuration,
    strategy: Box<dyn Strategy>,
    state: Mutex<PlayerState>,
    rng: Mutex<StdRng>,
    credentials: RwLock<Option<PlayerCredentials>>,
    league: Mutex<LeagueView>,
    client: McpClient,
    events: EventLog,
}

impl Player {
    pub fn new(settings: PlayerSettings, config: Configuration, strategy: Box<dyn Strategy>) -> Self {
        let events = EventLog::new(
            format!("player_{}", settings.display_name),
            Some(config.league_id()),
            config.log_root(),
        );
        Player {
            rng: Mutex::new(match_rng(
                config.seed(),
                &sender_name(AgentRole::Player, &settings.display_name),
            )),
            client: McpClient::new(config.retry_policy()),
            state: Mutex::new(PlayerState::new()),
            credentials: RwLock::new(None),
            league: Mutex::new(LeagueView::default()),
            events,
            strategy,
            config,
            settings,
        }
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn credentials(&self) -> Option<PlayerCredentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registered id, or the display name before registration.
    pub fn player_id(&self) -> String {
        self.credentials()
            .map(|c| c.player_id)
            .unwrap_or_else(|| self.settings.display_name.clone())
    }

    pub fn sender_name(&self) -> String {
        sender_name(AgentRole::Player, &self.player_id())
    }

    pub fn stats(&self) -> PlayerStats {
        lock(&self.state).stats()
    }

    pub fn history(&self) -> Vec<GameRecord> {
        lock(&self.state).history().to_vec()
    }

    pub fn league(&self) -> LeagueView {
        lock(&self.league).clone()
    }

    pub fn status(&self) -> PlayerStatus {
        let credentials = self.credentials();
        PlayerStatus {
            registered: credentials.is_some(),
            player_id: credentials.map(|c| c.player_id),
            display_name: self.settings.display_name.clone(),
            strategy: self.strategy.name(),
            stats: self.stats(),
            league: self.league(),
        }
    }

    /// Registers with the League Manager and keeps the credentials it returns.
    #[instrument(skip(self), fields(display_name = %self.settings.display_name))]
    pub async fn register(&self) -> anyhow::Result<PlayerCredentials> {
        let message = Message::new(
            Envelope::new(
                MessageType::LeagueRegisterRequest,
                self.sender_name(),
                new_conversation_id("register"),
            ),
            PlayerRegisterRequest {
                player_meta: PlayerMeta {
                    display_name: self.settings.display_name.clone(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    game_types: vec![GameType::EvenOdd.to_string()],
                    contact_endpoint: self.settings.contact_endpoint.clone(),
                },
            },
        );
        let reply: Message<PlayerRegisterResponse> = self
            .client
            .send(
                &self.settings.league_endpoint,
                "register_player",
                &message,
                self.config.timeouts().registration,
            )
            .await
            .context("could not register with the League Manager")?;

        let response = reply.payload;
        if response.status == RegistrationStatus::Rejected {
            bail!(
                "registration rejected: {}",
                response.reason.unwrap_or_default()
            );
        }
        let credentials = PlayerCredentials {
            player_id: response
                .player_id
                .context("accepted registration without a player_id")?,
            auth_token: reply
                .envelope
                .auth_token
                .context("accepted registration without an auth_token")?,
            league_id: reply.envelope.league_id,
        };
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        info!(player_id = %credentials.player_id, "registered");
        self.events.info(
            "REGISTERED",
            json!({"player_id": credentials.player_id, "league_id": credentials.league_id}),
        );
        Ok(credentials)
    }

    fn reply_envelope(&self, request: &Envelope, message_type: MessageType) -> Envelope {
        request
            .reply(message_type, self.sender_name())
            .with_auth_token(self.credentials().map(|c| c.auth_token))
    }

    fn handle_game_invitation(&self, params: Value) -> Result<Value, LeagueError> {
        let invitation: Message<GameInvitation> = decode(params, MessageType::GameInvitation)?;
        let match_id = invitation.envelope.require_match_id()?;
        lock(&self.state).joined(match_id, &invitation.payload.opponent_id);
        self.events.info(
            "GAME_INVITATION",
            json!({
                "match_id": match_id,
                "opponent_id": invitation.payload.opponent_id,
                "role_in_match": invitation.payload.role_in_match,
            }),
        );
        let envelope = self.reply_envelope(&invitation.envelope, MessageType::GameJoinAck);
        Message::new(
            envelope,
            GameJoinAck {
                player_id: self.player_id(),
                arrival_timestamp: utc_timestamp(),
                accept: true,
            },
        )
        .to_value()
    }

    fn choose_parity(&self, params: Value) -> Result<Value, LeagueError> {
        let call: Message<ChooseParityCall> = decode(params, MessageType::ChooseParityCall)?;
        let match_id = call.envelope.require_match_id()?;
        let context = &call.payload.context;
        let choice = {
            let mut state = lock(&self.state);
            let choice = self
                .strategy
                .choose(&state, context, &mut *lock(&self.rng));
            state.chose(match_id, &context.opponent_id, choice);
            choice
        };
        self.events.info(
            "PARITY_CHOICE",
            json!({"match_id": match_id, "choice": choice, "strategy": self.strategy.name()}),
        );
        let envelope = self.reply_envelope(&call.envelope, MessageType::ChooseParityResponse);
        Message::new(
            envelope,
            ChooseParityResponse {
                player_id: self.player_id(),
                parity_choice: choice.to_string(),
            },
        )
        .to_value()
    }

    fn notify_match_result(&self, params: Value) -> Result<Value, LeagueError> {
        let game_over: Message<GameOver> = decode(params, MessageType::GameOver)?;
        let match_id = game_over.envelope.require_match_id()?;
        let player_id = self.player_id();
        let recorded = lock(&self.state)
            .record(match_id, &player_id, &game_over.payload.game_result)
            .cloned();
        match recorded {
            Some(record) => self.events.info(
                "MATCH_RESULT",
                json!({
                    "match_id": match_id,
                    "result": record.result,
                    "my_choice": record.my_choice,
                    "opponent_choice": record.opponent_choice,
                    "drawn_number": record.drawn_number,
                    "stats": self.stats(),
                }),
            ),
            None => self
                .events
                .debug("DUPLICATE_MATCH_RESULT", json!({"match_id": match_id})),
        }
        self.acknowledge(&game_over.envelope)
    }

    fn round_announcement(&self, params: Value) -> Result<Value, LeagueError> {
        let announcement: Message<RoundAnnouncement> =
            decode(params, MessageType::RoundAnnouncement)?;
        let player_id = self.player_id();
        let mine: Vec<ScheduledMatch> = announcement
            .payload
            .matches
            .into_iter()
            .filter(|m| m.player_a_id == player_id || m.player_b_id == player_id)
            .collect();
        self.events.info(
            "ROUND_ANNOUNCED",
            json!({"round_id": announcement.envelope.round_id, "my_matches": mine.len()}),
        );
        {
            let mut league = lock(&self.league);
            league.current_round = announcement.envelope.round_id;
            league.upcoming = mine;
        }
        self.acknowledge(&announcement.envelope)
    }

    fn round_completed(&self, params: Value) -> Result<Value, LeagueError> {
        let completed: Message<RoundCompleted> = decode(params, MessageType::RoundCompleted)?;
        lock(&self.league).upcoming.clear();
        self.events.info(
            "ROUND_COMPLETED",
            json!({
                "round_id": completed.envelope.round_id,
                "matches_completed": completed.payload.matches_completed,
                "next_round_id": completed.payload.next_round_id,
            }),
        );
        self.acknowledge(&completed.envelope)
    }

    fn league_standings_update(&self, params: Value) -> Result<Value, LeagueError> {
        let update: Message<StandingsUpdate> =
            decode(params, MessageType::LeagueStandingsUpdate)?;
        let player_id = self.player_id();
        let rank = update
            .payload
            .standings
            .iter()
            .find(|row| row.player_id == player_id)
            .map(|row| row.rank);
        self.events.debug("STANDINGS_UPDATE", json!({"rank": rank}));
        lock(&self.league).standings = update.payload.standings;
        self.acknowledge(&update.envelope)
    }

    fn league_completed(&self, params: Value) -> Result<Value, LeagueError> {
        let completed: Message<LeagueCompleted> = decode(params, MessageType::LeagueCompleted)?;
        let champion = completed.payload.champion.map(|row| row.player_id);
        self.events.info(
            "LEAGUE_COMPLETED",
            json!({"champion": champion, "stats": self.stats()}),
        );
        {
            let mut league = lock(&self.league);
            league.completed = true;
            league.champion = champion;
            league.standings = completed.payload.standings;
            league.upcoming.clear();
        }
        self.acknowledge(&completed.envelope)
    }

    /// Acknowledgements echo the message type of the notification they answer.
    fn acknowledge(&self, request: &Envelope) -> Result<Value, LeagueError> {
        let envelope = self.reply_envelope(request, request.message_type);
        Message::new(envelope, Acknowledgement::new(AckStatus::Acknowledged)).to_value()
    }

    /// `POST /mcp` plus the diagnostic routes.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/stats", get(stats))
            .route("/history", get(history))
            .with_state(self.clone())
            .merge(mcp_router(self.clone()))
    }
}

impl RpcService for Player {
    fn component(&self) -> &str {
        "player"
    }

    fn sender(&self) -> String {
        self.sender_name()
    }

    fn error_message_type(&self) -> MessageType {
        MessageType::GameError
    }

    fn events(&self) -> &EventLog {
        &self.events
    }

    async fn dispatch(self: Arc<Self>, method: String, params: Value) -> Result<Value, LeagueError> {
        match method.as_str() {
            "handle_game_invitation" => self.handle_game_invitation(params),
            "choose_parity" => self.choose_parity(params),
            "notify_match_result" => self.notify_match_result(params),
            "round_announcement" => self.round_announcement(params),
            "round_completed" => self.round_completed(params),
            "league_standings_update" => self.league_standings_update(params),
            "league_completed" => self.league_completed(params),
            _ => Err(LeagueError::MethodNotFound(method)),
        }
    }
}

async fn health(State(player): State<Arc<Player>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "component": "player",
        "player_id": player.credentials().map(|c| c.player_id),
    }))
}

async fn status(State(player): State<Arc<Player>>) -> Json<PlayerStatus> {
    Json(player.status())
}

async fn stats(State(player): State<Arc<Player>>) -> Json<Value> {
    let (stats, games_played, win_rate) = {
        let state = lock(&player.state);
        (state.stats(), state.games_played(), state.win_rate())
    };
    Json(json!({
        "player_id": player.player_id(),
        "stats": stats,
        "games_played": games_played,
        "win_rate": win_rate,
    }))
}

async fn history(State(player): State<Arc<Player>>) -> Json<Value> {
    Json(json!({"player_id": player.player_id(), "history": player.history()}))
}
