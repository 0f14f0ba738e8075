//! The Referee: accepts match assignments from the League Manager and runs each match on its own
//! task, up to a fixed number at once.

pub mod active_match;
pub mod match_runner;

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{bail, Context};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, instrument};

use crate::agent::{sender_name, AgentRole};
use crate::configuration::Configuration;
use crate::error::{ErrorCode, LeagueError};
use crate::game_interface::{EvenOdd, GameRules};
use crate::logger::EventLog;
use crate::protocol::messages::{
    AckStatus, Acknowledgement, LeagueQuery, LeagueQueryResponse, MatchAssignment, PlayerStats,
    QueryParams, QueryType, RefereeMeta, RefereeRegisterRequest, RefereeRegisterResponse,
    RegistrationStatus,
};
use crate::protocol::{decode, new_conversation_id, Envelope, Message, MessageType};
use crate::server::{mcp_router, RpcService};
use crate::transport::McpClient;

pub use active_match::{ActiveMatch, ActiveMatches, MatchState};
pub use match_runner::{AssignedMatch, Verdict};

/// Fixed settings of a referee process.
#[derive(Debug, Clone)]
pub struct RefereeSettings {
    pub display_name: String,
    /// This referee's own `POST /mcp` URL.
    pub contact_endpoint: String,
    /// The League Manager's `POST /mcp` URL.
    pub league_endpoint: String,
    pub max_concurrent_matches: u32,
}

/// What the League Manager handed back at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub referee_id: String,
    pub auth_token: String,
    pub league_id: Option<String>,
}

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct RefereeStatus {
    pub referee_id: Option<String>,
    pub display_name: String,
    pub registered: bool,
    pub max_concurrent_matches: u32,
    pub available_slots: usize,
    pub active_matches: Vec<ActiveMatch>,
}

pub struct Referee<R: GameRules = EvenOdd> {
    settings: RefereeSettings,
    config: Configuration,
    rules: R,
    client: McpClient,
    credentials: RwLock<Option<Credentials>>,
    active: ActiveMatches,
    capacity: Arc<Semaphore>,
    events: EventLog,
}

impl<R: GameRules> Referee<R> {
    pub fn new(settings: RefereeSettings, config: Configuration, rules: R) -> Self {
        let events = EventLog::new(
            format!("referee_{}", settings.display_name),
            Some(config.league_id()),
            config.log_root(),
        );
        Referee {
            client: McpClient::new(config.retry_policy()),
            capacity: Arc::new(Semaphore::new(settings.max_concurrent_matches.max(1) as usize)),
            credentials: RwLock::new(None),
            active: ActiveMatches::default(),
            events,
            rules,
            config,
            settings,
        }
    }

    pub fn settings(&self) -> &RefereeSettings {
        &self.settings
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_matches(&self) -> &ActiveMatches {
        &self.active
    }

    /// `referee:REF01` once registered, `referee:<display name>` before.
    pub fn sender_name(&self) -> String {
        match self.credentials() {
            Some(credentials) => sender_name(AgentRole::Referee, &credentials.referee_id),
            None => sender_name(AgentRole::Referee, &self.settings.display_name),
        }
    }

    pub fn status(&self) -> RefereeStatus {
        let credentials = self.credentials();
        RefereeStatus {
            registered: credentials.is_some(),
            referee_id: credentials.map(|c| c.referee_id),
            display_name: self.settings.display_name.clone(),
            max_concurrent_matches: self.settings.max_concurrent_matches,
            available_slots: self.capacity.available_permits(),
            active_matches: self.active.snapshot(),
        }
    }

    /// Registers with the League Manager and keeps the credentials it returns.
    #[instrument(skip(self), fields(display_name = %self.settings.display_name))]
    pub async fn register(&self) -> anyhow::Result<Credentials> {
        let message = Message::new(
            Envelope::new(
                MessageType::RefereeRegisterRequest,
                self.sender_name(),
                new_conversation_id("register"),
            ),
            RefereeRegisterRequest {
                referee_meta: RefereeMeta {
                    display_name: self.settings.display_name.clone(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    game_types: vec![self.rules.game_type().to_string()],
                    contact_endpoint: self.settings.contact_endpoint.clone(),
                    max_concurrent_matches: self.settings.max_concurrent_matches,
                },
            },
        );
        let reply: Message<RefereeRegisterResponse> = self
            .client
            .send(
                &self.settings.league_endpoint,
                "register_referee",
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
        let credentials = Credentials {
            referee_id: response
                .referee_id
                .context("accepted registration without a referee_id")?,
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
        info!(referee_id = %credentials.referee_id, "registered");
        self.events.info(
            "REGISTERED",
            json!({"referee_id": credentials.referee_id, "league_id": credentials.league_id}),
        );
        Ok(credentials)
    }

    /// Accepts a `MATCH_ASSIGNMENT` and starts the match in the background.
    #[instrument(skip_all)]
    fn assign_match(self: Arc<Self>, params: Value) -> Result<Value, LeagueError> {
        let assignment: Message<MatchAssignment> = decode(params, MessageType::MatchAssignment)?;
        let credentials = self.credentials().ok_or_else(|| {
            LeagueError::protocol(
                ErrorCode::RefereeNotRegistered,
                "referee has not registered yet",
            )
        })?;
        let token = assignment.envelope.require_auth_token()?;
        if token != credentials.auth_token {
            return Err(LeagueError::protocol(
                ErrorCode::AuthTokenInvalid,
                "auth_token was not issued to this referee",
            ));
        }
        let match_id = assignment.envelope.require_match_id()?.to_string();
        let round_id = assignment.envelope.require_round_id()?;
        let payload = assignment.payload;
        if payload.game_type != self.rules.game_type() {
            return Err(LeagueError::InvalidParams(format!(
                "cannot referee {}",
                payload.game_type
            )));
        }
        if self.active.get(&match_id).is_some() {
            return Err(LeagueError::Rejected(format!("{match_id} is already active")));
        }
        let permit = self
            .capacity
            .clone()
            .try_acquire_owned()
            .map_err(|_| LeagueError::Rejected("referee at capacity".into()))?;

        let assigned = AssignedMatch {
            match_id: match_id.clone(),
            round_id,
            league_id: assignment
                .envelope
                .league_id
                .clone()
                .or(credentials.league_id),
            conversation_id: assignment.envelope.conversation_id.clone(),
            player_a_id: payload.player_a_id,
            player_b_id: payload.player_b_id,
            player_a_endpoint: payload.player_a_endpoint,
            player_b_endpoint: payload.player_b_endpoint,
        };
        let active = ActiveMatch::new(
            &match_id,
            round_id,
            &assigned.player_a_id,
            &assigned.player_b_id,
            &assigned.conversation_id,
        );
        if !self.active.insert(active) {
            return Err(LeagueError::Rejected(format!("{match_id} is already active")));
        }
        self.events.info(
            "MATCH_ASSIGNED",
            json!({
                "match_id": match_id,
                "player_A_id": assigned.player_a_id,
                "player_B_id": assigned.player_b_id,
                "conversation_id": assigned.conversation_id,
            }),
        );

        let referee = self.clone();
        tokio::spawn(referee.supervise(assigned, permit));

        let envelope = assignment
            .envelope
            .reply(MessageType::MatchAssignmentAck, self.sender_name());
        Message::new(envelope, Acknowledgement::new(AckStatus::Accepted)).to_value()
    }

    /// Runs the match on its own task so a panic still ends in a reported result. The slot is
    /// freed before the report goes out, so the League Manager never sees it still taken.
    async fn supervise(self: Arc<Self>, assigned: AssignedMatch, permit: OwnedSemaphorePermit) {
        let match_id = assigned.match_id.clone();
        let runner = {
            let referee = self.clone();
            let assigned = assigned.clone();
            tokio::spawn(async move { match_runner::run_match(&referee, assigned).await })
        };
        let verdict = match runner.await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(%match_id, error = %e, "match task failed");
                let verdict = match self.active.get(&match_id) {
                    Some(active) => match_runner::fault_verdict(&active),
                    None => Verdict::double_technical_loss(
                        &assigned.player_a_id,
                        &assigned.player_b_id,
                        "match interrupted by an internal fault",
                    ),
                };
                self.events.error(
                    "MATCH_FAULT",
                    json!({"match_id": match_id, "error": e.to_string(), "status": verdict.status}),
                );
                verdict
            }
        };
        self.active.remove(&match_id);
        drop(permit);
        self.report(&assigned, &verdict).await;
    }

    /// Current record of `player_id`, zeroed when the League Manager cannot tell.
    async fn player_stats(&self, player_id: &str) -> PlayerStats {
        let Some(credentials) = self.credentials() else {
            return PlayerStats::default();
        };
        let message = Message::new(
            Envelope::new(
                MessageType::LeagueQuery,
                self.sender_name(),
                new_conversation_id("stats"),
            )
            .with_auth_token(Some(credentials.auth_token)),
            LeagueQuery {
                query_type: QueryType::GetPlayerStats,
                query_params: QueryParams {
                    player_id: Some(player_id.to_string()),
                },
            },
        );
        let reply = self
            .client
            .send_no_retry::<_, LeagueQueryResponse>(
                &self.settings.league_endpoint,
                "league_query",
                &message,
                self.config.timeouts().query,
            )
            .await;
        match reply {
            Ok(reply) => reply.payload.stats.unwrap_or_default(),
            Err(e) => {
                tracing::debug!(player_id, error = %e, "standings unavailable");
                PlayerStats::default()
            }
        }
    }

    /// `POST /mcp` plus `GET /health` and `GET /status`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health::<R>))
            .route("/status", get(status::<R>))
            .with_state(self.clone())
            .merge(mcp_router(self.clone()))
    }
}

impl<R: GameRules> RpcService for Referee<R> {
    fn component(&self) -> &str {
        "referee"
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
            "assign_match" => self.assign_match(params),
            _ => Err(LeagueError::MethodNotFound(method)),
        }
    }
}

async fn health<R: GameRules>(State(referee): State<Arc<Referee<R>>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "component": "referee",
        "referee_id": referee.credentials().map(|c| c.referee_id),
    }))
}

async fn status<R: GameRules>(State(referee): State<Arc<Referee<R>>>) -> Json<RefereeStatus> {
    Json(referee.status())
}
