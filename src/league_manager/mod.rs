//! The League Manager: registration, schedule, result intake and standings.
//!
//! All state lives in two lock-guarded stores owned by [`LeagueManager`]: the [`Registry`] and
//! the league table (schedule and standings). Handlers never hold a lock across an `.await`, so
//! point totals are never observed half-updated.

pub mod conductor;
pub mod registry;
pub mod standings;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{error, instrument};

use crate::configuration::Configuration;
use crate::error::{ErrorCode, LeagueError};
use crate::game_interface::GameType;
use crate::lock;
use crate::logger::EventLog;
use crate::protocol::messages::{
    AckStatus, Acknowledgement, LeagueQuery, LeagueQueryResponse, MatchResultReport, MatchStatus,
    PlayerRegisterRequest, PlayerRegisterResponse, QueryType, RefereeRegisterRequest,
    RefereeRegisterResponse, RegistrationStatus, ScheduleEntry, StandingRow,
};
use crate::protocol::{decode, utc_timestamp, Message, MessageType, LEAGUE_MANAGER_SENDER};
use crate::server::{mcp_router, RpcService};
use crate::storage::{DataStore, MatchRecord, StandingsDocument, SCHEMA_VERSION};
use crate::tournament_scheduler::{
    create_round_robin_schedule, Completion, LeagueSchedule, Match,
};
use crate::transport::McpClient;

pub use registry::{Registration, Registry};
pub use standings::{Standing, StandingsTable};

#[derive(Debug, Default)]
struct LeagueTable {
    schedule: LeagueSchedule,
    standings: StandingsTable,
    current_round: u32,
    rounds_completed: u32,
}

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct LeagueStatus {
    pub league_id: String,
    pub game_type: GameType,
    pub running: bool,
    pub referees: usize,
    pub players: usize,
    pub total_matches: usize,
    pub completed_matches: usize,
    pub total_rounds: u32,
    pub current_round: u32,
    pub rounds_completed: u32,
}

pub struct LeagueManager {
    config: Configuration,
    game_type: GameType,
    registry: Mutex<Registry>,
    table: Mutex<LeagueTable>,
    store: DataStore,
    events: EventLog,
    client: McpClient,
    /// Bumped on every recorded result.
    progress: watch::Sender<u64>,
    running: AtomicBool,
}

impl LeagueManager {
    pub fn new(config: Configuration) -> Self {
        let game_type = GameType::EvenOdd;
        let events = EventLog::new("league_manager", Some(&config.league_id), &config.log_root);
        let (progress, _) = watch::channel(0);
        LeagueManager {
            game_type,
            registry: Mutex::new(Registry::new(game_type)),
            table: Mutex::new(LeagueTable::default()),
            store: DataStore::new(config.data_root.clone()),
            events,
            client: McpClient::new(config.retry),
            progress,
            running: AtomicBool::new(false),
            config,
        }
    }

    pub fn league_id(&self) -> &str {
        &self.config.league_id
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn player_count(&self) -> usize {
        lock(&self.registry).players().len()
    }

    pub fn referee_count(&self) -> usize {
        lock(&self.registry).referees().len()
    }

    pub fn ranked_standings(&self) -> Vec<StandingRow> {
        lock(&self.table).standings.ranked()
    }

    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        lock(&self.table).schedule.entries()
    }

    pub fn status(&self) -> LeagueStatus {
        let (referees, players) = {
            let registry = lock(&self.registry);
            (registry.referees().len(), registry.players().len())
        };
        let table = lock(&self.table);
        LeagueStatus {
            league_id: self.config.league_id.clone(),
            game_type: self.game_type,
            running: self.is_running(),
            referees,
            players,
            total_matches: table.schedule.matches().len(),
            completed_matches: table.schedule.completed_count(),
            total_rounds: table.schedule.total_rounds(),
            current_round: table.current_round,
            rounds_completed: table.rounds_completed,
        }
    }

    /// Round-robin schedule over the registered players, in registration order.
    ///
    /// Refused once a match has started.
    pub fn create_schedule(&self) -> Result<Vec<ScheduleEntry>, LeagueError> {
        let player_ids = lock(&self.registry).player_ids();
        let mut table = lock(&self.table);
        let started = table
            .schedule
            .matches()
            .iter()
            .any(|m| m.status != MatchStatus::Pending);
        if started {
            return Err(LeagueError::Rejected("league already underway".into()));
        }
        table.schedule = LeagueSchedule::new(create_round_robin_schedule(&player_ids));
        table.current_round = 0;
        table.rounds_completed = 0;
        self.events.info(
            "SCHEDULE_CREATED",
            json!({
                "players": player_ids.len(),
                "matches": table.schedule.matches().len(),
                "rounds": table.schedule.total_rounds(),
            }),
        );
        Ok(table.schedule.entries())
    }

    fn register_referee(&self, params: Value) -> Result<Value, LeagueError> {
        let request: Message<RefereeRegisterRequest> =
            decode(params, MessageType::RefereeRegisterRequest)?;
        let registration = lock(&self.registry).register_referee(&request.payload.referee_meta);
        let mut auth_token = None;
        let payload = match registration {
            Registration::Accepted { identity, renewed } => {
                self.events.info(
                    "REFEREE_REGISTERED",
                    json!({"referee_id": identity.id, "endpoint": identity.endpoint, "renewed": renewed}),
                );
                auth_token = Some(identity.auth_token);
                RefereeRegisterResponse {
                    status: RegistrationStatus::Accepted,
                    referee_id: Some(identity.id),
                    reason: None,
                }
            }
            Registration::Rejected { reason } => {
                self.events.warning(
                    "REGISTRATION_REJECTED",
                    json!({"sender": request.envelope.sender, "reason": reason}),
                );
                RefereeRegisterResponse {
                    status: RegistrationStatus::Rejected,
                    referee_id: None,
                    reason: Some(reason),
                }
            }
        };
        let envelope = request
            .envelope
            .reply(MessageType::RefereeRegisterResponse, LEAGUE_MANAGER_SENDER)
            .with_auth_token(auth_token)
            .with_league_id(self.league_id());
        Message::new(envelope, payload).to_value()
    }

    fn register_player(&self, params: Value) -> Result<Value, LeagueError> {
        let request: Message<PlayerRegisterRequest> =
            decode(params, MessageType::LeagueRegisterRequest)?;
        let registration = lock(&self.registry).register_player(&request.payload.player_meta);
        let mut auth_token = None;
        let payload = match registration {
            Registration::Accepted { identity, renewed } => {
                lock(&self.table)
                    .standings
                    .add_player(&identity.id, &identity.display_name);
                self.events.info(
                    "PLAYER_REGISTERED",
                    json!({"player_id": identity.id, "endpoint": identity.endpoint, "renewed": renewed}),
                );
                auth_token = Some(identity.auth_token);
                PlayerRegisterResponse {
                    status: RegistrationStatus::Accepted,
                    player_id: Some(identity.id),
                    reason: None,
                }
            }
            Registration::Rejected { reason } => {
                self.events.warning(
                    "REGISTRATION_REJECTED",
                    json!({"sender": request.envelope.sender, "reason": reason}),
                );
                PlayerRegisterResponse {
                    status: RegistrationStatus::Rejected,
                    player_id: None,
                    reason: Some(reason),
                }
            }
        };
        let envelope = request
            .envelope
            .reply(MessageType::LeagueRegisterResponse, LEAGUE_MANAGER_SENDER)
            .with_auth_token(auth_token)
            .with_league_id(self.league_id());
        Message::new(envelope, payload).to_value()
    }

    #[instrument(skip_all)]
    fn report_match_result(&self, params: Value) -> Result<Value, LeagueError> {
        let report: Message<MatchResultReport> = decode(params, MessageType::MatchResultReport)?;
        let referee_id = lock(&self.registry)
            .authenticate_referee(report.envelope.auth_token.as_deref())?
            .id
            .clone();
        let match_id = report.envelope.require_match_id()?.to_string();
        let payload = &report.payload;
        let result = &payload.result;

        let (completion, holds_slot, documents) = {
            let mut table = lock(&self.table);
            let scheduled = table
                .schedule
                .get(&match_id)
                .ok_or_else(|| LeagueError::InvalidParams(format!("unknown match {match_id}")))?;
            if scheduled.player_a_id != payload.player_a_id
                || scheduled.player_b_id != payload.player_b_id
            {
                return Err(LeagueError::InvalidParams(format!(
                    "{match_id} is {} vs {}, not {} vs {}",
                    scheduled.player_a_id,
                    scheduled.player_b_id,
                    payload.player_a_id,
                    payload.player_b_id
                )));
            }
            let (status, assigned) = (scheduled.status, scheduled.referee_id.clone());
            if status == MatchStatus::Completed {
                (Completion::AlreadyRecorded, false, None)
            } else if assigned.as_deref() != Some(referee_id.as_str()) {
                return Err(LeagueError::Rejected(match assigned {
                    Some(assigned) => format!("{match_id} is assigned to {assigned}, not {referee_id}"),
                    None => format!("{match_id} was never assigned"),
                }));
            } else {
                table.standings.apply(
                    &payload.player_a_id,
                    &payload.player_b_id,
                    result.status,
                    result.winner.as_deref(),
                )?;
                let completion = table.schedule.complete(&match_id, result)?;
                let record = table.schedule.get(&match_id).map(|m| self.match_record(m));
                // A pending match here is a late report after a failed assignment, whose slot
                // was already given back.
                let holds_slot = status == MatchStatus::InProgress;
                (completion, holds_slot, Some((record, self.standings_document(&table))))
            }
        };
        if let Some((record, standings)) = documents {
            if let Some(record) = record {
                self.persist_match(&record);
            }
            self.persist_standings(&standings);
        }

        let status = match completion {
            Completion::Recorded => {
                if holds_slot {
                    lock(&self.registry).release_referee(&referee_id);
                }
                self.progress.send_modify(|n| *n += 1);
                self.events.info(
                    "MATCH_RESULT_RECORDED",
                    json!({
                        "match_id": match_id,
                        "referee_id": referee_id,
                        "status": result.status,
                        "winner": result.winner,
                        "conversation_id": report.envelope.conversation_id,
                    }),
                );
                AckStatus::Recorded
            }
            Completion::AlreadyRecorded => {
                self.events.info(
                    "DUPLICATE_MATCH_RESULT",
                    json!({"match_id": match_id, "referee_id": referee_id}),
                );
                AckStatus::AlreadyRecorded
            }
        };
        let envelope = report
            .envelope
            .reply(MessageType::MatchResultAck, LEAGUE_MANAGER_SENDER)
            .with_league_id(self.league_id());
        Message::new(envelope, Acknowledgement::new(status)).to_value()
    }

    fn league_query(&self, params: Value) -> Result<Value, LeagueError> {
        if let Some(query_type) = params.get("query_type") {
            if serde_json::from_value::<QueryType>(query_type.clone()).is_err() {
                return Err(LeagueError::InvalidParams(format!(
                    "unknown query_type {query_type}"
                )));
            }
        }
        let query: Message<LeagueQuery> = decode(params, MessageType::LeagueQuery)?;
        lock(&self.registry).authenticate(query.envelope.auth_token.as_deref())?;

        let query_type = query.payload.query_type;
        let mut response = LeagueQueryResponse {
            query_type,
            standings: None,
            schedule: None,
            player_id: None,
            stats: None,
        };
        {
            let table = lock(&self.table);
            match query_type {
                QueryType::GetStandings => response.standings = Some(table.standings.ranked()),
                QueryType::GetSchedule => response.schedule = Some(table.schedule.entries()),
                QueryType::GetPlayerStats => {
                    let player_id = query.payload.query_params.player_id.clone().ok_or_else(|| {
                        LeagueError::protocol(
                            ErrorCode::MissingRequiredField,
                            "GET_PLAYER_STATS needs query_params.player_id",
                        )
                    })?;
                    let stats = table.standings.stats(&player_id).ok_or_else(|| {
                        LeagueError::protocol(
                            ErrorCode::PlayerNotRegistered,
                            format!("{player_id} is not registered"),
                        )
                    })?;
                    response.player_id = Some(player_id);
                    response.stats = Some(stats);
                }
            }
        }
        let envelope = query
            .envelope
            .reply(MessageType::LeagueQueryResponse, LEAGUE_MANAGER_SENDER)
            .with_league_id(self.league_id());
        Message::new(envelope, response).to_value()
    }

    fn standings_document(&self, table: &LeagueTable) -> StandingsDocument {
        StandingsDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            league_id: self.config.league_id.clone(),
            last_updated: utc_timestamp(),
            rounds_completed: table.rounds_completed,
            standings: table.standings.ranked(),
        }
    }

    fn match_record(&self, m: &Match) -> MatchRecord {
        MatchRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            league_id: self.config.league_id.clone(),
            match_id: m.match_id.clone(),
            round_id: m.round_id,
            player_a_id: m.player_a_id.clone(),
            player_b_id: m.player_b_id.clone(),
            status: m.status,
            winner: m.winner.clone(),
            result: m.result.clone(),
            recorded_at: utc_timestamp(),
        }
    }

    /// Called without the table lock held.
    fn persist_standings(&self, document: &StandingsDocument) {
        if let Err(e) = self.store.save_standings(document) {
            self.events.error(
                "PERSISTENCE_FAILED",
                json!({"document": "standings", "error": format!("{e:#}")}),
            );
        }
    }

    fn persist_match(&self, record: &MatchRecord) {
        if let Err(e) = self.store.save_match(record) {
            self.events.error(
                "PERSISTENCE_FAILED",
                json!({"document": "match", "match_id": record.match_id, "error": format!("{e:#}")}),
            );
        }
    }

    /// `POST /mcp` plus the diagnostic routes.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/standings", get(standings))
            .route("/schedule", get(schedule))
            .route("/create_schedule", post(create_schedule))
            .route("/start_league", post(start_league))
            .with_state(self.clone())
            .merge(mcp_router(self.clone()))
    }

    /// Runs the conductor in the background.
    pub fn spawn_league(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.clone().run_league().await {
                error!(error = %e, "league aborted");
                manager
                    .events
                    .error("LEAGUE_ABORTED", json!({"error": format!("{e:#}")}));
            }
        });
    }
}

impl RpcService for LeagueManager {
    fn component(&self) -> &str {
        "league_manager"
    }

    fn sender(&self) -> String {
        LEAGUE_MANAGER_SENDER.to_string()
    }

    fn error_message_type(&self) -> MessageType {
        MessageType::LeagueError
    }

    fn events(&self) -> &EventLog {
        &self.events
    }

    async fn dispatch(self: Arc<Self>, method: String, params: Value) -> Result<Value, LeagueError> {
        match method.as_str() {
            "register_referee" => self.register_referee(params),
            "register_player" => self.register_player(params),
            "report_match_result" => self.report_match_result(params),
            "league_query" => self.league_query(params),
            _ => Err(LeagueError::MethodNotFound(method)),
        }
    }
}

async fn health(State(manager): State<Arc<LeagueManager>>) -> Json<Value> {
    Json(json!({"status": "healthy", "component": "league_manager", "league_id": manager.league_id()}))
}

async fn status(State(manager): State<Arc<LeagueManager>>) -> Json<LeagueStatus> {
    Json(manager.status())
}

async fn standings(State(manager): State<Arc<LeagueManager>>) -> Json<Value> {
    Json(json!({"league_id": manager.league_id(), "standings": manager.ranked_standings()}))
}

async fn schedule(State(manager): State<Arc<LeagueManager>>) -> Json<Value> {
    Json(json!({"league_id": manager.league_id(), "schedule": manager.schedule()}))
}

async fn create_schedule(
    State(manager): State<Arc<LeagueManager>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match manager.create_schedule() {
        Ok(schedule) => Ok(Json(json!({"league_id": manager.league_id(), "schedule": schedule}))),
        Err(e) => Err((StatusCode::CONFLICT, Json(json!({"error": e.to_string()})))),
    }
}

async fn start_league(State(manager): State<Arc<LeagueManager>>) -> Json<Value> {
    if manager.is_running() {
        return Json(json!({"status": "already_running", "league_id": manager.league_id()}));
    }
    manager.spawn_league();
    Json(json!({"status": "started", "league_id": manager.league_id()}))
}
