//! Wire format of the league: the message envelope, JSON-RPC framing and boundary validation.
//!
//! Every JSON-RPC `params` object is a flattened [`Message`]: the [`Envelope`] fields
//! (`protocol`, `message_type`, `sender`, `timestamp`, `conversation_id`, ...) side by side with
//! the payload fields of the message kind. Inbound bodies are turned into typed messages with
//! [`decode`], which either yields a fully validated message or an error, never a half-built one.

pub mod messages;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::error::{ErrorCode, LeagueError};

/// The only protocol version spoken by this crate.
pub const PROTOCOL_VERSION: &str = "league.v2";

pub const JSONRPC_VERSION: &str = "2.0";

/// Sender name of the League Manager.
pub const LEAGUE_MANAGER_SENDER: &str = "league_manager";

/// Every message kind exchanged between roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    RefereeRegisterRequest,
    RefereeRegisterResponse,
    LeagueRegisterRequest,
    LeagueRegisterResponse,
    RoundAnnouncement,
    RoundCompleted,
    MatchAssignment,
    MatchAssignmentAck,
    GameInvitation,
    GameJoinAck,
    ChooseParityCall,
    ChooseParityResponse,
    GameOver,
    MatchResultReport,
    MatchResultAck,
    LeagueStandingsUpdate,
    LeagueCompleted,
    LeagueQuery,
    LeagueQueryResponse,
    LeagueError,
    GameError,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::RefereeRegisterRequest => "REFEREE_REGISTER_REQUEST",
            MessageType::RefereeRegisterResponse => "REFEREE_REGISTER_RESPONSE",
            MessageType::LeagueRegisterRequest => "LEAGUE_REGISTER_REQUEST",
            MessageType::LeagueRegisterResponse => "LEAGUE_REGISTER_RESPONSE",
            MessageType::RoundAnnouncement => "ROUND_ANNOUNCEMENT",
            MessageType::RoundCompleted => "ROUND_COMPLETED",
            MessageType::MatchAssignment => "MATCH_ASSIGNMENT",
            MessageType::MatchAssignmentAck => "MATCH_ASSIGNMENT_ACK",
            MessageType::GameInvitation => "GAME_INVITATION",
            MessageType::GameJoinAck => "GAME_JOIN_ACK",
            MessageType::ChooseParityCall => "CHOOSE_PARITY_CALL",
            MessageType::ChooseParityResponse => "CHOOSE_PARITY_RESPONSE",
            MessageType::GameOver => "GAME_OVER",
            MessageType::MatchResultReport => "MATCH_RESULT_REPORT",
            MessageType::MatchResultAck => "MATCH_RESULT_ACK",
            MessageType::LeagueStandingsUpdate => "LEAGUE_STANDINGS_UPDATE",
            MessageType::LeagueCompleted => "LEAGUE_COMPLETED",
            MessageType::LeagueQuery => "LEAGUE_QUERY",
            MessageType::LeagueQueryResponse => "LEAGUE_QUERY_RESPONSE",
            MessageType::LeagueError => "LEAGUE_ERROR",
            MessageType::GameError => "GAME_ERROR",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn utc_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .unwrap_or_default()
}

/// Parses a timestamp produced by [`utc_timestamp`].
pub fn parse_timestamp(timestamp: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        timestamp,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
    )
    .ok()
}

/// UTC time `after` from now, formatted like [`utc_timestamp`].
pub fn utc_timestamp_after(after: std::time::Duration) -> String {
    (OffsetDateTime::now_utc() + after)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .unwrap_or_default()
}

/// A fresh conversation id, e.g. `conv-R1M1-3f2a9c1b`.
pub fn new_conversation_id(scope: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("conv-{scope}-{}", &uuid[..8])
}

/// Common header of every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub message_type: MessageType,
    pub sender: String,
    pub timestamp: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
}

impl Envelope {
    pub fn new(
        message_type: MessageType,
        sender: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Envelope {
            protocol: PROTOCOL_VERSION.to_string(),
            message_type,
            sender: sender.into(),
            timestamp: utc_timestamp(),
            conversation_id: conversation_id.into(),
            auth_token: None,
            league_id: None,
            round_id: None,
            match_id: None,
        }
    }

    /// Envelope of a response: same conversation and scoping ids, new type and sender.
    pub fn reply(&self, message_type: MessageType, sender: impl Into<String>) -> Self {
        Envelope {
            auth_token: None,
            league_id: self.league_id.clone(),
            round_id: self.round_id,
            match_id: self.match_id.clone(),
            ..Envelope::new(message_type, sender, self.conversation_id.clone())
        }
    }

    pub fn with_auth_token(mut self, auth_token: Option<String>) -> Self {
        self.auth_token = auth_token;
        self
    }

    pub fn with_league_id(mut self, league_id: impl Into<String>) -> Self {
        self.league_id = Some(league_id.into());
        self
    }

    pub fn with_round_id(mut self, round_id: u32) -> Self {
        self.round_id = Some(round_id);
        self
    }

    pub fn with_match_id(mut self, match_id: impl Into<String>) -> Self {
        self.match_id = Some(match_id.into());
        self
    }

    /// Checks the protocol version and the timestamp format.
    pub fn validate(&self) -> Result<(), LeagueError> {
        if self.protocol != PROTOCOL_VERSION {
            return Err(LeagueError::protocol(
                ErrorCode::ProtocolVersionMismatch,
                format!(
                    "expected protocol {PROTOCOL_VERSION}, got {}",
                    self.protocol
                ),
            ));
        }
        if parse_timestamp(&self.timestamp).is_none() {
            return Err(LeagueError::protocol(
                ErrorCode::InvalidTimestamp,
                format!("timestamp {:?} is not YYYY-MM-DDTHH:MM:SSZ", self.timestamp),
            ));
        }
        Ok(())
    }

    pub fn require_match_id(&self) -> Result<&str, LeagueError> {
        self.match_id.as_deref().ok_or_else(|| {
            LeagueError::protocol(ErrorCode::MissingRequiredField, "missing match_id")
        })
    }

    pub fn require_round_id(&self) -> Result<u32, LeagueError> {
        self.round_id.ok_or_else(|| {
            LeagueError::protocol(ErrorCode::MissingRequiredField, "missing round_id")
        })
    }

    pub fn require_auth_token(&self) -> Result<&str, LeagueError> {
        match self.auth_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(LeagueError::protocol(
                ErrorCode::AuthTokenMissing,
                "auth_token is required",
            )),
        }
    }
}

/// An envelope and the payload of one message kind, flattened on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<P> {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Message<P> {
    pub fn new(envelope: Envelope, payload: P) -> Self {
        Message { envelope, payload }
    }
}

impl<P: Serialize> Message<P> {
    pub fn to_value(&self) -> Result<Value, LeagueError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Decodes and validates an inbound message of the expected kind.
pub fn decode<P: DeserializeOwned>(
    params: Value,
    expected: MessageType,
) -> Result<Message<P>, LeagueError> {
    let message = decode_any::<P>(params)?;
    if message.envelope.message_type != expected {
        return Err(LeagueError::InvalidParams(format!(
            "expected {expected}, got {}",
            message.envelope.message_type
        )));
    }
    Ok(message)
}

/// Decodes and validates a message whatever its kind.
pub fn decode_any<P: DeserializeOwned>(params: Value) -> Result<Message<P>, LeagueError> {
    // Version and timestamp are reported before payload shape problems.
    if let Ok(envelope) = serde_json::from_value::<Envelope>(params.clone()) {
        envelope.validate()?;
    }
    let message: Message<P> = serde_json::from_value(params).map_err(|e| {
        LeagueError::protocol(ErrorCode::MissingRequiredField, format!("malformed message: {e}"))
    })?;
    message.envelope.validate()?;
    Ok(message)
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Value::from(id),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The league code carried in `data.error_code`, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.data
            .as_ref()?
            .get("error_code")?
            .as_str()
            .and_then(ErrorCode::from_code)
    }
}

/// JSON-RPC 2.0 response, either `result` or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}
