//! Error codes and typed errors shared by every league role.
//!
//! Two layers of codes travel on the wire:
//! - the short league codes (`E001`, `E012`, ...) defined by [`ErrorCode`], which existing
//!   referees and players match on verbatim;
//! - the numeric JSON-RPC codes in [`rpc_code`], used in the `error.code` field of a response.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric JSON-RPC 2.0 error codes used by every role.
pub mod rpc_code {
    /// Body is not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Body is JSON but not a JSON-RPC 2.0 request.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown `method`.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// `params` could not be used for the requested method.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Local failure while building the response.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// League-level rejection, `data` carries the league error code.
    pub const LEAGUE_ERROR: i64 = -32000;
    /// Transport failure after retries were exhausted.
    pub const TRANSPORT_ERROR: i64 = -32001;
}

/// Machine-readable league error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E001")]
    Timeout,
    #[serde(rename = "E003")]
    MissingRequiredField,
    #[serde(rename = "E004")]
    InvalidParityChoice,
    #[serde(rename = "E005")]
    PlayerNotRegistered,
    #[serde(rename = "E009")]
    ConnectionError,
    #[serde(rename = "E011")]
    AuthTokenMissing,
    #[serde(rename = "E012")]
    AuthTokenInvalid,
    #[serde(rename = "E013")]
    RefereeNotRegistered,
    #[serde(rename = "E018")]
    ProtocolVersionMismatch,
    #[serde(rename = "E021")]
    InvalidTimestamp,
}

impl ErrorCode {
    const ALL: [ErrorCode; 10] = [
        ErrorCode::Timeout,
        ErrorCode::MissingRequiredField,
        ErrorCode::InvalidParityChoice,
        ErrorCode::PlayerNotRegistered,
        ErrorCode::ConnectionError,
        ErrorCode::AuthTokenMissing,
        ErrorCode::AuthTokenInvalid,
        ErrorCode::RefereeNotRegistered,
        ErrorCode::ProtocolVersionMismatch,
        ErrorCode::InvalidTimestamp,
    ];

    /// The wire form, e.g. `"E012"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Timeout => "E001",
            ErrorCode::MissingRequiredField => "E003",
            ErrorCode::InvalidParityChoice => "E004",
            ErrorCode::PlayerNotRegistered => "E005",
            ErrorCode::ConnectionError => "E009",
            ErrorCode::AuthTokenMissing => "E011",
            ErrorCode::AuthTokenInvalid => "E012",
            ErrorCode::RefereeNotRegistered => "E013",
            ErrorCode::ProtocolVersionMismatch => "E018",
            ErrorCode::InvalidTimestamp => "E021",
        }
    }

    /// The `error_description` companion of the code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Timeout => "TIMEOUT_ERROR",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidParityChoice => "INVALID_PARITY_CHOICE",
            ErrorCode::PlayerNotRegistered => "PLAYER_NOT_REGISTERED",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::AuthTokenMissing => "AUTH_TOKEN_MISSING",
            ErrorCode::AuthTokenInvalid => "AUTH_TOKEN_INVALID",
            ErrorCode::RefereeNotRegistered => "REFEREE_NOT_REGISTERED",
            ErrorCode::ProtocolVersionMismatch => "PROTOCOL_VERSION_MISMATCH",
            ErrorCode::InvalidTimestamp => "INVALID_TIMESTAMP",
        }
    }

    /// Parses the wire form back into a code.
    pub fn from_code(code: &str) -> Option<ErrorCode> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an inbound request, turned into a JSON-RPC error by the server.
#[derive(Debug, Error)]
pub enum LeagueError {
    /// Protocol or game-rule failure identified by a league code.
    #[error("{code} {}: {message}", code.description())]
    Protocol { code: ErrorCode, message: String },

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// League-level refusal that has no dedicated code (capacity, duplicates...).
    #[error("{0}")]
    Rejected(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LeagueError {
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        LeagueError::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            LeagueError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn rpc_code(&self) -> i64 {
        match self {
            LeagueError::Protocol { .. } | LeagueError::Rejected(_) => rpc_code::LEAGUE_ERROR,
            LeagueError::MethodNotFound(_) => rpc_code::METHOD_NOT_FOUND,
            LeagueError::InvalidParams(_) => rpc_code::INVALID_PARAMS,
            LeagueError::Serialization(_) => rpc_code::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_their_wire_form() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_code(code.as_str()), Some(code));
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
        assert_eq!(ErrorCode::from_code("E999"), None);
    }

    #[test]
    fn protocol_errors_map_to_league_rpc_code() {
        let err = LeagueError::protocol(ErrorCode::AuthTokenInvalid, "unknown token");
        assert_eq!(err.rpc_code(), rpc_code::LEAGUE_ERROR);
        assert_eq!(err.error_code(), Some(ErrorCode::AuthTokenInvalid));
        assert_eq!(err.to_string(), "E012 AUTH_TOKEN_INVALID: unknown token");

        let err = LeagueError::MethodNotFound("nope".into());
        assert_eq!(err.rpc_code(), rpc_code::METHOD_NOT_FOUND);
        assert_eq!(err.error_code(), None);
    }
}
