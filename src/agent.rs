use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Role of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Referee,
    Player,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Referee => "referee",
            AgentRole::Player => "player",
        }
    }

    /// Prefix of the ids minted for this role, `REF01` or `P01`.
    pub fn id_prefix(self) -> &'static str {
        match self {
            AgentRole::Referee => "REF",
            AgentRole::Player => "P",
        }
    }

    pub fn format_id(self, sequence: u32) -> String {
        format!("{}{sequence:02}", self.id_prefix())
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `role:id`, as used in the `sender` field.
pub fn sender_name(role: AgentRole, id: &str) -> String {
    format!("{role}:{id}")
}

/// A referee or player known to the League Manager.
///
/// Everything but the live match counter is fixed at registration.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: String,
    pub role: AgentRole,
    pub display_name: String,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    pub version: String,
    pub capabilities: Vec<String>,
    /// Referees only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_matches: Option<u32>,
    pub active_matches: u32,
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Identity {
    pub fn sender(&self) -> String {
        sender_name(self.role, &self.id)
    }

    /// Whether the agent may take another match. Players are never limited.
    pub fn has_capacity(&self) -> bool {
        match self.max_concurrent_matches {
            Some(max) => self.active_matches < max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_zero_padded_and_prefixed() {
        assert_eq!(AgentRole::Player.format_id(1), "P01");
        assert_eq!(AgentRole::Referee.format_id(12), "REF12");
        assert_eq!(AgentRole::Player.format_id(100), "P100");
        assert_eq!(sender_name(AgentRole::Player, "P01"), "player:P01");
    }

    #[test]
    fn referee_capacity_is_bounded() {
        let mut referee = Identity {
            id: "REF01".into(),
            role: AgentRole::Referee,
            display_name: "ref".into(),
            endpoint: "http://localhost:8001/mcp".into(),
            auth_token: "tok-0".into(),
            version: "1.0.0".into(),
            capabilities: vec!["even_odd".into()],
            max_concurrent_matches: Some(1),
            active_matches: 0,
        };
        assert!(referee.has_capacity());
        referee.active_matches = 1;
        assert!(!referee.has_capacity());
        assert_eq!(referee.sender(), "referee:REF01");
    }
}
