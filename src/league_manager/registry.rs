//! Registered referees and players, their ids and auth tokens.

use std::collections::HashMap;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};

use crate::agent::{AgentRole, Identity};
use crate::error::{ErrorCode, LeagueError};
use crate::game_interface::GameType;
use crate::protocol::messages::{PlayerMeta, RefereeMeta};

/// Result of a registration attempt that was understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// `renewed` is true when the same agent registered again and got its identity back.
    Accepted { identity: Identity, renewed: bool },
    Rejected { reason: String },
}

/// `tok-` followed by 16 random bytes from the OS, in lowercase hex.
pub fn mint_auth_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("tok-{hex}")
}

type RegistrationKey = (AgentRole, String, String);

/// Identity store of the League Manager.
#[derive(Debug)]
pub struct Registry {
    game_type: GameType,
    agents: HashMap<String, Identity>,
    tokens: HashMap<String, String>,
    keys: HashMap<RegistrationKey, String>,
    referee_order: Vec<String>,
    player_order: Vec<String>,
}

impl Registry {
    pub fn new(game_type: GameType) -> Self {
        Registry {
            game_type,
            agents: HashMap::new(),
            tokens: HashMap::new(),
            keys: HashMap::new(),
            referee_order: vec![],
            player_order: vec![],
        }
    }

    pub fn register_referee(&mut self, meta: &RefereeMeta) -> Registration {
        self.register(
            AgentRole::Referee,
            &meta.display_name,
            &meta.contact_endpoint,
            &meta.version,
            &meta.game_types,
            Some(meta.max_concurrent_matches.max(1)),
        )
    }

    pub fn register_player(&mut self, meta: &PlayerMeta) -> Registration {
        self.register(
            AgentRole::Player,
            &meta.display_name,
            &meta.contact_endpoint,
            &meta.version,
            &meta.game_types,
            None,
        )
    }

    fn register(
        &mut self,
        role: AgentRole,
        display_name: &str,
        endpoint: &str,
        version: &str,
        game_types: &[String],
        max_concurrent_matches: Option<u32>,
    ) -> Registration {
        let display_name = display_name.trim();
        let endpoint = endpoint.trim();
        if display_name.is_empty() {
            return rejected("display_name must not be empty");
        }
        if endpoint.is_empty() {
            return rejected("contact_endpoint must not be empty");
        }
        if !game_types.iter().any(|g| g == self.game_type.as_str()) {
            return rejected(format!("{role} does not support {}", self.game_type));
        }

        let key = (role, display_name.to_string(), endpoint.to_string());
        if let Some(identity) = self.keys.get(&key).and_then(|id| self.agents.get(id)) {
            debug!(id = %identity.id, "repeated registration, returning existing identity");
            return Registration::Accepted {
                identity: identity.clone(),
                renewed: true,
            };
        }

        let order = match role {
            AgentRole::Referee => &mut self.referee_order,
            AgentRole::Player => &mut self.player_order,
        };
        let id = role.format_id(order.len() as u32 + 1);
        order.push(id.clone());

        let mut auth_token = mint_auth_token();
        while self.tokens.contains_key(&auth_token) {
            auth_token = mint_auth_token();
        }

        let identity = Identity {
            id: id.clone(),
            role,
            display_name: display_name.to_string(),
            endpoint: endpoint.to_string(),
            auth_token: auth_token.clone(),
            version: version.to_string(),
            capabilities: game_types.to_vec(),
            max_concurrent_matches,
            active_matches: 0,
        };
        self.tokens.insert(auth_token, id.clone());
        self.keys.insert(key, id.clone());
        self.agents.insert(id.clone(), identity.clone());
        info!(%id, %role, display_name, endpoint, "agent registered");
        Registration::Accepted {
            identity,
            renewed: false,
        }
    }

    /// Id of the agent owning `token`.
    pub fn validate_auth_token(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    /// Identity behind an envelope's token: missing is `E011`, unknown is `E012`.
    pub fn authenticate(&self, token: Option<&str>) -> Result<&Identity, LeagueError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(LeagueError::protocol(
                    ErrorCode::AuthTokenMissing,
                    "auth_token is required",
                ))
            }
        };
        self.validate_auth_token(token)
            .and_then(|id| self.agents.get(id))
            .ok_or_else(|| LeagueError::protocol(ErrorCode::AuthTokenInvalid, "unknown auth_token"))
    }

    /// Like [`Registry::authenticate`], and the agent must be a referee (`E013`).
    pub fn authenticate_referee(&self, token: Option<&str>) -> Result<&Identity, LeagueError> {
        let identity = self.authenticate(token)?;
        if identity.role != AgentRole::Referee {
            return Err(LeagueError::protocol(
                ErrorCode::RefereeNotRegistered,
                format!("{} is not a registered referee", identity.id),
            ));
        }
        Ok(identity)
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.agents.get(id)
    }

    pub fn player(&self, id: &str) -> Option<&Identity> {
        self.get(id).filter(|i| i.role == AgentRole::Player)
    }

    /// Players in registration order.
    pub fn players(&self) -> Vec<&Identity> {
        self.player_order
            .iter()
            .filter_map(|id| self.agents.get(id))
            .collect()
    }

    /// Referees in registration order.
    pub fn referees(&self) -> Vec<&Identity> {
        self.referee_order
            .iter()
            .filter_map(|id| self.agents.get(id))
            .collect()
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.player_order.clone()
    }

    /// Takes one match slot on the first referee with spare capacity.
    pub fn reserve_referee(&mut self) -> Option<Identity> {
        let id = self
            .referee_order
            .iter()
            .find(|id| self.agents.get(*id).is_some_and(Identity::has_capacity))?
            .clone();
        let referee = self.agents.get_mut(&id)?;
        referee.active_matches += 1;
        Some(referee.clone())
    }

    /// Gives back a slot taken by [`Registry::reserve_referee`].
    pub fn release_referee(&mut self, id: &str) {
        if let Some(referee) = self.agents.get_mut(id) {
            referee.active_matches = referee.active_matches.saturating_sub(1);
        }
    }
}

fn rejected(reason: impl Into<String>) -> Registration {
    Registration::Rejected {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, port: u16) -> PlayerMeta {
        PlayerMeta {
            display_name: name.into(),
            version: "1.0.0".into(),
            game_types: vec!["even_odd".into()],
            contact_endpoint: format!("http://localhost:{port}/mcp"),
        }
    }

    fn referee(name: &str, capacity: u32) -> RefereeMeta {
        RefereeMeta {
            display_name: name.into(),
            version: "1.0.0".into(),
            game_types: vec!["even_odd".into()],
            contact_endpoint: "http://localhost:8001/mcp".into(),
            max_concurrent_matches: capacity,
        }
    }

    fn accepted(registration: Registration) -> (Identity, bool) {
        match registration {
            Registration::Accepted { identity, renewed } => (identity, renewed),
            Registration::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn ids_are_sequential_per_role() {
        let mut registry = Registry::new(GameType::EvenOdd);
        let (p1, _) = accepted(registry.register_player(&player("alice", 8101)));
        let (r1, _) = accepted(registry.register_referee(&referee("ref", 2)));
        let (p2, _) = accepted(registry.register_player(&player("bob", 8102)));
        assert_eq!((p1.id.as_str(), p2.id.as_str()), ("P01", "P02"));
        assert_eq!(r1.id, "REF01");
        assert_eq!(registry.player_ids(), vec!["P01", "P02"]);
    }

    #[test]
    fn tokens_are_unique_and_validated() {
        let mut registry = Registry::new(GameType::EvenOdd);
        let (p1, _) = accepted(registry.register_player(&player("alice", 8101)));
        let (p2, _) = accepted(registry.register_player(&player("bob", 8102)));
        assert_ne!(p1.auth_token, p2.auth_token);
        assert!(p1.auth_token.starts_with("tok-"));
        assert_eq!(p1.auth_token.len(), 4 + 32);
        assert_eq!(registry.validate_auth_token(&p1.auth_token), Some("P01"));
        assert_eq!(registry.validate_auth_token("tok-nope"), None);
    }

    #[test]
    fn repeated_registration_returns_the_same_identity() {
        let mut registry = Registry::new(GameType::EvenOdd);
        let (first, renewed) = accepted(registry.register_player(&player("alice", 8101)));
        assert!(!renewed);
        let (again, renewed) = accepted(registry.register_player(&player("alice", 8101)));
        assert!(renewed);
        assert_eq!(again.id, first.id);
        assert_eq!(again.auth_token, first.auth_token);

        let (other, _) = accepted(registry.register_player(&player("alice", 8102)));
        assert_eq!(other.id, "P02");
    }

    #[test]
    fn empty_fields_and_foreign_games_are_rejected() {
        let mut registry = Registry::new(GameType::EvenOdd);
        assert!(matches!(
            registry.register_player(&player("  ", 8101)),
            Registration::Rejected { .. }
        ));
        let mut meta = player("alice", 8101);
        meta.contact_endpoint.clear();
        assert!(matches!(
            registry.register_player(&meta),
            Registration::Rejected { .. }
        ));
        let mut meta = player("alice", 8101);
        meta.game_types = vec!["tic_tac_toe".into()];
        assert!(matches!(
            registry.register_player(&meta),
            Registration::Rejected { .. }
        ));
        assert!(registry.players().is_empty());
    }

    #[test]
    fn authentication_error_codes() {
        let mut registry = Registry::new(GameType::EvenOdd);
        let (p1, _) = accepted(registry.register_player(&player("alice", 8101)));
        let (r1, _) = accepted(registry.register_referee(&referee("ref", 2)));

        let code = |r: Result<&Identity, LeagueError>| r.unwrap_err().error_code();
        assert_eq!(code(registry.authenticate(None)), Some(ErrorCode::AuthTokenMissing));
        assert_eq!(code(registry.authenticate(Some(""))), Some(ErrorCode::AuthTokenMissing));
        assert_eq!(
            code(registry.authenticate(Some("tok-unknown"))),
            Some(ErrorCode::AuthTokenInvalid)
        );
        assert_eq!(
            code(registry.authenticate_referee(Some(&p1.auth_token))),
            Some(ErrorCode::RefereeNotRegistered)
        );
        assert_eq!(
            registry.authenticate_referee(Some(&r1.auth_token)).unwrap().id,
            "REF01"
        );
    }

    #[test]
    fn referee_slots_are_reserved_and_released() {
        let mut registry = Registry::new(GameType::EvenOdd);
        accepted(registry.register_referee(&referee("ref", 2)));
        assert!(registry.reserve_referee().is_some());
        assert!(registry.reserve_referee().is_some());
        assert!(registry.reserve_referee().is_none());
        registry.release_referee("REF01");
        assert_eq!(registry.reserve_referee().unwrap().active_matches, 2);
    }
}
