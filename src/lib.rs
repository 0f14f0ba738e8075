//! # Ai League
//!
//! A Rust crate for running leagues of autonomous agents that only talk to each other through
//! JSON-RPC 2.0 over HTTP.
//!
//! Three roles take part in a league:
//! - the [`LeagueManager`](crate::league_manager::LeagueManager) registers agents, builds the
//!   round-robin schedule and keeps the standings;
//! - a [`Referee`](crate::referee::Referee) plays the matches it is assigned and reports them;
//! - a [`Player`](crate::player::Player) answers invitations and decision requests with its
//!   [`Strategy`](crate::player::Strategy).
//!
//! Each role is an `axum` router serving `POST /mcp` plus a few diagnostic `GET` routes. The
//! three binaries of this crate (`league-manager`, `referee`, `player`) are thin front ends over
//! these routers.
//!
//! # Documentation Overview
//!
//! - The wire format (envelope, message kinds, JSON-RPC framing) lives in [`protocol`].
//! - Retry and backoff of outgoing calls are described in [`transport`].
//! - The game a referee adjudicates is a [`GameRules`](crate::game_interface::GameRules)
//!   implementation; Even/Odd is the one provided.
//! - Defaults, environment variables and timeouts are in
//!   [`Configuration`](crate::configuration::Configuration).
//!
//! # Usage Example
//!
//! Serving a League Manager and running the league once agents have registered:
//!
//! ```no_run
//! use std::sync::Arc;
//! use ai_league::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env().with_seed(Some(42));
//!     let manager = Arc::new(LeagueManager::new(config));
//!
//!     let listener = ai_league::server::bind("127.0.0.1", 8000).await?;
//!     let router = manager.router();
//!     tokio::spawn(ai_league::server::serve(listener, router));
//!
//!     // ... players and referees register through POST /mcp ...
//!     let standings = manager.run_league().await?;
//!     for row in standings {
//!         println!("{}. {} {} pts", row.rank, row.player_id, row.points);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use anyhow;

pub mod agent;
pub mod configuration;
pub mod error;
pub mod game_interface;
pub mod league_manager;
pub mod logger;
pub mod player;
pub mod protocol;
pub mod referee;
pub mod server;
pub mod storage;
pub mod tournament_scheduler;
pub mod transport;

/// Locks `mutex`, carrying on with the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use ai_league::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::{Configuration, Timeouts};
    pub use crate::error::{ErrorCode, LeagueError};
    pub use crate::game_interface::{EvenOdd, GameRules, Parity};
    pub use crate::league_manager::LeagueManager;
    pub use crate::player::{Player, PlayerSettings, Strategy, StrategyKind};
    pub use crate::referee::{Referee, RefereeSettings};
    pub use crate::transport::{McpClient, RetryPolicy};
}
