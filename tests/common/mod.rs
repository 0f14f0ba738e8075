use std::sync::Arc;
use std::time::Duration;

use ai_league::configuration::{Configuration, Timeouts};
use ai_league::error::LeagueError;
use ai_league::game_interface::EvenOdd;
use ai_league::league_manager::LeagueManager;
use ai_league::logger::EventLog;
use ai_league::player::{Player, PlayerSettings, StrategyKind};
use ai_league::protocol::MessageType;
use ai_league::referee::{Referee, RefereeSettings};
use ai_league::server::{mcp_router, RpcService};
use ai_league::transport::RetryPolicy;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const SEED: u64 = 42;

/// Serves `router` on an ephemeral port and returns its `/mcp` URL.
pub async fn serve_router(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/mcp")
}

/// Accepts TCP connections but never answers.
pub async fn silent_endpoint() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("http://{addr}/mcp"))
}

pub fn config(root: &std::path::Path) -> Configuration {
    let ms = Duration::from_millis;
    Configuration::new()
        .with_league_id("test_league")
        .with_data_root(root.join("data"))
        .with_log_root(root.join("logs"))
        .with_verbose(false)
        .with_seed(Some(SEED))
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay: ms(20),
            multiplier: 2.0,
        })
        .with_timeouts(Timeouts {
            registration: ms(2000),
            invitation: ms(300),
            decision: ms(1000),
            notification: ms(300),
            report: ms(2000),
            query: ms(500),
            assignment: ms(1000),
            round: Duration::from_secs(20),
        })
}

pub async fn start_manager(config: Configuration) -> (Arc<LeagueManager>, String) {
    let manager = Arc::new(LeagueManager::new(config));
    let endpoint = serve_router(manager.router()).await;
    (manager, endpoint)
}

pub async fn start_referee(config: Configuration, league_endpoint: &str) -> Arc<Referee> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let referee = Arc::new(Referee::new(
        RefereeSettings {
            display_name: "ref".into(),
            contact_endpoint: format!("http://{addr}/mcp"),
            league_endpoint: league_endpoint.into(),
            max_concurrent_matches: 2,
        },
        config,
        EvenOdd::default(),
    ));
    let router = referee.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    referee.register().await.unwrap();
    referee
}

pub async fn start_player(
    config: Configuration,
    league_endpoint: &str,
    name: &str,
    strategy: StrategyKind,
) -> Arc<Player> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let player = Arc::new(Player::new(
        PlayerSettings {
            display_name: name.into(),
            contact_endpoint: format!("http://{addr}/mcp"),
            league_endpoint: league_endpoint.into(),
        },
        config,
        strategy.build(),
    ));
    let router = player.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    player.register().await.unwrap();
    player
}

/// How a [`ScriptedPlayer`] misbehaves on `choose_parity`.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    /// Replies `"maybe"`.
    Illegal,
    /// Replies after the delay.
    Late(Duration),
}

/// A real [`Player`] whose parity answers are tampered with.
pub struct ScriptedPlayer {
    inner: Arc<Player>,
    answer: Answer,
}

impl RpcService for ScriptedPlayer {
    fn component(&self) -> &str {
        RpcService::component(self.inner.as_ref())
    }

    fn sender(&self) -> String {
        RpcService::sender(self.inner.as_ref())
    }

    fn error_message_type(&self) -> MessageType {
        RpcService::error_message_type(self.inner.as_ref())
    }

    fn events(&self) -> &EventLog {
        RpcService::events(self.inner.as_ref())
    }

    async fn dispatch(self: Arc<Self>, method: String, params: Value) -> Result<Value, LeagueError> {
        if method != "choose_parity" {
            return self.inner.clone().dispatch(method, params).await;
        }
        match self.answer {
            Answer::Illegal => {
                let mut reply = self.inner.clone().dispatch(method, params).await?;
                reply["parity_choice"] = json!("maybe");
                Ok(reply)
            }
            Answer::Late(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.clone().dispatch(method, params).await
            }
        }
    }
}

pub async fn start_scripted_player(
    config: Configuration,
    league_endpoint: &str,
    name: &str,
    answer: Answer,
) -> Arc<Player> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let player = Arc::new(Player::new(
        PlayerSettings {
            display_name: name.into(),
            contact_endpoint: format!("http://{addr}/mcp"),
            league_endpoint: league_endpoint.into(),
        },
        config,
        StrategyKind::AlwaysEven.build(),
    ));
    let router = mcp_router(Arc::new(ScriptedPlayer {
        inner: player.clone(),
        answer,
    }));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    player.register().await.unwrap();
    player
}
