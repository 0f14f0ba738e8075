//! League Manager process.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use ai_league::configuration::Configuration;
use ai_league::league_manager::LeagueManager;
use ai_league::logger::init_logger;
use ai_league::server::{bind, serve};

#[derive(Parser, Debug)]
#[command(name = "league-manager", version, about = "Registers agents, schedules and scores the league")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Overrides `LEAGUE_ID`.
    #[arg(long)]
    league_id: Option<String>,
    /// Overrides `LEAGUE_SEED`.
    #[arg(long)]
    seed: Option<u64>,
    /// Start the league once this many players and one referee have registered.
    #[arg(long, value_name = "PLAYERS")]
    auto_start: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Configuration::from_env();
    if let Some(league_id) = args.league_id {
        config = config.with_league_id(league_id);
    }
    if args.seed.is_some() {
        config = config.with_seed(args.seed);
    }
    init_logger("league_manager", &config)?;

    let manager = Arc::new(LeagueManager::new(config));
    let listener = bind(&args.host, args.port).await?;
    info!(league_id = manager.league_id(), host = %args.host, port = args.port, "league manager up");

    if let Some(players) = args.auto_start {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                if manager.player_count() >= players && manager.referee_count() > 0 {
                    info!(players = manager.player_count(), "enough agents registered, starting");
                    manager.spawn_league();
                    break;
                }
            }
        });
    }

    serve(listener, manager.router()).await
}
