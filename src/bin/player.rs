//! Player process: answers invitations and decision requests with the chosen strategy.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ai_league::configuration::Configuration;
use ai_league::logger::init_logger;
use ai_league::player::{Player, PlayerSettings, StrategyKind};
use ai_league::server::{bind, mcp_endpoint_url, serve};

#[derive(Parser, Debug)]
#[command(name = "player", version, about = "Plays Even/Odd in the league")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8101)]
    port: u16,
    #[arg(long, default_value = "http://127.0.0.1:8000/mcp")]
    league_endpoint: String,
    #[arg(long, default_value = "player")]
    display_name: String,
    #[arg(long, value_enum, default_value_t = StrategyKind::Random)]
    strategy: StrategyKind,
    /// Overrides `LEAGUE_SEED`.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Configuration::from_env();
    if args.seed.is_some() {
        config = config.with_seed(args.seed);
    }
    init_logger("player", &config)?;

    let listener = bind(&args.host, args.port).await?;
    let settings = PlayerSettings {
        display_name: args.display_name,
        contact_endpoint: mcp_endpoint_url(&listener, &args.host)?,
        league_endpoint: args.league_endpoint,
    };
    let player = Arc::new(Player::new(settings, config, args.strategy.build()));
    let server = tokio::spawn(serve(listener, player.router()));

    let credentials = player.register().await?;
    info!(player_id = %credentials.player_id, strategy = %args.strategy, "registered");

    server.await.context("server task failed")?
}
