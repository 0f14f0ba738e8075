//! Referee process: serves `assign_match` and registers with the League Manager.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ai_league::configuration::Configuration;
use ai_league::game_interface::EvenOdd;
use ai_league::logger::init_logger;
use ai_league::referee::{Referee, RefereeSettings};
use ai_league::server::{bind, mcp_endpoint_url, serve};

#[derive(Parser, Debug)]
#[command(name = "referee", version, about = "Plays the matches assigned by the League Manager")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8001)]
    port: u16,
    #[arg(long, default_value = "http://127.0.0.1:8000/mcp")]
    league_endpoint: String,
    #[arg(long, default_value = "referee")]
    display_name: String,
    #[arg(long, default_value_t = 2)]
    max_concurrent_matches: u32,
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
    init_logger("referee", &config)?;

    let listener = bind(&args.host, args.port).await?;
    let settings = RefereeSettings {
        display_name: args.display_name,
        contact_endpoint: mcp_endpoint_url(&listener, &args.host)?,
        league_endpoint: args.league_endpoint,
        max_concurrent_matches: args.max_concurrent_matches,
    };
    let referee = Arc::new(Referee::new(settings, config, EvenOdd::default()));
    let server = tokio::spawn(serve(listener, referee.router()));

    let credentials = referee.register().await?;
    info!(referee_id = %credentials.referee_id, "ready for assignments");

    server.await.context("server task failed")?
}
