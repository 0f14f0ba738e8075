mod common;

use std::time::Duration;

use ai_league::game_interface::{match_rng, EvenOdd, GameRules, GameStatus, Outcome, Parity};
use ai_league::league_manager::StandingsTable;
use ai_league::player::{Player, PlayerSettings, StrategyKind};
use ai_league::protocol::messages::MatchStatus;
use ai_league::tournament_scheduler::create_round_robin_schedule;

use common::*;

fn strategy_of(index: usize) -> (StrategyKind, Parity) {
    if index % 2 == 0 {
        (StrategyKind::AlwaysEven, Parity::Even)
    } else {
        (StrategyKind::AlwaysOdd, Parity::Odd)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn four_players_play_a_full_seeded_league() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (manager, league_endpoint) = start_manager(config.clone()).await;

    let mut players = Vec::new();
    let mut choices = Vec::new();
    for i in 0..4 {
        let (kind, parity) = strategy_of(i);
        let name = format!("player{}", i + 1);
        let player = start_player(config.clone(), &league_endpoint, &name, kind).await;
        choices.push(parity);
        players.push((player, name));
    }
    start_referee(config.clone(), &league_endpoint).await;

    let ids: Vec<String> = players
        .iter()
        .map(|(p, _)| p.credentials().unwrap().player_id)
        .collect();
    assert_eq!(ids, ["P01", "P02", "P03", "P04"]);

    let standings = manager.clone().run_league().await.unwrap();

    // Replay the league offline with the same seed.
    let mut expected = StandingsTable::new();
    for (id, (_, name)) in ids.iter().zip(&players) {
        expected.add_player(id, name);
    }
    let schedule = create_round_robin_schedule(&ids);
    assert_eq!(schedule.len(), 6);
    let rules = EvenOdd::default();
    for m in &schedule {
        let a = choices[ids.iter().position(|id| *id == m.player_a_id).unwrap()];
        let b = choices[ids.iter().position(|id| *id == m.player_b_id).unwrap()];
        let resolution = rules.resolve(&a, &b, &mut match_rng(Some(SEED), &m.match_id));
        let (status, winner) = match resolution.outcome {
            Outcome::PlayerA => (GameStatus::Win, Some(m.player_a_id.as_str())),
            Outcome::PlayerB => (GameStatus::Win, Some(m.player_b_id.as_str())),
            Outcome::Draw => (GameStatus::Draw, None),
        };
        expected
            .apply(&m.player_a_id, &m.player_b_id, status, winner)
            .unwrap();
    }
    assert_eq!(standings, expected.ranked());
    assert_eq!(manager.ranked_standings(), standings);

    for row in &standings {
        assert_eq!(row.played, 3);
        assert_eq!(row.played, row.wins + row.draws + row.losses);
    }
    for pair in standings.windows(2) {
        assert!(
            (pair[0].points, pair[0].wins, pair[0].draws)
                >= (pair[1].points, pair[1].wins, pair[1].draws)
        );
    }
    assert!(manager
        .schedule()
        .iter()
        .all(|m| m.status == MatchStatus::Completed));

    let saved = manager
        .store()
        .load_standings("test_league")
        .unwrap()
        .unwrap();
    assert_eq!(saved.standings, standings);
    assert_eq!(saved.rounds_completed, 3);
    let record = manager
        .store()
        .load_match("test_league", "R1M1")
        .unwrap()
        .unwrap();
    assert_eq!(record.status, MatchStatus::Completed);
    assert!(record.result.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_player_loses_by_forfeit() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (manager, league_endpoint) = start_manager(config.clone()).await;

    let active = start_player(config.clone(), &league_endpoint, "awake", StrategyKind::AlwaysEven).await;
    let (_silent_listener, silent_endpoint) = silent_endpoint().await;
    let silent = Player::new(
        PlayerSettings {
            display_name: "asleep".into(),
            contact_endpoint: silent_endpoint,
            league_endpoint: league_endpoint.clone(),
        },
        config.clone(),
        StrategyKind::AlwaysOdd.build(),
    );
    let silent_id = silent.register().await.unwrap().player_id;
    start_referee(config.clone(), &league_endpoint).await;

    let standings = manager.clone().run_league().await.unwrap();
    assert_eq!(standings.len(), 2);
    let winner = &standings[0];
    let loser = &standings[1];
    assert_eq!(winner.player_id, active.credentials().unwrap().player_id);
    assert_eq!((winner.wins, winner.points), (1, 3));
    assert_eq!(loser.player_id, silent_id);
    assert_eq!((loser.losses, loser.points), (1, 0));

    let record = manager
        .store()
        .load_match("test_league", "R1M1")
        .unwrap()
        .unwrap();
    let result = record.result.unwrap();
    assert_eq!(result.status, GameStatus::TechnicalLoss);
    assert_eq!(result.score[&silent_id], 0);
    assert_eq!(result.winner.as_deref(), Some(winner.player_id.as_str()));
}

/// Plays the single match of a two-player league and returns the stored result.
async fn play_one_match(
    manager: &std::sync::Arc<ai_league::league_manager::LeagueManager>,
) -> ai_league::protocol::messages::MatchResult {
    manager.clone().run_league().await.unwrap();
    manager
        .store()
        .load_match("test_league", "R1M1")
        .unwrap()
        .unwrap()
        .result
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn illegal_parity_choice_is_a_technical_loss() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (manager, league_endpoint) = start_manager(config.clone()).await;

    let fair = start_player(config.clone(), &league_endpoint, "fair", StrategyKind::AlwaysOdd).await;
    let cheat = start_scripted_player(config.clone(), &league_endpoint, "cheat", Answer::Illegal).await;
    let fair_id = fair.credentials().unwrap().player_id;
    let cheat_id = cheat.credentials().unwrap().player_id;
    start_referee(config.clone(), &league_endpoint).await;

    let result = play_one_match(&manager).await;
    assert_eq!(result.status, GameStatus::TechnicalLoss);
    assert_eq!(result.winner.as_deref(), Some(fair_id.as_str()));
    assert_eq!((result.score[&fair_id], result.score[&cheat_id]), (3, 0));
    assert!(result.reason.contains("E004"), "{}", result.reason);
    assert_eq!(result.choices.get(&fair_id).map(String::as_str), Some("odd"));
    assert!(!result.choices.contains_key(&cheat_id));

    let standings = manager.ranked_standings();
    assert_eq!(standings[0].player_id, fair_id);
    assert_eq!((standings[0].wins, standings[0].points), (1, 3));
    assert_eq!(standings[1].player_id, cheat_id);
    assert_eq!((standings[1].losses, standings[1].points), (1, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_decision_is_a_technical_loss() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (manager, league_endpoint) = start_manager(config.clone()).await;

    let slow = start_scripted_player(
        config.clone(),
        &league_endpoint,
        "slow",
        Answer::Late(Duration::from_millis(1500)),
    )
    .await;
    let quick = start_player(config.clone(), &league_endpoint, "quick", StrategyKind::AlwaysEven).await;
    let slow_id = slow.credentials().unwrap().player_id;
    let quick_id = quick.credentials().unwrap().player_id;
    start_referee(config.clone(), &league_endpoint).await;

    let result = play_one_match(&manager).await;
    assert_eq!(result.status, GameStatus::TechnicalLoss);
    assert_eq!(result.winner.as_deref(), Some(quick_id.as_str()));
    assert_eq!((result.score[&quick_id], result.score[&slow_id]), (3, 0));
    assert!(result.reason.contains("E001"), "{}", result.reason);

    let standings = manager.ranked_standings();
    assert_eq!(standings[0].player_id, quick_id);
    assert_eq!(standings[0].points, 3);
    assert_eq!((standings[1].losses, standings[1].points), (1, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn both_sides_failing_is_a_double_technical_loss() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (manager, league_endpoint) = start_manager(config.clone()).await;

    let cheat = start_scripted_player(config.clone(), &league_endpoint, "cheat", Answer::Illegal).await;
    let slow = start_scripted_player(
        config.clone(),
        &league_endpoint,
        "slow",
        Answer::Late(Duration::from_millis(1500)),
    )
    .await;
    let cheat_id = cheat.credentials().unwrap().player_id;
    let slow_id = slow.credentials().unwrap().player_id;
    start_referee(config.clone(), &league_endpoint).await;

    let result = play_one_match(&manager).await;
    assert_eq!(result.status, GameStatus::DoubleTechnicalLoss);
    assert_eq!(result.winner, None);
    assert_eq!((result.score[&cheat_id], result.score[&slow_id]), (0, 0));
    assert!(result.reason.contains("E004") && result.reason.contains("E001"), "{}", result.reason);

    let standings = manager.ranked_standings();
    assert_eq!(standings.len(), 2);
    for row in &standings {
        assert_eq!((row.played, row.losses, row.points), (1, 1, 0));
    }
}
