//! Drives a league from schedule to champion.
//!
//! For every round: announce it to the players, hand each pending match to a referee with a free
//! slot, wait until the round's results are in, then broadcast the round completion and the
//! standings. A match whose assignment fails stays pending and does not block the round.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{info, instrument, warn};

use super::LeagueManager;
use crate::agent::Identity;
use crate::lock;
use crate::logger::Direction;
use crate::protocol::messages::{
    Acknowledgement, LeagueCompleted, MatchAssignment, MatchStatus, RoundAnnouncement,
    RoundCompleted, StandingRow, StandingsUpdate,
};
use crate::protocol::{new_conversation_id, Envelope, Message, MessageType, LEAGUE_MANAGER_SENDER};
use crate::tournament_scheduler::Match;

impl LeagueManager {
    /// Plays every round of the schedule, creating it first if needed, and returns the final
    /// ranking.
    pub async fn run_league(self: Arc<Self>) -> anyhow::Result<Vec<StandingRow>> {
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("league {} is already running", self.league_id());
        }
        let result = self.clone().conduct().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    #[instrument(skip_all, fields(league_id = %self.config.league_id))]
    async fn conduct(self: Arc<Self>) -> anyhow::Result<Vec<StandingRow>> {
        if lock(&self.table).schedule.is_empty() {
            self.create_schedule().context("could not create the schedule")?;
        }
        let total_rounds = lock(&self.table).schedule.total_rounds();
        if total_rounds == 0 {
            bail!("at least two players are needed, {} registered", self.player_count());
        }
        if self.referee_count() == 0 {
            bail!("no referee registered");
        }

        self.events.info(
            "LEAGUE_STARTED",
            json!({"rounds": total_rounds, "players": self.player_count()}),
        );
        let mut progress = self.progress.subscribe();

        for round_id in 1..=total_rounds {
            let pending: Vec<Match> = {
                let mut table = lock(&self.table);
                table.current_round = round_id;
                table
                    .schedule
                    .round(round_id)
                    .into_iter()
                    .filter(|m| m.status == MatchStatus::Pending)
                    .cloned()
                    .collect()
            };
            info!(round_id, matches = pending.len(), "round starting");
            self.announce_round(round_id).await;

            for m in &pending {
                self.assign(m, &mut progress).await;
            }
            let complete = self.wait_for_round(round_id, &mut progress).await;

            let (completed, document) = {
                let mut table = lock(&self.table);
                table.rounds_completed = round_id;
                let completed = table
                    .schedule
                    .round(round_id)
                    .iter()
                    .filter(|m| m.status == MatchStatus::Completed)
                    .count();
                (completed, self.standings_document(&table))
            };
            self.persist_standings(&document);
            self.events.info(
                "ROUND_COMPLETED",
                json!({"round_id": round_id, "matches_completed": completed, "all_reported": complete}),
            );
            if self.config.verbose {
                print_standings(round_id, &self.ranked_standings());
            }

            let next_round_id = (round_id < total_rounds).then_some(round_id + 1);
            self.broadcast(
                "round_completed",
                MessageType::RoundCompleted,
                Some(round_id),
                RoundCompleted {
                    matches_completed: completed,
                    next_round_id,
                },
            )
            .await;
            self.broadcast(
                "league_standings_update",
                MessageType::LeagueStandingsUpdate,
                Some(round_id),
                StandingsUpdate {
                    standings: self.ranked_standings(),
                },
            )
            .await;
        }

        let standings = self.ranked_standings();
        let total_matches = lock(&self.table).schedule.matches().len();
        self.broadcast(
            "league_completed",
            MessageType::LeagueCompleted,
            None,
            LeagueCompleted {
                total_rounds,
                total_matches,
                champion: standings.first().cloned(),
                standings: standings.clone(),
            },
        )
        .await;
        self.events.info(
            "LEAGUE_COMPLETED",
            json!({"champion": standings.first().map(|r| r.player_id.clone())}),
        );
        Ok(standings)
    }

    async fn announce_round(self: &Arc<Self>, round_id: u32) {
        let matches = {
            let table = lock(&self.table);
            table
                .schedule
                .round(round_id)
                .into_iter()
                .map(|m| m.announcement(self.game_type, None))
                .collect()
        };
        self.broadcast(
            "round_announcement",
            MessageType::RoundAnnouncement,
            Some(round_id),
            RoundAnnouncement { matches },
        )
        .await;
    }

    /// Hands `m` to a referee, waiting for a free slot if all are busy.
    #[instrument(skip_all, fields(match_id = %m.match_id))]
    async fn assign(&self, m: &Match, progress: &mut watch::Receiver<u64>) {
        let referee = loop {
            progress.borrow_and_update();
            if let Some(referee) = lock(&self.registry).reserve_referee() {
                break referee;
            }
            if timeout(self.config.timeouts.round, progress.changed())
                .await
                .is_err()
            {
                warn!("no referee freed up, match left pending");
                self.events.error(
                    "ASSIGNMENT_FAILED",
                    json!({"match_id": m.match_id, "reason": "no referee available"}),
                );
                return;
            }
        };

        let endpoints = {
            let registry = lock(&self.registry);
            registry
                .player(&m.player_a_id)
                .zip(registry.player(&m.player_b_id))
                .map(|(a, b)| (a.endpoint.clone(), b.endpoint.clone()))
        };
        let Some((player_a_endpoint, player_b_endpoint)) = endpoints else {
            lock(&self.registry).release_referee(&referee.id);
            self.events.error(
                "ASSIGNMENT_FAILED",
                json!({"match_id": m.match_id, "reason": "unknown player"}),
            );
            return;
        };

        lock(&self.table).schedule.set_in_progress(&m.match_id, &referee.id);
        let envelope = Envelope::new(
            MessageType::MatchAssignment,
            LEAGUE_MANAGER_SENDER,
            new_conversation_id(&m.match_id),
        )
        .with_auth_token(Some(referee.auth_token.clone()))
        .with_league_id(self.league_id())
        .with_round_id(m.round_id)
        .with_match_id(&m.match_id);
        let message = Message::new(
            envelope,
            MatchAssignment {
                game_type: self.game_type,
                player_a_id: m.player_a_id.clone(),
                player_b_id: m.player_b_id.clone(),
                player_a_endpoint,
                player_b_endpoint,
            },
        );

        self.events.message(
            Direction::Sent,
            MessageType::MatchAssignment,
            json!({"match_id": m.match_id, "referee_id": referee.id}),
        );
        let sent = self
            .client
            .send_no_retry::<_, Acknowledgement>(
                &referee.endpoint,
                "assign_match",
                &message,
                self.config.timeouts.assignment,
            )
            .await;
        match sent {
            Ok(_) => info!(referee_id = %referee.id, "match assigned"),
            Err(e) => {
                lock(&self.registry).release_referee(&referee.id);
                lock(&self.table).schedule.set_pending(&m.match_id);
                self.events.error(
                    "ASSIGNMENT_FAILED",
                    json!({
                        "match_id": m.match_id,
                        "referee_id": referee.id,
                        "conversation_id": message.envelope.conversation_id,
                        "error_code": e.error_code(),
                        "error": e.to_string(),
                    }),
                );
            }
        }
    }

    /// True when every match of the round was reported. Returns early when nothing is left in
    /// flight or the round timeout expires.
    async fn wait_for_round(&self, round_id: u32, progress: &mut watch::Receiver<u64>) -> bool {
        let deadline = Instant::now() + self.config.timeouts.round;
        loop {
            progress.borrow_and_update();
            let (complete, in_flight) = {
                let table = lock(&self.table);
                let round = table.schedule.round(round_id);
                (
                    round.iter().all(|m| m.status == MatchStatus::Completed),
                    round.iter().any(|m| m.status == MatchStatus::InProgress),
                )
            };
            if complete || !in_flight {
                return complete;
            }
            if timeout_at(deadline, progress.changed()).await.is_err() {
                warn!(round_id, "round timed out");
                return false;
            }
        }
    }

    /// Sends one notification to every player concurrently, failures are only logged.
    async fn broadcast<P>(
        self: &Arc<Self>,
        method: &'static str,
        message_type: MessageType,
        round_id: Option<u32>,
        payload: P,
    ) where
        P: Serialize + Clone + Send + Sync + 'static,
    {
        let players: Vec<Identity> = lock(&self.registry)
            .players()
            .into_iter()
            .cloned()
            .collect();
        let mut tasks = JoinSet::new();
        for player in players {
            let manager = self.clone();
            let payload = payload.clone();
            tasks.spawn(async move {
                let mut envelope = Envelope::new(
                    message_type,
                    LEAGUE_MANAGER_SENDER,
                    new_conversation_id(&player.id),
                )
                .with_league_id(manager.league_id());
                if let Some(round_id) = round_id {
                    envelope = envelope.with_round_id(round_id);
                }
                let message = Message::new(envelope, payload);
                manager.events.message(
                    Direction::Sent,
                    message_type,
                    json!({"to": player.id, "method": method}),
                );
                let sent = manager
                    .client
                    .send_no_retry::<P, Acknowledgement>(
                        &player.endpoint,
                        method,
                        &message,
                        manager.config.timeouts.notification,
                    )
                    .await;
                if let Err(e) = sent {
                    manager.events.warning(
                        "NOTIFICATION_FAILED",
                        json!({
                            "to": player.id,
                            "method": method,
                            "error_code": e.error_code(),
                            "error": e.to_string(),
                        }),
                    );
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

fn print_standings(round_id: u32, standings: &[StandingRow]) {
    let table = standings
        .iter()
        .map(|r| format!("{}. {} {}pts", r.rank, r.player_id, r.points))
        .collect::<Vec<_>>()
        .join(", ");
    // green round, default standings
    println!("\x1b[32mRound {round_id}:\x1b[39m {table}");
}
