//! One refereed match, from invitations to the reported result.
//!
//! Both players are invited concurrently, then asked for their decision concurrently. A side
//! that does not join, does not answer in time or answers something illegal forfeits with a
//! technical loss; when both sides fail the match is a double technical loss. Otherwise the
//! game's rule function adjudicates, with randomness drawn from the match's own generator.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::active_match::ActiveMatch;
use super::Referee;
use crate::error::ErrorCode;
use crate::game_interface::{
    match_rng, GameDetails, GameRules, GameStatus, Outcome, Resolution, LOSS_POINTS, WIN_POINTS,
};
use crate::logger::Direction;
use crate::protocol::messages::{
    Acknowledgement, ChooseParityCall, ChooseParityResponse, DecisionContext, GameInvitation,
    GameJoinAck, GameOver, GameResult, MatchResult, MatchResultReport, MatchRole, PlayerStats,
};
use crate::protocol::{utc_timestamp_after, Envelope, Message, MessageType};
use crate::transport::TransportError;

/// A match handed over by the League Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedMatch {
    pub match_id: String,
    pub round_id: u32,
    pub league_id: Option<String>,
    pub conversation_id: String,
    pub player_a_id: String,
    pub player_b_id: String,
    pub player_a_endpoint: String,
    pub player_b_endpoint: String,
}

/// Final word on a match, before it is shaped for players or the League Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: GameStatus,
    pub winner: Option<String>,
    pub score: BTreeMap<String, u32>,
    pub choices: BTreeMap<String, String>,
    pub details: Option<GameDetails>,
    pub reason: String,
}

impl Verdict {
    fn decided(
        assigned: &AssignedMatch,
        resolution: Resolution,
        choices: BTreeMap<String, String>,
    ) -> Self {
        let (points_a, points_b) = resolution.outcome.points();
        let (status, winner) = match resolution.outcome {
            Outcome::PlayerA => (GameStatus::Win, Some(assigned.player_a_id.clone())),
            Outcome::PlayerB => (GameStatus::Win, Some(assigned.player_b_id.clone())),
            Outcome::Draw => (GameStatus::Draw, None),
        };
        Verdict {
            status,
            winner,
            score: BTreeMap::from([
                (assigned.player_a_id.clone(), points_a),
                (assigned.player_b_id.clone(), points_b),
            ]),
            choices,
            details: Some(resolution.details),
            reason: resolution.reason,
        }
    }

    pub fn technical_loss(winner: &str, loser: &str, reason: impl Into<String>) -> Self {
        Verdict {
            status: GameStatus::TechnicalLoss,
            winner: Some(winner.to_string()),
            score: BTreeMap::from([
                (winner.to_string(), WIN_POINTS),
                (loser.to_string(), LOSS_POINTS),
            ]),
            choices: BTreeMap::new(),
            details: None,
            reason: reason.into(),
        }
    }

    pub fn double_technical_loss(a: &str, b: &str, reason: impl Into<String>) -> Self {
        Verdict {
            status: GameStatus::DoubleTechnicalLoss,
            winner: None,
            score: BTreeMap::from([(a.to_string(), LOSS_POINTS), (b.to_string(), LOSS_POINTS)]),
            choices: BTreeMap::new(),
            details: None,
            reason: reason.into(),
        }
    }

    fn with_choices(mut self, choices: BTreeMap<String, String>) -> Self {
        self.choices = choices;
        self
    }

    pub fn drawn_number(&self) -> Option<u8> {
        match self.details {
            Some(GameDetails::EvenOdd { drawn_number, .. }) => Some(drawn_number),
            None => None,
        }
    }

    pub fn game_result(&self) -> GameResult {
        GameResult {
            status: self.status,
            winner_player_id: self.winner.clone(),
            choices: self.choices.clone(),
            details: self.details.clone(),
            reason: self.reason.clone(),
        }
    }

    pub fn match_result(&self) -> MatchResult {
        MatchResult {
            status: self.status,
            winner: self.winner.clone(),
            score: self.score.clone(),
            choices: self.choices.clone(),
            details: self.details.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// Verdict of a match whose task died: the side that got further wins.
pub fn fault_verdict(active: &ActiveMatch) -> Verdict {
    let reason = "match interrupted by an internal fault";
    let (a, b) = active.progress();
    if a > b {
        Verdict::technical_loss(&active.player_a_id, &active.player_b_id, reason)
    } else if b > a {
        Verdict::technical_loss(&active.player_b_id, &active.player_a_id, reason)
    } else {
        Verdict::double_technical_loss(&active.player_a_id, &active.player_b_id, reason)
    }
}

/// One side of the match, seen from the referee.
struct Side<'a> {
    id: &'a str,
    endpoint: &'a str,
    role: MatchRole,
    opponent: &'a str,
}

impl AssignedMatch {
    fn sides(&self) -> (Side<'_>, Side<'_>) {
        (
            Side {
                id: &self.player_a_id,
                endpoint: &self.player_a_endpoint,
                role: MatchRole::PlayerA,
                opponent: &self.player_b_id,
            },
            Side {
                id: &self.player_b_id,
                endpoint: &self.player_b_endpoint,
                role: MatchRole::PlayerB,
                opponent: &self.player_a_id,
            },
        )
    }
}

fn describe(err: &TransportError) -> String {
    match err.error_code() {
        Some(code) => format!("{code}: {err}"),
        None => err.to_string(),
    }
}

/// Plays `assigned` to the end and tells both players. Reporting is left to the caller.
#[instrument(skip_all, fields(match_id = %assigned.match_id))]
pub async fn run_match<R: GameRules>(referee: &Arc<Referee<R>>, assigned: AssignedMatch) -> Verdict {
    let verdict = play(referee, &assigned).await;
    referee.active.update(&assigned.match_id, |m| {
        m.finish(verdict.winner.as_deref(), verdict.drawn_number());
        if matches!(
            verdict.status,
            GameStatus::TechnicalLoss | GameStatus::DoubleTechnicalLoss
        ) {
            m.fail();
        }
    });
    info!(status = ?verdict.status, winner = ?verdict.winner, "match decided");
    referee.events.info(
        "MATCH_COMPLETED",
        json!({
            "match_id": assigned.match_id,
            "status": verdict.status,
            "winner": verdict.winner,
            "choices": verdict.choices,
            "drawn_number": verdict.drawn_number(),
        }),
    );
    notify_players(referee, &assigned, &verdict);
    verdict
}

async fn play<R: GameRules>(referee: &Referee<R>, assigned: &AssignedMatch) -> Verdict {
    let (a, b) = assigned.sides();

    let (joined_a, joined_b) = tokio::join!(
        invite(referee, assigned, &a),
        invite(referee, assigned, &b)
    );
    for (side, joined) in [(&a, &joined_a), (&b, &joined_b)] {
        if joined.is_ok() {
            referee.active.update(&assigned.match_id, |m| m.mark_joined(side.id));
        }
    }
    if let Err(verdict) = settle(assigned, joined_a, joined_b, "did not join") {
        return verdict;
    }

    let (stats_a, stats_b) = tokio::join!(referee.player_stats(a.id), referee.player_stats(b.id));
    let (decision_a, decision_b) = tokio::join!(
        request_decision(referee, assigned, &a, stats_a),
        request_decision(referee, assigned, &b, stats_b)
    );

    let mut choices = BTreeMap::new();
    if let Ok(d) = &decision_a {
        choices.insert(a.id.to_string(), d.to_string());
    }
    if let Ok(d) = &decision_b {
        choices.insert(b.id.to_string(), d.to_string());
    }
    let (decision_a, decision_b) =
        match settle(assigned, decision_a, decision_b, "gave no valid decision") {
            Ok(decisions) => decisions,
            Err(verdict) => return verdict.with_choices(choices),
        };

    let mut rng = match_rng(referee.config.seed(), &assigned.match_id);
    let resolution = referee.rules.resolve(&decision_a, &decision_b, &mut rng);
    Verdict::decided(assigned, resolution, choices)
}

/// Both values when both sides went through, the forfeit verdict otherwise.
fn settle<T, U>(
    assigned: &AssignedMatch,
    a: Result<T, String>,
    b: Result<U, String>,
    what: &str,
) -> Result<(T, U), Verdict> {
    let (id_a, id_b) = (&assigned.player_a_id, &assigned.player_b_id);
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) => Err(Verdict::technical_loss(
            id_b,
            id_a,
            format!("{id_a} {what} ({e})"),
        )),
        (Ok(_), Err(e)) => Err(Verdict::technical_loss(
            id_a,
            id_b,
            format!("{id_b} {what} ({e})"),
        )),
        (Err(ea), Err(eb)) => Err(Verdict::double_technical_loss(
            id_a,
            id_b,
            format!("{id_a} {what} ({ea}); {id_b} {what} ({eb})"),
        )),
    }
}

async fn invite<R: GameRules>(
    referee: &Referee<R>,
    assigned: &AssignedMatch,
    side: &Side<'_>,
) -> Result<(), String> {
    let message = Message::new(
        referee.envelope(MessageType::GameInvitation, assigned),
        GameInvitation {
            game_type: referee.rules.game_type(),
            role_in_match: side.role,
            opponent_id: side.opponent.to_string(),
        },
    );
    referee.events.message(
        Direction::Sent,
        MessageType::GameInvitation,
        json!({"to": side.id, "match_id": assigned.match_id}),
    );
    let ack: Message<GameJoinAck> = referee
        .client
        .send(
            side.endpoint,
            "handle_game_invitation",
            &message,
            referee.config.timeouts().invitation,
        )
        .await
        .map_err(|e| describe(&e))?;
    if !ack.payload.accept {
        return Err("declined the invitation".into());
    }
    if ack.envelope.match_id.as_deref() != Some(assigned.match_id.as_str()) {
        return Err(format!(
            "join acknowledgement for {:?}",
            ack.envelope.match_id
        ));
    }
    debug!(player_id = side.id, "player joined");
    Ok(())
}

async fn request_decision<R: GameRules>(
    referee: &Referee<R>,
    assigned: &AssignedMatch,
    side: &Side<'_>,
    standings: PlayerStats,
) -> Result<R::Decision, String> {
    let timeout = referee.config.timeouts().decision;
    let message = Message::new(
        referee.envelope(MessageType::ChooseParityCall, assigned),
        ChooseParityCall {
            player_id: side.id.to_string(),
            game_type: referee.rules.game_type(),
            context: DecisionContext {
                opponent_id: side.opponent.to_string(),
                round_id: assigned.round_id,
                your_standings: standings,
            },
            deadline: utc_timestamp_after(timeout),
        },
    );
    referee.events.message(
        Direction::Sent,
        MessageType::ChooseParityCall,
        json!({"to": side.id, "match_id": assigned.match_id}),
    );
    let reply: Message<ChooseParityResponse> = referee
        .client
        .send(side.endpoint, "choose_parity", &message, timeout)
        .await
        .map_err(|e| describe(&e))?;

    let raw = reply.payload.parity_choice;
    referee
        .active
        .update(&assigned.match_id, |m| m.record_choice(side.id, &raw));
    referee.rules.parse_decision(&raw).ok_or_else(|| {
        format!(
            "{}: {raw:?} is not a legal choice",
            ErrorCode::InvalidParityChoice
        )
    })
}

/// Fire-and-forget `GAME_OVER` to both players.
fn notify_players<R: GameRules>(
    referee: &Arc<Referee<R>>,
    assigned: &AssignedMatch,
    verdict: &Verdict,
) {
    let (a, b) = assigned.sides();
    for side in [a, b] {
        let referee = referee.clone();
        let endpoint = side.endpoint.to_string();
        let player_id = side.id.to_string();
        let message = Message::new(
            referee.envelope(MessageType::GameOver, assigned),
            GameOver {
                game_type: referee.rules.game_type(),
                game_result: verdict.game_result(),
            },
        );
        tokio::spawn(async move {
            referee.events.message(
                Direction::Sent,
                MessageType::GameOver,
                json!({"to": player_id, "match_id": message.envelope.match_id}),
            );
            let sent = referee
                .client
                .send_no_retry::<_, Acknowledgement>(
                    &endpoint,
                    "notify_match_result",
                    &message,
                    referee.config.timeouts().notification,
                )
                .await;
            if let Err(e) = sent {
                warn!(player_id, error = %e, "GAME_OVER not delivered");
                referee.events.warning(
                    "NOTIFICATION_FAILED",
                    json!({"to": player_id, "error_code": e.error_code(), "error": e.to_string()}),
                );
            }
        });
    }
}

impl<R: GameRules> Referee<R> {
    /// Reports `verdict` to the League Manager, retrying on transient failures.
    pub(crate) async fn report(&self, assigned: &AssignedMatch, verdict: &Verdict) {
        let Some(credentials) = self.credentials() else {
            self.events.error(
                "REPORT_FAILED",
                json!({"match_id": assigned.match_id, "error": "referee is not registered"}),
            );
            return;
        };
        let envelope = self
            .envelope(MessageType::MatchResultReport, assigned)
            .with_auth_token(Some(credentials.auth_token));
        let message = Message::new(
            envelope,
            MatchResultReport {
                game_type: self.rules.game_type(),
                player_a_id: assigned.player_a_id.clone(),
                player_b_id: assigned.player_b_id.clone(),
                result: verdict.match_result(),
            },
        );
        self.events.message(
            Direction::Sent,
            MessageType::MatchResultReport,
            json!({"match_id": assigned.match_id, "status": verdict.status}),
        );
        let sent = self
            .client
            .send::<_, Acknowledgement>(
                &self.settings.league_endpoint,
                "report_match_result",
                &message,
                self.config.timeouts().report,
            )
            .await;
        match sent {
            Ok(ack) => self.events.info(
                "MATCH_REPORTED",
                json!({"match_id": assigned.match_id, "ack": ack.payload.status}),
            ),
            Err(e) => self.events.error(
                "REPORT_FAILED",
                json!({
                    "match_id": assigned.match_id,
                    "conversation_id": assigned.conversation_id,
                    "error_code": e.error_code(),
                    "error": e.to_string(),
                }),
            ),
        }
    }

    fn envelope(&self, message_type: MessageType, assigned: &AssignedMatch) -> Envelope {
        let envelope = Envelope::new(message_type, self.sender_name(), &assigned.conversation_id)
            .with_round_id(assigned.round_id)
            .with_match_id(&assigned.match_id);
        match &assigned.league_id {
            Some(league_id) => envelope.with_league_id(league_id),
            None => envelope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_interface::{Parity, DRAW_POINTS};

    fn assigned() -> AssignedMatch {
        AssignedMatch {
            match_id: "R1M1".into(),
            round_id: 1,
            league_id: Some("league".into()),
            conversation_id: "conv-R1M1".into(),
            player_a_id: "P01".into(),
            player_b_id: "P02".into(),
            player_a_endpoint: "http://a/mcp".into(),
            player_b_endpoint: "http://b/mcp".into(),
        }
    }

    #[test]
    fn single_forfeit_gives_the_opponent_a_win() {
        let ok = || Ok::<(), String>(());
        let err = || Err::<(), String>("E001".into());
        let verdict = settle(&assigned(), err(), ok(), "did not join").unwrap_err();
        assert_eq!(verdict.status, GameStatus::TechnicalLoss);
        assert_eq!(verdict.winner.as_deref(), Some("P02"));
        assert_eq!(verdict.score["P02"], WIN_POINTS);
        assert_eq!(verdict.score["P01"], LOSS_POINTS);
        assert!(verdict.reason.starts_with("P01 did not join"));

        let verdict = settle(&assigned(), err(), err(), "did not join").unwrap_err();
        assert_eq!(verdict.status, GameStatus::DoubleTechnicalLoss);
        assert_eq!(verdict.winner, None);
        assert!(verdict.score.values().all(|p| *p == 0));

        assert!(settle(&assigned(), ok(), ok(), "did not join").is_ok());
    }

    #[test]
    fn decided_verdicts_carry_points_and_details() {
        let resolution = Resolution {
            outcome: Outcome::Draw,
            reason: "both chose even".into(),
            details: GameDetails::EvenOdd {
                drawn_number: 4,
                number_parity: Parity::Even,
            },
        };
        let choices = BTreeMap::from([("P01".into(), "even".into()), ("P02".into(), "even".into())]);
        let verdict = Verdict::decided(&assigned(), resolution, choices);
        assert_eq!(verdict.status, GameStatus::Draw);
        assert_eq!(verdict.score["P01"], DRAW_POINTS);
        assert_eq!(verdict.drawn_number(), Some(4));
        let result = verdict.game_result();
        assert_eq!(result.winner_player_id, None);
        assert_eq!(result.choices["P02"], "even");
    }

    #[test]
    fn faults_favour_the_side_that_got_further() {
        let mut active = ActiveMatch::new("R1M1", 1, "P01", "P02", "conv");
        assert_eq!(fault_verdict(&active).status, GameStatus::DoubleTechnicalLoss);
        active.mark_joined("P01");
        active.mark_joined("P02");
        active.record_choice("P02", "odd");
        let verdict = fault_verdict(&active);
        assert_eq!(verdict.status, GameStatus::TechnicalLoss);
        assert_eq!(verdict.winner.as_deref(), Some("P02"));
    }
}
