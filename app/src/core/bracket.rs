//! Pairing, advancement and completion rules of a single-elimination bracket.
//!
//! Everything here is synchronous and operates on a [`TournamentState`] the
//! caller has loaded while holding the tournament lock. Expected rejections
//! (full tournament, unknown game, ...) come back as
//! [`TournamentError::InvalidState`].

use chrono::{DateTime, TimeDelta, Utc};
use models::{
    domains::sea_orm_active_enums::TournamentStatus,
    schemas::tournament::{ActiveGame, TournamentState},
};
use rand::{Rng, seq::SliceRandom};
use std::time::Duration;

use crate::{
    config::TimeoutPolicy,
    error::{TournamentError, TournamentResult},
};

/// Result of pairing one round's participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPairing {
    pub games: Vec<(String, String)>,
    pub bye: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGame {
    pub game_id: String,
    pub player_1: String,
    pub player_2: Option<String>,
}

/// What `open_round` put in place; the caller persists and announces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPlan {
    pub round: u32,
    pub games: Vec<PlannedGame>,
    pub bye: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundProgress {
    /// Games of the current round are still awaiting results.
    InProgress,
    RoundEnded { round: u32, advancing: Vec<String> },
    Completed { winner: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutResolution {
    pub game_id: String,
    pub winner: String,
    pub loser: Option<String>,
}

pub fn add_player(state: &mut TournamentState, player_id: &str) -> TournamentResult<()> {
    if state.initialized {
        return Err(TournamentError::invalid("Tournament has already started"));
    }
    if state.is_full() {
        return Err(TournamentError::invalid("Tournament is full"));
    }
    if state.players.iter().any(|p| p == player_id) {
        return Err(TournamentError::invalid("Player already joined"));
    }
    state.players.push(player_id.to_owned());
    Ok(())
}

pub fn start(state: &mut TournamentState) -> TournamentResult<()> {
    if state.initialized {
        return Err(TournamentError::invalid("Tournament has already started"));
    }
    if state.players.len() < 2 {
        return Err(TournamentError::invalid(
            "At least 2 players are required to start",
        ));
    }
    state.initialized = true;
    state.status = TournamentStatus::Active;
    state.current_round = 0;
    state.next_round = state.players.clone();
    state.brackets.insert(0, state.players.clone());
    Ok(())
}

/// Whether a new round may be opened now.
///
/// A lone survivor is not a round: it is declared the winner and the
/// tournament is completed before `false` is returned.
pub fn can_start_next_round(state: &mut TournamentState, now: DateTime<Utc>) -> bool {
    if !state.initialized || state.is_complete || state.round_active() {
        return false;
    }
    match state.next_round.len() {
        0 => false,
        1 => {
            let winner = state.next_round[0].clone();
            complete(state, winner, now);
            false
        }
        _ => true,
    }
}

/// Shuffles `players` and pairs neighbours; an odd one out gets the bye.
pub fn pair_round<R: Rng + ?Sized>(players: &[String], rng: &mut R) -> RoundPairing {
    let mut shuffled = players.to_vec();
    shuffled.shuffle(rng);

    let bye = if shuffled.len() % 2 == 1 {
        shuffled.pop()
    } else {
        None
    };

    let games = shuffled
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();

    RoundPairing { games, bye }
}

/// Opens the next round from the current survivors.
///
/// Increments the round, pairs `next_round`, empties it so winners can
/// re-populate it, records the bracket and registers every pairing as an
/// active game. The bye (if any) is returned but not advanced.
pub fn open_round<R, F>(
    state: &mut TournamentState,
    rng: &mut R,
    now: DateTime<Utc>,
    mut new_game_id: F,
) -> TournamentResult<RoundPlan>
where
    R: Rng + ?Sized,
    F: FnMut() -> String,
{
    if !state.initialized || state.is_complete {
        return Err(TournamentError::invalid("Tournament is not in progress"));
    }
    if state.round_active() {
        return Err(TournamentError::invalid(
            "A round is already in progress",
        ));
    }
    if state.next_round.len() < 2 {
        return Err(TournamentError::invalid(
            "Not enough players to open a round",
        ));
    }

    let pairing = pair_round(&state.next_round, rng);

    state.current_round += 1;
    state.round_start_time = Some(now);
    state.next_round.clear();
    state.bye = pairing.bye.clone();

    let mut participants = Vec::with_capacity(pairing.games.len() * 2 + 1);
    let mut games = Vec::with_capacity(pairing.games.len());
    for (player_1, player_2) in pairing.games {
        let game_id = new_game_id();
        state.active_games.insert(
            game_id.clone(),
            ActiveGame {
                player_1: player_1.clone(),
                player_2: Some(player_2.clone()),
                created_at: now,
            },
        );
        participants.push(player_1.clone());
        participants.push(player_2.clone());
        games.push(PlannedGame {
            game_id,
            player_1,
            player_2: Some(player_2),
        });
    }
    participants.extend(pairing.bye.iter().cloned());

    state
        .brackets
        .insert(state.current_round, participants.clone());
    state.participants = participants;

    Ok(RoundPlan {
        round: state.current_round,
        games,
        bye: pairing.bye,
    })
}

/// Applies one result of the current round.
///
/// `game_id` is `None` only for a bye, which must carry `auto_advance`.
/// The winner enters `next_round` at most once; the loser leaves it.
pub fn register_result(
    state: &mut TournamentState,
    game_id: Option<&str>,
    winner: &str,
    loser: Option<&str>,
    auto_advance: bool,
    now: DateTime<Utc>,
) -> TournamentResult<RoundProgress> {
    if state.is_complete {
        return Err(TournamentError::invalid("Tournament is already complete"));
    }
    if !state.initialized {
        return Err(TournamentError::invalid("Tournament has not started"));
    }

    let loser = match game_id {
        None if !auto_advance => {
            return Err(TournamentError::invalid("A game id is required"));
        }
        None => {
            if state.bye.as_deref() != Some(winner) {
                return Err(TournamentError::invalid(format!(
                    "Player {winner} has no bye in round {}",
                    state.current_round
                )));
            }
            None
        }
        Some(game_id) => {
            let game = state.active_games.get(game_id).ok_or_else(|| {
                TournamentError::invalid(format!("Game {game_id} is not active"))
            })?;
            if !game.involves(winner) {
                return Err(TournamentError::invalid(format!(
                    "Player {winner} did not play game {game_id}"
                )));
            }
            let opponent = game.opponent_of(winner).map(str::to_owned);
            if let Some(loser) = loser {
                if opponent.as_deref() != Some(loser) {
                    return Err(TournamentError::invalid(format!(
                        "Player {loser} did not lose game {game_id}"
                    )));
                }
            }
            state.active_games.remove(game_id);
            opponent
        }
    };

    if !state.next_round.iter().any(|p| p == winner) {
        state.next_round.push(winner.to_owned());
    }
    if let Some(loser) = loser.as_deref() {
        state.next_round.retain(|p| p != loser);
    }

    Ok(evaluate_round(state, winner, now))
}

fn evaluate_round(state: &mut TournamentState, last_winner: &str, now: DateTime<Utc>) -> RoundProgress {
    if state.round_active() {
        return RoundProgress::InProgress;
    }
    if state.next_round.len() <= 1 {
        let winner = state
            .next_round
            .first()
            .cloned()
            .unwrap_or_else(|| last_winner.to_owned());
        complete(state, winner.clone(), now);
        return RoundProgress::Completed { winner };
    }
    RoundProgress::RoundEnded {
        round: state.current_round,
        advancing: state.next_round.clone(),
    }
}

/// Marks the tournament complete. A winner already recorded is never replaced.
pub fn complete(state: &mut TournamentState, winner: String, now: DateTime<Utc>) {
    if state.winner.is_none() {
        state.winner = Some(winner);
    }
    state.is_complete = true;
    state.status = TournamentStatus::Completed;
    state.completion_time.get_or_insert(now);
}

pub fn round_timed_out(state: &TournamentState, now: DateTime<Utc>, timeout: Duration) -> bool {
    let Some(started) = state.round_start_time else {
        return false;
    };
    let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
    state.round_active() && now - started >= timeout
}

/// Decides every game still open in a round that ran out of time.
pub fn resolve_timed_out_games<R, C>(
    state: &TournamentState,
    policy: TimeoutPolicy,
    is_connected: C,
    rng: &mut R,
) -> Vec<TimeoutResolution>
where
    R: Rng + ?Sized,
    C: Fn(&str) -> bool,
{
    state
        .active_games
        .iter()
        .map(|(game_id, game)| {
            let Some(player_2) = game.player_2.clone() else {
                return TimeoutResolution {
                    game_id: game_id.clone(),
                    winner: game.player_1.clone(),
                    loser: None,
                };
            };
            let player_1 = game.player_1.clone();

            let first_wins = match policy {
                TimeoutPolicy::PreferConnected => {
                    match (is_connected(&player_1), is_connected(&player_2)) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => rng.random_bool(0.5),
                    }
                }
                TimeoutPolicy::Random => rng.random_bool(0.5),
            };

            let (winner, loser) = if first_wins {
                (player_1, player_2)
            } else {
                (player_2, player_1)
            };
            TimeoutResolution {
                game_id: game_id.clone(),
                winner,
                loser: Some(loser),
            }
        })
        .collect()
}
