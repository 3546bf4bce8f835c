use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use models::{
    domains::sea_orm_active_enums::TournamentStatus,
    schemas::{
        events::{GamePairing, TournamentEvent, player_room, tournament_room},
        tournament::TournamentState,
    },
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{
    bracket::{self, RoundPlan, RoundProgress},
    context::TournamentContext,
};
use crate::{
    error::{TournamentError, TournamentResult},
    persistence::{
        self,
        games::{self as game_rows, NewGame},
        tournaments as tournament_rows,
    },
};

/// How a coordinator task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorExit {
    Completed,
    Cancelled,
}

enum Step {
    Idle,
    RoundOpened(u32),
    Completed,
}

enum RoundWait {
    Finished,
    Completed,
    Cancelled,
}

/// A result to fold into the current round.
pub(crate) struct GameOutcome<'a> {
    pub game_id: Option<&'a str>,
    pub winner: &'a str,
    pub loser: Option<&'a str>,
    pub scores: Option<(i32, i32)>,
    pub auto_advance: bool,
}

/// Drives one tournament from start to completion.
///
/// Every state change happens under the tournament lock against a freshly
/// loaded state; between passes the task only sleeps, so cancellation is
/// observed at those sleeps.
pub struct Coordinator {
    ctx: TournamentContext,
    tournament_id: String,
    shutdown: watch::Receiver<bool>,
}

impl Coordinator {
    pub fn new(
        ctx: TournamentContext,
        tournament_id: String,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            tournament_id,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<CoordinatorExit> {
        info!(tournament_id = %self.tournament_id, "Coordinator started");

        loop {
            let state = self
                .ctx
                .store
                .load_fresh(&self.tournament_id)
                .await
                .context("loading tournament before start")?;
            if state.is_complete {
                return Ok(CoordinatorExit::Completed);
            }
            if state.initialized {
                break;
            }
            if !self.pause(self.ctx.settings.init_poll).await {
                return Ok(CoordinatorExit::Cancelled);
            }
        }

        loop {
            if self.cancelled() {
                return Ok(CoordinatorExit::Cancelled);
            }

            let step = self
                .next_step()
                .await
                .context("opening the next round")?;
            match step {
                Step::Completed => return Ok(CoordinatorExit::Completed),
                Step::Idle => {
                    if !self.pause(self.ctx.settings.idle_poll).await {
                        return Ok(CoordinatorExit::Cancelled);
                    }
                }
                Step::RoundOpened(round) => {
                    let wait = self
                        .wait_for_round()
                        .await
                        .with_context(|| format!("waiting for round {round}"))?;
                    match wait {
                        RoundWait::Completed => return Ok(CoordinatorExit::Completed),
                        RoundWait::Cancelled => return Ok(CoordinatorExit::Cancelled),
                        RoundWait::Finished => {
                            debug!(tournament_id = %self.tournament_id, round, "round finished");
                            if !self.pause(self.ctx.settings.round_grace).await {
                                return Ok(CoordinatorExit::Cancelled);
                            }
                        }
                    }
                }
            }
        }
    }

    fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps for `duration`; `false` when cancellation arrived first.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.cancelled(),
            _ = self.shutdown.changed() => false,
        }
    }

    async fn next_step(&self) -> TournamentResult<Step> {
        let ctx = &self.ctx;
        let id = self.tournament_id.as_str();
        let step = ctx
            .try_locked(id, || async move {
                let mut state = ctx.store.load_fresh(id).await?;
                if state.is_complete {
                    return Ok(Step::Completed);
                }
                if bracket::can_start_next_round(&mut state, Utc::now()) {
                    let plan = start_round(ctx, &mut state).await?;
                    return Ok(Step::RoundOpened(plan.round));
                }
                if state.is_complete {
                    // a lone survivor was left over
                    ctx.store.save(&state).await?;
                    finalize(ctx, &state).await?;
                    return Ok(Step::Completed);
                }
                if state.round_active() {
                    // rehydrated mid-round
                    return Ok(Step::RoundOpened(state.current_round));
                }
                Ok(Step::Idle)
            })
            .await?;
        Ok(step.unwrap_or(Step::Idle))
    }

    async fn wait_for_round(&mut self) -> TournamentResult<RoundWait> {
        loop {
            if !self.pause(self.ctx.settings.round_poll).await {
                return Ok(RoundWait::Cancelled);
            }

            let state = self.ctx.store.load_fresh(&self.tournament_id).await?;
            if state.is_complete {
                return Ok(RoundWait::Completed);
            }
            if !state.round_active() {
                return Ok(RoundWait::Finished);
            }

            self.ctx.store.touch_active_games(&self.tournament_id).await?;

            if bracket::round_timed_out(&state, Utc::now(), self.ctx.settings.round_timeout) {
                warn!(
                    tournament_id = %self.tournament_id,
                    round = state.current_round,
                    pending = state.active_games.len(),
                    "{}",
                    TournamentError::Timeout
                );
                self.resolve_timeouts().await?;
            }
        }
    }

    async fn resolve_timeouts(&self) -> TournamentResult<()> {
        let ctx = &self.ctx;
        let id = self.tournament_id.as_str();
        ctx.try_locked(id, || async move {
            let mut state = ctx.store.load_fresh(id).await?;
            if state.is_complete
                || !bracket::round_timed_out(&state, Utc::now(), ctx.settings.round_timeout)
            {
                return Ok(());
            }

            let resolutions = {
                let mut rng = rand::rng();
                bracket::resolve_timed_out_games(
                    &state,
                    ctx.settings.timeout_policy,
                    |player| ctx.presence.is_connected(player),
                    &mut rng,
                )
            };

            for resolution in resolutions {
                info!(
                    tournament_id = id,
                    game_id = %resolution.game_id,
                    winner = %resolution.winner,
                    "Advancing winner of timed out game"
                );
                settle_result(
                    ctx,
                    &mut state,
                    GameOutcome {
                        game_id: Some(&resolution.game_id),
                        winner: &resolution.winner,
                        loser: resolution.loser.as_deref(),
                        scores: None,
                        auto_advance: true,
                    },
                )
                .await?;
                if state.is_complete {
                    break;
                }
            }
            Ok(())
        })
        .await?;
        Ok(())
    }
}

/// Opens the next round. Caller holds the lock and has checked
/// `can_start_next_round`.
async fn start_round(
    ctx: &TournamentContext,
    state: &mut TournamentState,
) -> TournamentResult<RoundPlan> {
    let now = Utc::now();
    let plan = {
        let mut rng = rand::rng();
        bracket::open_round(state, &mut rng, now, persistence::generate_id)?
    };

    if let Some(bye) = &plan.bye {
        bracket::register_result(state, None, bye, None, true, now)?;
        info!(tournament_id = %state.tournament_id, player_id = %bye, round = plan.round, "Bye granted");
    }

    // rows follow the live state so a failed save leaves no orphaned games behind
    ctx.store.save(state).await?;

    for game in &plan.games {
        game_rows::create_game(
            &ctx.conn,
            NewGame {
                id: &game.game_id,
                tournament_id: &state.tournament_id,
                round: plan.round,
                player_1: &game.player_1,
                player_2: game.player_2.as_deref(),
                created_at: now,
            },
        )
        .await?;
    }

    info!(
        tournament_id = %state.tournament_id,
        round = plan.round,
        games = plan.games.len(),
        "Round started"
    );

    let room = tournament_room(&state.tournament_id);
    let pairings: Vec<GamePairing> = plan
        .games
        .iter()
        .map(|g| GamePairing {
            game_id: g.game_id.clone(),
            player_1: g.player_1.clone(),
            player_2: g.player_2.clone(),
        })
        .collect();
    ctx.broadcaster
        .emit(
            &room,
            &TournamentEvent::TournamentStartRound {
                round_number: plan.round,
                games_count: pairings.len(),
                games: pairings.clone(),
            },
        )
        .await;

    for pairing in pairings {
        let mut rooms = vec![room.clone(), player_room(&pairing.player_1)];
        rooms.extend(pairing.player_2.as_deref().map(player_room));
        let event = TournamentEvent::CreateGame {
            game_id: pairing.game_id,
            player_1: pairing.player_1,
            player_2: pairing.player_2,
        };
        for room in &rooms {
            ctx.broadcaster.emit(room, &event).await;
        }
    }

    Ok(plan)
}

/// Records one result, saves the state, and announces a finished round or
/// the tournament's completion. Caller holds the lock.
pub(crate) async fn settle_result(
    ctx: &TournamentContext,
    state: &mut TournamentState,
    outcome: GameOutcome<'_>,
) -> TournamentResult<RoundProgress> {
    let progress = bracket::register_result(
        state,
        outcome.game_id,
        outcome.winner,
        outcome.loser,
        outcome.auto_advance,
        Utc::now(),
    )?;

    if let Some(game_id) = outcome.game_id {
        game_rows::record_result(&ctx.conn, game_id, outcome.winner, outcome.scores).await?;
    }
    ctx.store.save(state).await?;

    match &progress {
        RoundProgress::InProgress => {}
        RoundProgress::RoundEnded { round, advancing } => {
            info!(
                tournament_id = %state.tournament_id,
                round,
                advancing = advancing.len(),
                "Round ended"
            );
            ctx.broadcaster
                .emit(
                    &tournament_room(&state.tournament_id),
                    &TournamentEvent::TournamentRoundEnd {
                        round_number: *round,
                        winners: advancing.clone(),
                        players_advancing: advancing.len(),
                    },
                )
                .await;
        }
        RoundProgress::Completed { .. } => finalize(ctx, state).await?,
    }
    Ok(progress)
}

/// Writes the outcome back to the database and announces the winner.
async fn finalize(ctx: &TournamentContext, state: &TournamentState) -> TournamentResult<()> {
    let Some(winner) = state.winner.as_deref() else {
        error!(tournament_id = %state.tournament_id, "Completed tournament has no winner");
        return Err(TournamentError::invalid("Completed tournament has no winner"));
    };

    tournament_rows::update_status(
        &ctx.conn,
        &state.tournament_id,
        TournamentStatus::Completed,
        Some(winner),
    )
    .await?;

    info!(
        tournament_id = %state.tournament_id,
        winner,
        rounds = state.current_round,
        "Tournament completed"
    );
    ctx.broadcaster
        .emit(
            &tournament_room(&state.tournament_id),
            &TournamentEvent::TournamentComplete {
                winner: winner.to_owned(),
                total_rounds: state.current_round,
                total_players: state.nbr_player(),
            },
        )
        .await;
    Ok(())
}
