use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use models::{
    domains::sea_orm_active_enums::TournamentStatus,
    params::tournament::{CreateTournamentParams, ReportResultParams},
    schemas::tournament::{BracketView, TournamentState, TournamentSummary},
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use super::{
    bracket,
    context::TournamentContext,
    coordinator::{self, Coordinator, CoordinatorExit, GameOutcome},
};
use crate::{
    cache::Cache,
    error::{TournamentError, TournamentResult},
    persistence::{
        self,
        tournaments::{self as tournament_rows, NewTournament},
    },
    scheduler::schedule_new_task,
};

/// A coordinator task tracked by this process.
pub struct TournamentHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TournamentHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn cancel(&self) {
        // the receiver may already be gone if the task ended on its own
        let _ = self.shutdown.send(true);
    }

    /// Resolves once the coordinator has dropped its end of the channel.
    async fn stopped(&self) {
        self.shutdown.closed().await
    }
}

/// Process-local directory of coordinator tasks plus the inbound operations.
///
/// The map only prevents duplicate tasks in this process; the shared store
/// and the tournament lock are what keep several processes consistent.
#[derive(Clone)]
pub struct TournamentManager {
    ctx: TournamentContext,
    handles: Cache<Arc<TournamentHandle>>,
}

impl TournamentManager {
    pub fn new(ctx: TournamentContext) -> Self {
        Self {
            ctx,
            handles: Cache::new(),
        }
    }

    pub async fn create_tournament(
        &self,
        params: CreateTournamentParams,
        creator_id: &str,
    ) -> TournamentResult<TournamentState> {
        if params.max_players < 2 {
            return Err(TournamentError::invalid(
                "A tournament needs room for at least 2 players",
            ));
        }
        let CreateTournamentParams {
            id,
            name,
            max_players,
        } = params;
        let tournament_id = id.unwrap_or_else(persistence::generate_id);
        let ctx = &self.ctx;
        let name = name.as_str();
        let id = tournament_id.as_str();

        let state = ctx
            .locked(id, || async move {
                if tournament_rows::get_tournament(&ctx.conn, id).await?.is_some() {
                    return Err(TournamentError::invalid(format!(
                        "Tournament {id} already exists"
                    )));
                }

                let state = TournamentState::new(
                    id.to_owned(),
                    name.to_owned(),
                    max_players,
                    creator_id.to_owned(),
                    Utc::now(),
                );
                // the row goes in last: its presence is what refuses a second create
                ctx.store.save(&state).await?;
                let inserted = tournament_rows::create_tournament(
                    &ctx.conn,
                    NewTournament {
                        id,
                        name: &state.name,
                        max_participants: state.max_players as i32,
                        creator_id,
                        created_at: state.created_at,
                    },
                )
                .await;
                if let Err(e) = inserted {
                    if let Err(cleanup) = ctx.store.delete(id).await {
                        warn!(tournament_id = id, "Failed to drop unsaved tournament: {}", cleanup);
                    }
                    return Err(e.into());
                }
                Ok(state)
            })
            .await?;
        self.track(&state);

        info!(
            tournament_id = %state.tournament_id,
            creator_id,
            max_players = state.max_players,
            "Tournament created"
        );
        Ok(state)
    }

    /// Looks the tournament up, rebuilding it from the database when the
    /// store lost it, and makes sure an unfinished one has a live coordinator.
    pub async fn get_tournament(&self, tournament_id: &str) -> TournamentResult<TournamentState> {
        let state = self.ctx.store.load(tournament_id).await?;
        self.track(&state);
        Ok(state)
    }

    /// Cancels the coordinator and drops the live state.
    pub async fn remove_tournament(&self, tournament_id: &str) -> TournamentResult<()> {
        if let Some(handle) = self.handles.delete_data(tournament_id) {
            handle.cancel();
            // a coordinator mid-pass could otherwise write the state back
            if tokio::time::timeout(self.ctx.settings.lock_ttl, handle.stopped())
                .await
                .is_err()
            {
                warn!(tournament_id, "Coordinator did not stop in time");
            }
        }
        self.ctx.store.delete(tournament_id).await?;
        info!(tournament_id, "Tournament removed");
        Ok(())
    }

    pub async fn join_tournament(
        &self,
        tournament_id: &str,
        player_id: &str,
    ) -> TournamentResult<TournamentState> {
        let ctx = &self.ctx;
        let state = ctx
            .locked(tournament_id, || async move {
                let mut state = ctx.store.load_fresh(tournament_id).await?;
                bracket::add_player(&mut state, player_id)?;
                // idempotent, so a join whose save failed can simply be retried
                tournament_rows::add_player(&ctx.conn, tournament_id, player_id).await?;
                ctx.store.save(&state).await?;
                Ok(state)
            })
            .await?;

        info!(
            tournament_id,
            player_id,
            players = state.nbr_player(),
            "Player joined tournament"
        );
        self.track(&state);
        Ok(state)
    }

    pub async fn start_tournament(
        &self,
        tournament_id: &str,
        player_id: &str,
    ) -> TournamentResult<TournamentState> {
        let ctx = &self.ctx;
        let state = ctx
            .locked(tournament_id, || async move {
                let mut state = ctx.store.load_fresh(tournament_id).await?;
                if state.creator_id != player_id {
                    return Err(TournamentError::invalid(
                        "Only the creator can start the tournament",
                    ));
                }
                bracket::start(&mut state)?;
                tournament_rows::update_status(
                    &ctx.conn,
                    tournament_id,
                    TournamentStatus::Active,
                    None,
                )
                .await?;
                ctx.store.save(&state).await?;
                Ok(state)
            })
            .await?;

        info!(
            tournament_id,
            players = state.nbr_player(),
            "Tournament started"
        );
        self.track(&state);
        Ok(state)
    }

    pub async fn report_result(
        &self,
        params: ReportResultParams,
    ) -> TournamentResult<TournamentState> {
        let ctx = &self.ctx;
        let params = &params;
        let tournament_id = params.tournament_id.as_str();
        let scores = params.score_1.zip(params.score_2);

        let state = ctx
            .locked(tournament_id, || async move {
                let mut state = ctx.store.load_fresh(tournament_id).await?;
                coordinator::settle_result(
                    ctx,
                    &mut state,
                    GameOutcome {
                        game_id: Some(&params.game_id),
                        winner: &params.winner,
                        loser: params.loser.as_deref(),
                        scores,
                        auto_advance: false,
                    },
                )
                .await?;
                Ok(state)
            })
            .await?;

        info!(
            tournament_id,
            game_id = %params.game_id,
            winner = %params.winner,
            "Game result recorded"
        );
        self.track(&state);
        Ok(state)
    }

    pub async fn brackets(&self, tournament_id: &str) -> TournamentResult<BracketView> {
        let state = self.get_tournament(tournament_id).await?;
        Ok(BracketView::from(&state))
    }

    pub async fn status(&self, tournament_id: &str) -> TournamentResult<TournamentSummary> {
        let state = self.get_tournament(tournament_id).await?;
        Ok(TournamentSummary::from(&state))
    }

    /// Whether a coordinator for `tournament_id` is running in this process.
    pub fn is_tracked(&self, tournament_id: &str) -> bool {
        self.handles
            .read_data(tournament_id, |handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn tracked_count(&self) -> usize {
        self.handles.count()
    }

    /// Cancels every coordinator of this process.
    pub fn shutdown(&self) {
        for tournament_id in self.handles.keys() {
            if let Some(handle) = self.handles.delete_data(&tournament_id) {
                handle.cancel();
            }
        }
    }

    /// Spawns a coordinator unless a live one already exists.
    fn track(&self, state: &TournamentState) {
        if state.is_complete {
            return;
        }
        let tournament_id = state.tournament_id.as_str();
        self.handles.upsert(
            tournament_id,
            || self.spawn_coordinator(tournament_id),
            |handle| {
                if handle.is_finished() {
                    warn!(tournament_id, "Coordinator had exited, restarting it");
                    *handle = self.spawn_coordinator(tournament_id);
                }
            },
        );
    }

    fn spawn_coordinator(&self, tournament_id: &str) -> Arc<TournamentHandle> {
        let (shutdown, receiver) = watch::channel(false);
        let coordinator = Coordinator::new(self.ctx.clone(), tournament_id.to_owned(), receiver);
        let manager = self.clone();
        let tournament_id = tournament_id.to_owned();

        let task = tokio::spawn(async move {
            match coordinator.run().await {
                Ok(CoordinatorExit::Completed) => manager.after_completion(tournament_id).await,
                Ok(CoordinatorExit::Cancelled) => {
                    info!(%tournament_id, "Coordinator cancelled");
                }
                Err(err) => {
                    error!(%tournament_id, "Coordinator stopped: {:#}", err);
                }
            }
        });

        Arc::new(TournamentHandle { shutdown, task })
    }

    async fn after_completion(&self, tournament_id: String) {
        if let Err(e) = self
            .ctx
            .store
            .expire(&tournament_id, self.ctx.settings.completed_ttl)
            .await
        {
            warn!(%tournament_id, "Failed to shorten tournament expiry: {}", e);
        }

        let evict_at = TimeDelta::from_std(self.ctx.settings.eviction_delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let handles = self.handles.clone();
        let store = self.ctx.store.clone();
        schedule_new_task(
            async move {
                handles.delete_if(&tournament_id, |handle| handle.is_finished());
                store.invalidate(&tournament_id);
                info!(%tournament_id, "Evicted completed tournament");
            },
            evict_at,
        );
    }
}
