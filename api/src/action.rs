use app::{
    core::TournamentManager,
    error::{TournamentError, TournamentResult},
    presence::PresenceRegistry,
    state::AppState,
};
use models::{
    params::tournament::{CreateTournamentParams, ReportResultParams, TournamentRefParams},
    schemas::{
        events::{player_room, tournament_room},
        tournament::{BracketView, TournamentSummary},
    },
};
use serde::{Deserialize, Serialize};
use socketioxide::{
    SocketIo,
    extract::{AckSender, SocketRef, TryData},
};
use tracing::{info, warn};
use validator::Validate;

use crate::ApiResponse;

#[derive(Deserialize, Debug)]
struct HandshakeAuth {
    player_id: String,
}

#[derive(Serialize, Debug)]
struct FailureDetails {
    code: i32,
    retryable: bool,
}

impl From<&TournamentError> for FailureDetails {
    fn from(err: &TournamentError) -> Self {
        Self {
            code: err.code(),
            retryable: err.is_retryable(),
        }
    }
}

pub fn register_tournament_namespace(io: &SocketIo, app_state: AppState) {
    io.ns(
        "/",
        async move |socket: SocketRef, TryData(auth): TryData<HandshakeAuth>| {
            let player_id = match auth {
                Ok(HandshakeAuth { player_id }) if !player_id.trim().is_empty() => player_id,
                Ok(_) => {
                    warn!("Socket {} sent an empty player id", socket.id);
                    let _ = socket.disconnect();
                    return;
                }
                Err(e) => {
                    warn!("Socket {} sent no usable handshake auth: {}", socket.id, e);
                    let _ = socket.disconnect();
                    return;
                }
            };

            info!("Socket.IO connected: player {} on {}", player_id, socket.id);
            socket.join(player_room(&player_id));
            app_state.presence.connect(&player_id);

            register_handlers(&socket, app_state.manager.clone(), player_id.clone());

            socket.on_disconnect({
                let presence: PresenceRegistry = app_state.presence.clone();
                move |s: SocketRef| {
                    presence.disconnect(&player_id);
                    info!("Socket.IO disconnected: player {} on {}", player_id, s.id);
                    async move {}
                }
            });
        },
    );
}

fn register_handlers(socket: &SocketRef, manager: TournamentManager, player_id: String) {
    socket.on("tournament:create", {
        let manager = manager.clone();
        let player_id = player_id.clone();
        move |s: SocketRef, TryData(params): TryData<CreateTournamentParams>, ack: AckSender| {
            let manager = manager.clone();
            let player_id = player_id.clone();
            async move {
                let params = params.map_err(|e| e.to_string());
                let result = create(&manager, &s, &player_id, params).await;
                acknowledge(ack, "tournament:create", "Tournament created", result);
            }
        }
    });

    socket.on("tournament:join", {
        let manager = manager.clone();
        let player_id = player_id.clone();
        move |s: SocketRef, TryData(params): TryData<TournamentRefParams>, ack: AckSender| {
            let manager = manager.clone();
            let player_id = player_id.clone();
            async move {
                let params = params.map_err(|e| e.to_string());
                let result = join(&manager, &s, &player_id, params).await;
                acknowledge(ack, "tournament:join", "Joined tournament", result);
            }
        }
    });

    socket.on("tournament:start", {
        let manager = manager.clone();
        let player_id = player_id.clone();
        move |TryData(params): TryData<TournamentRefParams>, ack: AckSender| {
            let manager = manager.clone();
            let player_id = player_id.clone();
            async move {
                let params = params.map_err(|e| e.to_string());
                let result = start(&manager, &player_id, params).await;
                acknowledge(ack, "tournament:start", "Tournament started", result);
            }
        }
    });

    socket.on("game:result", {
        let manager = manager.clone();
        move |TryData(params): TryData<ReportResultParams>, ack: AckSender| {
            let manager = manager.clone();
            async move {
                let params = params.map_err(|e| e.to_string());
                let result = report(&manager, params).await;
                acknowledge(ack, "game:result", "Result recorded", result);
            }
        }
    });

    socket.on("tournament:brackets", {
        let manager = manager.clone();
        move |TryData(params): TryData<TournamentRefParams>, ack: AckSender| {
            let manager = manager.clone();
            async move {
                let result = match validated(params.map_err(|e| e.to_string())) {
                    Ok(params) => manager.brackets(&params.tournament_id).await,
                    Err(e) => Err(e),
                };
                acknowledge(ack, "tournament:brackets", "Brackets", result);
            }
        }
    });

    socket.on("tournament:status", {
        move |TryData(params): TryData<TournamentRefParams>, ack: AckSender| {
            let manager = manager.clone();
            async move {
                let result = match validated(params.map_err(|e| e.to_string())) {
                    Ok(params) => manager.status(&params.tournament_id).await,
                    Err(e) => Err(e),
                };
                acknowledge(ack, "tournament:status", "Tournament status", result);
            }
        }
    });
}

fn validated<P: Validate>(params: Result<P, String>) -> TournamentResult<P> {
    let params =
        params.map_err(|e| TournamentError::invalid(format!("Malformed payload: {e}")))?;
    params
        .validate()
        .map_err(|e| TournamentError::invalid(format!("Invalid payload: {e}")))?;
    Ok(params)
}

async fn create(
    manager: &TournamentManager,
    socket: &SocketRef,
    player_id: &str,
    params: Result<CreateTournamentParams, String>,
) -> TournamentResult<TournamentSummary> {
    let params = validated(params)?;
    let state = manager.create_tournament(params, player_id).await?;
    socket.join(tournament_room(&state.tournament_id));
    Ok(TournamentSummary::from(&state))
}

async fn join(
    manager: &TournamentManager,
    socket: &SocketRef,
    player_id: &str,
    params: Result<TournamentRefParams, String>,
) -> TournamentResult<TournamentSummary> {
    let params = validated(params)?;
    let state = manager
        .join_tournament(&params.tournament_id, player_id)
        .await?;
    socket.join(tournament_room(&state.tournament_id));
    Ok(TournamentSummary::from(&state))
}

async fn start(
    manager: &TournamentManager,
    player_id: &str,
    params: Result<TournamentRefParams, String>,
) -> TournamentResult<TournamentSummary> {
    let params = validated(params)?;
    let state = manager
        .start_tournament(&params.tournament_id, player_id)
        .await?;
    Ok(TournamentSummary::from(&state))
}

async fn report(
    manager: &TournamentManager,
    params: Result<ReportResultParams, String>,
) -> TournamentResult<BracketView> {
    let params = validated(params)?;
    let state = manager.report_result(params).await?;
    Ok(BracketView::from(&state))
}

fn acknowledge<T: Serialize>(
    ack: AckSender,
    event: &str,
    message: &str,
    result: TournamentResult<T>,
) {
    let sent = match result {
        Ok(data) => ack.send(&ApiResponse::success(message, Some(data))),
        Err(err) => {
            warn!(event, code = err.code(), "{}", err);
            ack.send(&ApiResponse::failure(
                &err.to_string(),
                Some(FailureDetails::from(&err)),
            ))
        }
    };
    if let Err(e) = sent {
        warn!("Failed to acknowledge {}: {}", event, e);
    }
}
