use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::{Value, json};
use socketioxide::SocketIo;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use app::{
    broadcast::SocketIoBroadcaster,
    config::Config,
    core::{TournamentContext, TournamentManager},
    presence::PresenceRegistry,
    state::AppState,
    store::{KvBackend, RedisBackend},
};

use crate::action::register_tournament_namespace;

pub fn setup_router(
    config: Config,
    conn: DatabaseConnection,
    backend: Arc<dyn KvBackend>,
) -> Result<(Router, AppState)> {
    let cors = CorsLayer::new()
        .allow_methods([Method::OPTIONS, Method::GET, Method::POST])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .context("Failed to parse allowed origin")?,
        )
        .allow_credentials(true);

    let (socket_layer, io) = SocketIo::new_layer();

    let presence = PresenceRegistry::new();
    let ctx = TournamentContext::new(
        conn,
        backend,
        Arc::new(SocketIoBroadcaster::new(io.clone())),
        presence.clone(),
        config.tournament.clone(),
    );
    let app_state = AppState {
        manager: TournamentManager::new(ctx),
        presence,
    };

    register_tournament_namespace(&io, app_state.clone());

    let router = Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(socket_layer);
    Ok((router, app_state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn setup_config() -> Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_env()
}

pub async fn setup_db(db_url: &str) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(db_url);
    opt.max_lifetime(std::time::Duration::from_secs(60))
        .min_connections(2)
        .max_connections(20);

    let conn = Database::connect(opt)
        .await
        .context("Database connection failed")?;
    info!("Connected to database");
    Ok(conn)
}

pub async fn setup_store(redis_url: &str) -> Result<Arc<dyn KvBackend>> {
    let backend = RedisBackend::connect(redis_url)
        .await
        .context("Redis connection failed")?;
    Ok(Arc::new(backend))
}
