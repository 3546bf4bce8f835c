use anyhow::{Context, Result};
use api::{setup_config, setup_db, setup_router, setup_store};
use tracing::info;
use utils::migrate;

pub async fn run() -> Result<()> {
    let config = setup_config()?;

    let conn = setup_db(&config.db_url).await?;
    migrate(&conn).await.context("Migration failed")?;

    let backend = setup_store(&config.redis_url).await?;
    let (router, app_state) = setup_router(config.clone(), conn, backend)?;

    let listener = tokio::net::TcpListener::bind(config.get_server_url())
        .await
        .context("bind to port")?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("start server")?;

    app_state.manager.shutdown();
    info!("Stopped all tournament coordinators");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
