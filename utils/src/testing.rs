use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use crate::migrate;

/// Connects to `db_url` with a single pooled connection and applies every migration.
///
/// A single connection keeps `sqlite::memory:` databases alive and shared for
/// the lifetime of the returned handle.
pub async fn setup_test_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url);
    opt.min_connections(1).max_connections(1).sqlx_logging(false);

    let conn = Database::connect(opt).await?;
    migrate(&conn).await?;
    Ok(conn)
}
