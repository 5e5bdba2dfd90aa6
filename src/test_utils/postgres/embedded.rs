use postgresql_embedded::PostgreSQL;

use crate::config::{AdminMode, DbSettings};
use crate::handler::SqlConnectionHandler;
use crate::types::DatabaseType;

/// A running embedded `PostgreSQL` instance and settings that reach it.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    /// Regular and admin credentials are both the embedded superuser.
    pub settings: DbSettings,
}

/// Start an embedded `PostgreSQL` server and create `database` on it.
///
/// # Errors
/// Returns an error if the server cannot be set up or started, the database cannot be
/// created, or the post-start connectivity check fails.
pub async fn setup_postgres_embedded(
    database: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(database).await?;

    let port = postgresql.settings().port;
    let host = postgresql.settings().host.clone();
    let user = postgresql.settings().username.clone();
    let password = postgresql.settings().password.clone();

    let settings = DbSettings::new(DatabaseType::Postgres)
        .with_user(user.clone())
        .with_password(password.clone())
        .with_database(database)
        .with_host(host, port)
        .with_admin(user, password);

    // Quick connection test
    let mut handler = SqlConnectionHandler::new(&settings, AdminMode::NoAdmin).await?;
    handler.fetch_one("SELECT 1", ()).await?;
    handler.close().await;
    tracing::info!(port, database, "embedded postgres ready");

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        settings,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub async fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    if let Err(e) = postgresql.stop().await {
        tracing::warn!(error = %e, "failed to stop embedded postgres");
    }
}
