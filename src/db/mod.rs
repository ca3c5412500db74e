pub(crate) mod models;
pub(crate) mod types;

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::Settings;

/// Schema for test blocks, enrollment, archives and submissions, embedded at build time.
pub(crate) static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Pool for one process role. `application_name` shows up in `pg_stat_activity`,
/// which tells the API and the reconciler apart when both run against one database.
pub(crate) async fn init_pool(
    settings: &Settings,
    application_name: &str,
) -> Result<PgPool, sqlx::Error> {
    let database = settings.database();
    let connect_options: PgConnectOptions = database.database_url().parse()?;
    let connect_options = connect_options
        .application_name(application_name)
        .log_statements(tracing::log::LevelFilter::Off);

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(1)
        // Acquiring never outlives the per-call repository deadline.
        .acquire_timeout(Duration::from_secs(database.timeout_seconds))
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await?;

    tracing::info!(
        application_name,
        max_connections = database.max_connections,
        "Database pool ready"
    );

    Ok(pool)
}

pub(crate) async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    MIGRATOR.run(pool).await?;
    let latest = MIGRATOR.iter().map(|migration| migration.version).max();
    tracing::info!(latest_version = ?latest, "Database schema up to date");
    Ok(())
}
