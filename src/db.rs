use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Pool limits derived from `cfg`.
///
/// sqlx has no cap on idle connections separate from the pool size; idle
/// connections are reaped after `max_idle_time` down to zero, so
/// `max_idle_conns` is only reported.
pub(crate) fn pool_options(cfg: &DbConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(cfg.max_open_conns)
        .min_connections(0)
        .idle_timeout(cfg.max_idle_time)
        .acquire_timeout(Duration::from_secs(5))
}

/// Builds the process-wide pool and verifies it within five seconds.
///
/// The caller owns the returned pool and closes it on shutdown.
pub async fn connect(cfg: &DbConfig) -> anyhow::Result<PgPool> {
    let pool = pool_options(cfg)
        .connect(&cfg.dsn)
        .await
        .context("connect to database")?;

    tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(&pool))
        .await
        .context("database ping timed out")?
        .context("ping database")?;

    info!(
        max_open_conns = cfg.max_open_conns,
        max_idle_conns = cfg.max_idle_conns,
        "database connection pool established"
    );
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;
    info!("migrations applied");
    Ok(())
}
