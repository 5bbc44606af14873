use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use filmvault::{app, config::AppConfig, data::Models, db, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "filmvault=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);
    let pool = db::connect(&config.db).await?;
    db::migrate(&pool).await?;

    let queries = CancellationToken::new();
    let state = AppState::new(Models::new(pool.clone()), config.clone(), queries.clone());

    tracing::info!(env = config.env.as_str(), version = app::VERSION, "starting server");
    let served = app::serve(app::build_app(state), &config.host, config.port, queries).await;

    pool.close().await;
    tracing::info!("database pool closed");
    served
}
