use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{movies, users};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .merge(movies::router())
        .merge(users::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.env.as_str(),
            "version": VERSION,
        }
    }))
}

/// How long in-flight requests may keep running after a termination signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Serves until Ctrl-C or SIGTERM, then drains in-flight requests.
///
/// `queries` is the parent of every request's store context. It is cancelled
/// once draining has taken longer than [`SHUTDOWN_GRACE`], and always after the
/// server has stopped.
pub async fn serve(app: Router, host: &str, port: u16, queries: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_until(listener, app, shutdown_signal(), queries, SHUTDOWN_GRACE).await
}

async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    queries: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let draining = CancellationToken::new();
    let notify = draining.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.await;
        tracing::info!("shutdown signal received, draining requests");
        notify.cancel();
    });

    let expired = queries.clone();
    let watchdog = tokio::spawn(async move {
        draining.cancelled().await;
        tokio::time::sleep(grace).await;
        tracing::warn!(?grace, "grace period elapsed, cancelling in-flight queries");
        expired.cancel();
    });

    let served = server.await;
    watchdog.abort();
    queries.cancel();
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
