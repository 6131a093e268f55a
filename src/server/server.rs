use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rusqlite::Connection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{log_requests, metrics, state::*, ServerConfig};
use crate::ingest::{spawn_writer, IngestError, IngestQueue, IngestStats, WriterOptions};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub payloads: u64,
    pub rows_inserted: u64,
    pub columns_created: u64,
    pub failures: u64,
    pub columns: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        payloads: snapshot.payloads,
        rows_inserted: snapshot.rows_inserted,
        columns_created: snapshot.columns_created,
        failures: snapshot.decode_failures + snapshot.row_failures,
        columns: snapshot.columns,
    };
    Json(stats)
}

fn error_response(err: &IngestError) -> Response {
    let status = match err {
        IngestError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

/// Hands the body to the writer and answers once it has been stored.
///
/// The writer keeps going past reports it could not store. Any such failure
/// turns the response into a 500 listing one error per line.
async fn ingest(
    State(queue): State<IngestQueue>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            error!("Could not read request body: {}", rejection);
            return (StatusCode::INTERNAL_SERVER_ERROR, rejection.body_text()).into_response();
        }
    };
    match queue.submit(body).await {
        Ok(summary) => {
            if !summary.is_clean() {
                warn!(
                    "Stored {} of {} reports, {} failed",
                    summary.rows_inserted,
                    summary.reports,
                    summary.row_errors.len()
                );
                let errors = summary
                    .row_errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                return (StatusCode::INTERNAL_SERVER_ERROR, errors).into_response();
            }
            StatusCode::OK.into_response()
        }
        Err(err) => {
            error!("Ingest failed: {}", err);
            error_response(&err)
        }
    }
}

pub fn make_app(config: ServerConfig, queue: IngestQueue, stats: Arc<IngestStats>) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        queue,
        stats,
        hash: env!("GIT_HASH").to_owned(),
    };

    Router::new()
        .route("/", get(home).post(ingest))
        .with_state(state)
        .layer(middleware::from_fn_with_state(config, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serves ingest requests until `shutdown` is cancelled, then waits for the
/// writer to drain whatever was already queued.
pub async fn run_server(
    config: ServerConfig,
    conn: Connection,
    options: WriterOptions,
    queue_capacity: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    let stats = Arc::new(IngestStats::default());
    let (queue, writer) = spawn_writer(conn, options, stats.clone(), queue_capacity)?;
    let app = make_app(config.clone(), queue, stats);

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    info!("Ready to serve at {}", config.listen_addr());

    if let Some(metrics_addr) = config.metrics_addr() {
        let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
            .await
            .with_context(|| format!("Failed to bind metrics listener {}", metrics_addr))?;
        info!("Metrics available at {}/metrics", metrics_addr);
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = axum::serve(metrics_listener, make_metrics_app())
                .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
                .await
            {
                error!("Metrics server failed: {}", err);
            }
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Server failed")?;

    // The router owned the last queue handles, so the writer is finishing up
    info!("Waiting for the ingest writer to finish");
    writer.await.context("Ingest writer panicked")?;
    Ok(())
}
