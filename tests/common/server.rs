//! Test server lifecycle management
//!
//! Each test gets an isolated server writing to its own temporary database.

use super::constants::*;
use getstats_server::ingest::{spawn_writer, IngestStats, WriterOptions};
use getstats_server::server::{server::make_app, RequestsLoggingLevel, ServerConfig};
use getstats_server::stats_store::{open_stats_db, table_columns, STATS_TABLE};
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated stats database
///
/// When dropped, the server gracefully shuts down and the temp directory is
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Path of the stats database, readable while the server runs
    pub db_path: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server storing normalized rows only
    pub async fn spawn() -> Self {
        Self::spawn_with(WriterOptions::default(), TEST_QUEUE_CAPACITY).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, the port cannot be bound or
    /// the server doesn't become ready within timeout.
    pub async fn spawn_with(options: WriterOptions, queue_capacity: usize) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_db_dir.path().join("getstats.db");
        let conn = open_stats_db(&db_path).expect("Failed to open stats database");

        let stats = Arc::new(IngestStats::default());
        let (queue, _writer) = spawn_writer(conn, options, stats.clone(), queue_capacity)
            .expect("Failed to start writer");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            host: "127.0.0.1".to_string(),
            port,
            metrics_port: 0,
        };
        let app = make_app(config, queue, stats);

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            db_path,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Opens a read-only connection to the live database
    pub fn read_db(&self) -> Connection {
        Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .expect("Failed to open stats database for reading")
    }

    /// Column names of the stats table in declaration order
    pub fn columns(&self) -> Vec<String> {
        table_columns(&self.read_db(), STATS_TABLE)
            .expect("Failed to read columns")
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    pub fn count_rows(&self, table: &str) -> i64 {
        self.read_db()
            .query_row(&format!("SELECT count(*) FROM \"{}\"", table), [], |row| {
                row.get(0)
            })
            .expect("Failed to count rows")
    }

    /// Waits for the server to become ready by polling the status endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
