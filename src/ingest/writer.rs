//! The single writer of the stats database.
//!
//! Every schema change and insert happens here, one payload at a time, which
//! is what keeps two requests from racing to add the same column.

use super::identifier::ColumnName;
use super::payload::{Payload, ReportRow};
use super::queue::{create_ingest_queue, IngestQueue, WriteRequest};
use super::row_inserter::RowInserter;
use super::schema_cache::SchemaCache;
use super::table_mutator::TableMutator;
use super::type_inference::TypeInferrer;
use super::IngestError;
use crate::server::metrics;
use crate::stats_store::STATS_TABLE;
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Which representations of a report get persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Keep each report's JSON in the raw table.
    pub store_raw_json: bool,
    /// Flatten each report into a row of the wide stats table.
    pub store_normalized: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            store_raw_json: false,
            store_normalized: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Decoding,
    ColumnReconciliation,
    Inserting,
}

/// Counters shared between the writer and the status endpoint.
#[derive(Debug, Default)]
pub struct IngestStats {
    payloads: AtomicU64,
    decode_failures: AtomicU64,
    rows_inserted: AtomicU64,
    row_failures: AtomicU64,
    columns_created: AtomicU64,
    known_columns: AtomicUsize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub payloads: u64,
    pub decode_failures: u64,
    pub rows_inserted: u64,
    pub row_failures: u64,
    pub columns_created: u64,
    pub columns: usize,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            payloads: self.payloads.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            row_failures: self.row_failures.load(Ordering::Relaxed),
            columns_created: self.columns_created.load(Ordering::Relaxed),
            columns: self.known_columns.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one payload.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub reports: usize,
    pub rows_inserted: usize,
    pub columns_created: Vec<ColumnName>,
    pub row_errors: Vec<IngestError>,
}

impl IngestSummary {
    pub fn is_clean(&self) -> bool {
        self.row_errors.is_empty()
    }
}

pub struct WriteSerializer {
    conn: Connection,
    cache: SchemaCache,
    inferrer: TypeInferrer,
    mutator: TableMutator,
    inserter: RowInserter,
    options: WriterOptions,
    stats: Arc<IngestStats>,
    state: WriterState,
}

impl WriteSerializer {
    /// Takes ownership of the connection and loads the current columns.
    pub fn new(conn: Connection, options: WriterOptions, stats: Arc<IngestStats>) -> Result<Self> {
        let cache = SchemaCache::load(&conn, STATS_TABLE)
            .with_context(|| format!("Failed to read columns of {}", STATS_TABLE))?;
        let inferrer = TypeInferrer::new(&conn).context("Failed to create type probe table")?;
        conn.set_prepared_statement_cache_capacity(64);

        stats.known_columns.store(cache.len(), Ordering::Relaxed);
        metrics::set_known_columns(cache.len());
        info!(
            "Writer ready, table {} has {} columns",
            STATS_TABLE,
            cache.len()
        );

        Ok(Self {
            conn,
            cache,
            inferrer,
            mutator: TableMutator::new(STATS_TABLE),
            inserter: RowInserter::new(STATS_TABLE),
            options,
            stats,
            state: WriterState::Idle,
        })
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.cache
    }

    /// Drains the queue until every producer is gone. Meant to run on a
    /// blocking thread.
    pub fn run(mut self, mut receiver: mpsc::Receiver<WriteRequest>) {
        info!("Ingest writer started");
        while let Some(request) = receiver.blocking_recv() {
            debug!("Processing payload {} ({} bytes)", request.id, request.body.len());
            let result = self.process(&request.body);
            if let Err(err) = &result {
                warn!("Payload {} rejected: {}", request.id, err);
            }
            if request.reply.send(result).is_err() {
                debug!("Producer of payload {} went away", request.id);
            }
        }
        info!("Ingest writer stopped, all producers closed");
    }

    /// Decodes and stores one payload. Only decoding errors fail the whole
    /// payload; everything else is collected per report in the summary.
    pub fn process(&mut self, body: &[u8]) -> Result<IngestSummary, IngestError> {
        let start = Instant::now();
        self.stats.payloads.fetch_add(1, Ordering::Relaxed);

        self.state = WriterState::Decoding;
        let payload: Payload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(err) => {
                self.state = WriterState::Idle;
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_payload("decode_error", start.elapsed());
                return Err(IngestError::Decode(err));
            }
        };

        let mut summary = IngestSummary {
            reports: payload.reports.len(),
            ..Default::default()
        };
        for (report_id, body) in &payload.reports {
            if self.options.store_raw_json {
                self.store_raw(&payload.connection_id, report_id, body, &mut summary);
            }
            if self.options.store_normalized {
                self.store_row(&payload.connection_id, report_id, body, &mut summary);
            }
        }
        self.state = WriterState::Idle;

        let status = if summary.is_clean() { "ok" } else { "partial" };
        metrics::record_payload(status, start.elapsed());
        debug!(
            "Payload of {} stored {} rows in {}ms",
            payload.connection_id,
            summary.rows_inserted,
            start.elapsed().as_millis()
        );
        Ok(summary)
    }

    fn store_raw(
        &mut self,
        connection_id: &str,
        report_id: &str,
        body: &Value,
        summary: &mut IngestSummary,
    ) {
        self.state = WriterState::Inserting;
        if let Err(source) =
            self.inserter
                .insert_raw(&self.conn, connection_id, report_id, &body.to_string())
        {
            let err = IngestError::RawInsert {
                report_id: report_id.to_string(),
                source,
            };
            error!("{}", err);
            summary.row_errors.push(err);
        }
    }

    fn store_row(
        &mut self,
        connection_id: &str,
        report_id: &str,
        body: &Value,
        summary: &mut IngestSummary,
    ) {
        self.state = WriterState::Decoding;
        let row = match ReportRow::from_report(body) {
            Some(row) => row,
            None => {
                self.fail_row(IngestError::ReportNotObject(report_id.to_string()), summary);
                return;
            }
        };
        for dropped in &row.dropped {
            warn!("Report {}: dropping field, {}", report_id, dropped);
            metrics::record_dropped_field(dropped.kind());
        }

        self.state = WriterState::ColumnReconciliation;
        let fields = match self.reconcile_columns(&row, summary) {
            Ok(fields) => fields,
            Err(err) => {
                self.fail_row(err, summary);
                return;
            }
        };

        self.state = WriterState::Inserting;
        match self.inserter.insert(&self.conn, connection_id, &fields) {
            Ok(_) => {
                summary.rows_inserted += 1;
                self.stats.rows_inserted.fetch_add(1, Ordering::Relaxed);
                metrics::record_row("inserted");
            }
            Err(source) => self.fail_row(
                IngestError::Insert {
                    report_id: report_id.to_string(),
                    source,
                },
                summary,
            ),
        }
    }

    /// Makes sure every field of `row` has a column, creating missing ones,
    /// and returns the fields under their existing column spelling.
    fn reconcile_columns(
        &mut self,
        row: &ReportRow,
        summary: &mut IngestSummary,
    ) -> Result<Vec<(ColumnName, Option<String>)>, IngestError> {
        let mut fields = Vec::with_capacity(row.fields.len());
        for (name, value) in &row.fields {
            let column = match self.cache.resolve(name).cloned() {
                Some(existing) => existing,
                None => {
                    self.create_column(name, value.as_deref())?;
                    summary.columns_created.push(name.clone());
                    name.clone()
                }
            };
            fields.push((column, value.clone()));
        }
        Ok(fields)
    }

    fn create_column(&mut self, name: &ColumnName, sample: Option<&str>) -> Result<(), IngestError> {
        let sql_type = self.inferrer.infer(&self.conn, sample).map_err(|source| {
            metrics::record_schema_error("type_probe");
            IngestError::TypeProbe {
                column: name.to_string(),
                source,
            }
        })?;
        self.mutator
            .add_column(&self.conn, name, sql_type)
            .map_err(|source| {
                metrics::record_schema_error("add_column");
                IngestError::AddColumn {
                    column: name.to_string(),
                    source,
                }
            })?;

        self.cache.record(name.clone());
        self.stats.columns_created.fetch_add(1, Ordering::Relaxed);
        self.stats
            .known_columns
            .store(self.cache.len(), Ordering::Relaxed);
        metrics::record_column_created();
        metrics::set_known_columns(self.cache.len());
        Ok(())
    }

    fn fail_row(&mut self, err: IngestError, summary: &mut IngestSummary) {
        error!("{}", err);
        self.stats.row_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_row("failed");
        summary.row_errors.push(err);
    }
}

/// Starts the writer on a blocking thread and returns the queue feeding it.
/// The writer stops once every clone of the queue has been dropped.
pub fn spawn_writer(
    conn: Connection,
    options: WriterOptions,
    stats: Arc<IngestStats>,
    queue_capacity: usize,
) -> Result<(IngestQueue, JoinHandle<()>)> {
    let writer = WriteSerializer::new(conn, options, stats)?;
    let (queue, receiver) = create_ingest_queue(queue_capacity);
    let handle = tokio::task::spawn_blocking(move || writer.run(receiver));
    Ok((queue, handle))
}
