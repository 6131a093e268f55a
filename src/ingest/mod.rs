//! Schema-on-write ingestion of stats payloads.
//!
//! HTTP handlers push raw bodies onto a bounded [`IngestQueue`]. A single
//! [`WriteSerializer`] drains it, growing the stats table with a column for
//! every field name it has not seen before and inserting one row per report.

mod identifier;
mod payload;
mod queue;
mod row_inserter;
mod schema_cache;
mod table_mutator;
mod type_inference;
mod writer;

pub use identifier::{sanitize, ColumnName, IdentifierError};
pub use payload::{stringify, Payload, ReportRow, ARRAY_SEPARATOR};
pub use queue::{create_ingest_queue, IngestQueue, IngestResult, WriteRequest};
pub use row_inserter::RowInserter;
pub use schema_cache::SchemaCache;
pub use table_mutator::TableMutator;
pub use type_inference::TypeInferrer;
pub use writer::{
    spawn_writer, IngestStats, IngestStatsSnapshot, IngestSummary, WriteSerializer, WriterOptions,
    WriterState,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Report {0} is not a JSON object")]
    ReportNotObject(String),

    #[error("Could not infer type of column {column}: {source}")]
    TypeProbe {
        column: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Could not add column {column}: {source}")]
    AddColumn {
        column: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Could not insert report {report_id}: {source}")]
    Insert {
        report_id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Could not store raw report {report_id}: {source}")]
    RawInsert {
        report_id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Ingest queue is full")]
    QueueFull,

    #[error("Ingest writer is not running")]
    WriterStopped,
}
