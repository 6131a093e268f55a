//! Persistence for ingested stats: schema declaration and database setup.

mod schema;
mod store;

pub use schema::{
    PCID_COLUMN, RAW_JSON_TABLE, STATS_TABLE, STATS_VERSIONED_SCHEMAS, UPDATED_COLUMN,
};
pub use store::{open_stats_db, open_stats_db_in_memory, table_columns};
