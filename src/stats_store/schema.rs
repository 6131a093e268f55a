//! SQLite schema definitions for the stats database.
//!
//! Only the fixed part of the schema lives here. The wide `getstats` table
//! gains one column per distinct field name at runtime, see `crate::ingest`.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

pub const STATS_TABLE: &str = "getstats";
pub const RAW_JSON_TABLE: &str = "getstats_json";

pub const PCID_COLUMN: &str = "pcid";
pub const UPDATED_COLUMN: &str = "updated";

// =============================================================================
// Version 1 - Wide stats table
// =============================================================================

/// One row per report. Discovered columns are appended after the fixed ones.
const STATS_TABLE_V1: Table = Table {
    name: STATS_TABLE,
    columns: &[
        sqlite_column!(PCID_COLUMN, &SqlType::Text, non_null = true),
        sqlite_column!(
            UPDATED_COLUMN,
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("getstats_updated_idx", UPDATED_COLUMN)],
    extensible: true,
};

// =============================================================================
// Version 2 - Raw report retention
// =============================================================================

/// Raw JSON of every report, kept verbatim when raw retention is enabled.
const RAW_JSON_TABLE_V2: Table = Table {
    name: RAW_JSON_TABLE,
    columns: &[
        sqlite_column!("pcid", &SqlType::Text, non_null = true),
        sqlite_column!("report_id", &SqlType::Text, non_null = true),
        sqlite_column!("json", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("getstats_json_updated_idx", "updated")],
    extensible: false,
};

/// Migration from version 1 to version 2: add the raw JSON table
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    RAW_JSON_TABLE_V2.create(conn)
}

pub const STATS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[STATS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[STATS_TABLE_V1, RAW_JSON_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
