use super::schema::STATS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{SqlType, BASE_DB_VERSION};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// How long a statement waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the stats database at `db_path`.
///
/// A fresh file is created with the latest schema. An existing file is
/// validated against the schema version it declares and migrated forward.
/// The returned connection is meant to be handed to the single writer.
pub fn open_stats_db<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let path = db_path.as_ref();

    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open stats database at {:?}", path))?;
    configure_connection(&conn)?;

    if is_empty_db(&conn)? {
        info!("Creating new stats database at {:?}", path);
        create_latest(&mut conn)?;
    } else {
        initialize_existing(&mut conn)?;
    }

    Ok(conn)
}

/// In-memory database with the latest schema, for tests and dry runs.
pub fn open_stats_db_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    create_latest(&mut conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    // WAL lets readers look at the table while the writer keeps going
    let journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if !journal_mode.eq_ignore_ascii_case("wal") {
        warn!("Stats database is using journal mode {}", journal_mode);
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// A file left behind by a start that failed before the schema was written
/// counts as new, same as a missing one.
fn is_empty_db(conn: &Connection) -> Result<bool> {
    let user_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let objects: i64 = conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))?;
    Ok(user_version == 0 && objects == 0)
}

fn create_latest(conn: &mut Connection) -> Result<()> {
    let latest = STATS_VERSIONED_SCHEMAS
        .last()
        .context("No stats schema declared")?;
    let tx = conn.transaction()?;
    latest.create(&tx)?;
    tx.commit()?;
    Ok(())
}

fn initialize_existing(conn: &mut Connection) -> Result<()> {
    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;

    if db_version < 1 {
        anyhow::bail!(
            "Stats database version {} is invalid (expected >= 1)",
            db_version
        );
    }

    let version_index = STATS_VERSIONED_SCHEMAS
        .iter()
        .position(|s| s.version == db_version as usize)
        .with_context(|| format!("Unknown stats database version {}", db_version))?;
    STATS_VERSIONED_SCHEMAS[version_index]
        .validate(conn)
        .with_context(|| {
            format!(
                "Stats database schema validation failed for version {}",
                db_version
            )
        })?;

    let current_schema_version = STATS_VERSIONED_SCHEMAS
        .last()
        .map(|s| s.version)
        .unwrap_or_default();
    if (db_version as usize) < current_schema_version {
        info!(
            "Migrating stats database from version {} to {}",
            db_version, current_schema_version
        );
        migrate_if_needed(conn, db_version as usize)?;
    }
    Ok(())
}

fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
    let tx = conn.transaction()?;
    let mut latest_from = from_version;
    for schema in STATS_VERSIONED_SCHEMAS.iter().skip(from_version) {
        if schema.version > from_version {
            info!(
                "Running stats database migration from version {} to {}",
                latest_from, schema.version
            );
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            latest_from = schema.version;
        }
    }
    tx.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
        [],
    )?;
    tx.commit()?;
    Ok(())
}

/// Lists the columns of `table` in declaration order.
///
/// Columns whose declared type is not one of ours come back as `Blob`,
/// which is what SQLite would treat them as anyway.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<(String, SqlType)>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\");", table))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            Ok((name, declared))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(|(name, declared)| {
            let sql_type = SqlType::from_declared(&declared).unwrap_or(SqlType::Blob);
            (name, sql_type)
        })
        .collect();
    Ok(columns)
}
