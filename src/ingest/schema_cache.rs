use super::identifier::ColumnName;
use crate::stats_store::table_columns;
use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Columns known to exist on the stats table.
///
/// Only ever grows, and only after the column was physically created. Owned
/// by the writer, so it needs no locking.
#[derive(Debug, Default)]
pub struct SchemaCache {
    // Keyed by the lowercased name, SQLite column names are case-insensitive
    columns: HashMap<String, ColumnName>,
}

impl SchemaCache {
    /// Builds the cache from the live table definition.
    pub fn load(conn: &Connection, table: &str) -> Result<Self> {
        let mut cache = SchemaCache::default();
        for (name, _sql_type) in table_columns(conn, table)? {
            match ColumnName::new(name) {
                Ok(column) => {
                    cache.record(column);
                }
                // Such a column can never be produced by the sanitizer
                Err(err) => warn!("Ignoring column of table {}: {}", table, err),
            }
        }
        debug!("Loaded {} columns of table {}", cache.len(), table);
        Ok(cache)
    }

    pub fn exists(&self, name: &ColumnName) -> bool {
        self.columns.contains_key(&name.key())
    }

    /// The spelling the column was created with.
    pub fn resolve(&self, name: &ColumnName) -> Option<&ColumnName> {
        self.columns.get(&name.key())
    }

    /// Returns `false` if the column was already known.
    pub fn record(&mut self, name: ColumnName) -> bool {
        let key = name.key();
        if self.columns.contains_key(&key) {
            return false;
        }
        self.columns.insert(key, name);
        true
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.values().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names
    }
}
