use super::identifier::ColumnName;
use crate::stats_store::{PCID_COLUMN, RAW_JSON_TABLE};
use rusqlite::{params, params_from_iter, Connection};

/// Writes report rows into the stats table.
///
/// Each insert names only the columns the row carries; everything else is
/// left to its default (NULL for discovered columns). Values are always bound.
pub struct RowInserter {
    table: &'static str,
}

impl RowInserter {
    pub fn new(table: &'static str) -> Self {
        Self { table }
    }

    fn insert_sql(&self, fields: &[(ColumnName, Option<String>)]) -> String {
        let mut columns = Vec::with_capacity(fields.len() + 1);
        let mut placeholders = Vec::with_capacity(fields.len() + 1);
        columns.push(format!("\"{}\"", PCID_COLUMN));
        placeholders.push("?1".to_string());
        for (index, (name, _)) in fields.iter().enumerate() {
            columns.push(name.quoted());
            placeholders.push(format!("?{}", index + 2));
        }
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// Returns the number of rows written, which is always 1 on success.
    pub fn insert(
        &self,
        conn: &Connection,
        connection_id: &str,
        fields: &[(ColumnName, Option<String>)],
    ) -> rusqlite::Result<usize> {
        let sql = self.insert_sql(fields);
        let mut stmt = conn.prepare_cached(&sql)?;
        let values = std::iter::once(Some(connection_id))
            .chain(fields.iter().map(|(_, value)| value.as_deref()));
        stmt.execute(params_from_iter(values))
    }

    /// Keeps the report verbatim in the raw JSON table.
    pub fn insert_raw(
        &self,
        conn: &Connection,
        connection_id: &str,
        report_id: &str,
        json: &str,
    ) -> rusqlite::Result<usize> {
        conn.prepare_cached(&format!(
            "INSERT INTO \"{}\" (pcid, report_id, json) VALUES (?1, ?2, ?3)",
            RAW_JSON_TABLE
        ))?
        .execute(params![connection_id, report_id, json])
    }
}
