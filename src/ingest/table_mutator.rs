use super::identifier::ColumnName;
use crate::sqlite_persistence::SqlType;
use rusqlite::Connection;
use tracing::info;

/// Appends discovered columns to the stats table.
///
/// Re-adding an existing column is an error from SQLite; callers check the
/// schema cache first.
pub struct TableMutator {
    table: &'static str,
}

impl TableMutator {
    pub fn new(table: &'static str) -> Self {
        Self { table }
    }

    pub fn add_column(
        &self,
        conn: &Connection,
        name: &ColumnName,
        sql_type: SqlType,
    ) -> rusqlite::Result<()> {
        let sql = format!(
            "ALTER TABLE \"{}\" ADD COLUMN {} {}",
            self.table,
            name.quoted(),
            sql_type.as_sql()
        );
        conn.execute(&sql, [])?;
        info!("Added column {} {} to table {}", name, sql_type, self.table);
        Ok(())
    }
}
