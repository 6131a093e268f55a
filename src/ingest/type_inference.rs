use crate::sqlite_persistence::SqlType;
use rusqlite::{params, Connection};

const CREATE_PROBE_TABLE: &str =
    "CREATE TEMP TABLE IF NOT EXISTS getstats_type_probe (v NUMERIC)";

/// Picks the column type for a field seen for the first time.
///
/// Rather than sniffing the value ourselves, the value is stored into a
/// NUMERIC column of a temporary table and SQLite tells us what it turned
/// it into. The column type therefore always agrees with how SQLite itself
/// coerces the value.
pub struct TypeInferrer {
    _private: (),
}

impl TypeInferrer {
    /// Creates the probe table on `conn`. Temporary tables are per
    /// connection, so the inferrer must be used with the same connection.
    pub fn new(conn: &Connection) -> rusqlite::Result<Self> {
        conn.execute(CREATE_PROBE_TABLE, [])?;
        Ok(Self { _private: () })
    }

    /// `value` is the stringified cell value, `None` for JSON null.
    pub fn infer(&self, conn: &Connection, value: Option<&str>) -> rusqlite::Result<SqlType> {
        conn.prepare_cached("DELETE FROM temp.getstats_type_probe")?
            .execute([])?;
        conn.prepare_cached("INSERT INTO temp.getstats_type_probe (v) VALUES (?1)")?
            .execute(params![value])?;
        let storage_class: String = conn
            .prepare_cached("SELECT typeof(v) FROM temp.getstats_type_probe")?
            .query_row([], |row| row.get(0))?;
        Ok(SqlType::from_typeof(&storage_class))
    }
}
