use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection};

pub const DEFAULT_TIMESTAMP: &str = "(datetime('now'))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed (e.g. `non_null = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

/// Storage classes a column can be declared with.
///
/// `Blob` doubles as the "none" affinity: a column first seen with a NULL value
/// is declared BLOB so SQLite stores whatever comes later without coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    /// Parses a declared column type as reported by `PRAGMA table_info`.
    pub fn from_declared(declared: &str) -> Option<SqlType> {
        match declared.to_ascii_uppercase().as_str() {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            "BLOB" | "" => Some(SqlType::Blob),
            _ => None,
        }
    }

    /// Maps the result of SQLite's `typeof()` to a column type.
    pub fn from_typeof(storage_class: &str) -> SqlType {
        match storage_class {
            "integer" => SqlType::Integer,
            "real" => SqlType::Real,
            "text" => SqlType::Text,
            _ => SqlType::Blob,
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    /// Columns may be appended at runtime. Validation only checks the
    /// declared columns, which must come first.
    pub extensible: bool,
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE \"{}\" (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!(
                "\"{}\" {}",
                column.name,
                column.sql_type.as_sql()
            ));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON \"{}\"({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\");", self.name))?;
        let actual_columns: Vec<Result<Column<'_, String>, rusqlite::Error>> = stmt
            .query_map(params![], |row| {
                let name = row.get::<usize, String>(1)?;
                let sql_type = match row.get::<_, String>(2)?.as_str() {
                    "TEXT" => &SqlType::Text,
                    "INTEGER" => &SqlType::Integer,
                    "REAL" => &SqlType::Real,
                    "BLOB" => &SqlType::Blob,
                    _ => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            2,
                            "".to_string(),
                            Type::Text,
                        ))
                    }
                };

                Ok(Column {
                    name,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect();

        if actual_columns.is_empty() {
            bail!("Table {} does not exist", self.name);
        }

        let column_count_ok = if self.extensible {
            actual_columns.len() >= self.columns.len()
        } else {
            actual_columns.len() == self.columns.len()
        };
        if !column_count_ok {
            bail!(
                "Table {} has {} columns, expected {}{}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                if self.extensible { "at least " } else { "" },
                self.columns.len(),
                actual_columns
                    .iter()
                    .filter_map(|c| c.as_ref().ok().map(|column| column.name.clone()))
                    .collect::<Vec<String>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual_column_result, expected_column) in
            actual_columns.iter().zip(self.columns.iter())
        {
            let actual_column = match actual_column_result {
                Ok(column) => column,
                Err(e) => bail!("Error reading column: {:?}", e),
            };
            if actual_column.name != expected_column.name {
                bail!(
                    "Table {} Column name mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    actual_column.name
                );
            }
            if actual_column.sql_type != expected_column.sql_type {
                bail!(
                    "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected_column.name,
                    expected_column.sql_type,
                    actual_column.sql_type
                );
            }
            if actual_column.non_null != expected_column.non_null {
                bail!(
                    "Table {} Column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    expected_column.non_null,
                    actual_column.non_null
                );
            }

            // Default values might be wrapped in parentheses, so we strip them before comparing
            if actual_column
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected_column
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} Column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected_column.name,
                    expected_column.default_value,
                    actual_column.default_value
                );
            }
            if actual_column.is_primary_key != expected_column.is_primary_key {
                bail!(
                    "Table {} Column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected_column.name,
                    expected_column.is_primary_key,
                    actual_column.is_primary_key
                );
            }
        }

        for (index_name, _columns) in self.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);

            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

pub const BASE_DB_VERSION: usize = 99999;
