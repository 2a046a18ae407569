use anyhow::Result;
use rusqlite::{params, Connection};

/// Offset added to the schema version before it is written to
/// `PRAGMA user_version`, so that a database created by an unrelated tool
/// (user_version 0, 1, ...) is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 77000;

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    Cascade,
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a> {
    pub name: &'static str,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
    pub foreign_key: Option<&'a ForeignKey>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!(
                "{} {}",
                column.name,
                match column.sql_type {
                    SqlType::Text => "TEXT",
                    SqlType::Integer => "INTEGER",
                    SqlType::Real => "REAL",
                }
            ));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if column.is_unique {
                create_sql.push_str(" UNIQUE");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
            if let Some(foreign_key) = column.foreign_key {
                create_sql.push_str(&format!(
                    " REFERENCES {}({}) ON DELETE {}",
                    foreign_key.foreign_table,
                    foreign_key.foreign_column,
                    match foreign_key.on_delete {
                        ForeignKeyOnChange::NoAction => "NO ACTION",
                        ForeignKeyOnChange::Restrict => "RESTRICT",
                        ForeignKeyOnChange::SetNull => "SET NULL",
                        ForeignKeyOnChange::Cascade => "CASCADE",
                    }
                ));
            }
        }

        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }
}

/// Create a brand new database at the latest schema version, or walk the
/// migration chain from the version recorded in `PRAGMA user_version`.
pub fn migrate_if_needed(conn: &mut Connection, schemas: &[VersionedSchema]) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = schemas.len() - 1;
    let latest_schema = &schemas[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        tracing::info!("Creating db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        0
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in schemas.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            tracing::info!(
                "Migrating db from version {} to {}",
                current_version,
                schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;

    let _ = conn.query_row(
        "PRAGMA wal_checkpoint(TRUNCATE)",
        [],
        |_: &rusqlite::Row| Ok(()),
    );
    Ok(())
}
