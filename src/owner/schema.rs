//! SQLite schema for the owner accounts database, kept separate from the
//! song library so account data can be backed up on its own cadence.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const OWNERS_TABLE: Table = Table {
    name: "owners",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("username", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("password_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const TOKENS_TABLE: Table = Table {
    name: "tokens",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "owners",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_tokens_owner", "owner_id")],
    unique_constraints: &[],
};

pub const OWNER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[OWNERS_TABLE, TOKENS_TABLE],
    migration: None,
}];
