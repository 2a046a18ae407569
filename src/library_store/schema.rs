//! SQLite schema for the song library database.
//!
//! Tracks carry a raw natural key (title + unit separator + artist) that is
//! unique per owner, so re-importing the same export file conflicts instead
//! of duplicating rows. Selections are the per-client join table.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("bpm", &SqlType::Real),
        sqlite_column!("musical_key", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Text), // 'M:SS'
        sqlite_column!("genre", &SqlType::Text),
        sqlite_column!("rating", &SqlType::Integer), // 1-5
        sqlite_column!("date_added", &SqlType::Text), // 'YYYY-MM-DD'
        sqlite_column!("external_id", &SqlType::Text),
        sqlite_column!("file_location", &SqlType::Text),
        sqlite_column!("natural_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_tracks_owner", "owner_id"),
        ("idx_tracks_owner_title", "owner_id, title"),
    ],
    unique_constraints: &[&["owner_id", "natural_key"]],
};

const SELECTIONS_TABLE: Table = Table {
    name: "selections",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("owner_id", &SqlType::Integer, non_null = true),
        sqlite_column!("client_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_selections_owner_client", "owner_id, client_id")],
    unique_constraints: &[&["owner_id", "client_id", "track_id"]],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[TRACKS_TABLE, SELECTIONS_TABLE],
    migration: None,
}];
