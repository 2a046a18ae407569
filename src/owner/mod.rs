mod auth;
mod manager;
mod schema;
mod store;

pub use auth::{hash_password, verify_password, TokenValue};
pub use manager::OwnerManager;
pub use schema::OWNER_VERSIONED_SCHEMAS;
pub use store::{Owner, OwnerStore, SqliteOwnerStore};
