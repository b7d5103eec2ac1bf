//! SQLite implementation of the storage capability.

mod config;
mod dependencies;
mod issues;
mod labels;
mod schema;
mod store;
mod transaction;

pub use store::SqliteStore;
