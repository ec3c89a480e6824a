//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, maintained as simple functions (rather than stateful structs)
//! that accept a `&mut SqliteConnection`. Callers can obtain a connection from a pool, or open a
//! transaction as the need arises and call through with `&mut *tx` without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod chats;
pub mod orders;
pub mod riders;
pub mod users;

const SQLITE_DB_URL: &str = "sqlite://data/pronto_store.db";

pub fn db_url() -> String {
    let result = env::var("PRONTO_DATABASE_URL").unwrap_or_else(|_| {
        info!("PRONTO_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
