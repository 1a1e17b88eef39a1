//! SQLite persistence for users, subscriptions and message history.
//!
//! The bridge consumes storage through the [`UserStore`],
//! [`SubscriptionStore`] and [`HistoryStore`] traits; [`SqliteStore`]
//! implements all three over one pool.

pub mod error;
pub mod retention;
pub mod sqlite;
pub mod store;
pub mod types;

pub use {
    error::{Error, Result},
    retention::enforce_retention,
    sqlite::SqliteStore,
    store::{BridgeStore, HistoryStore, SubscriptionStore, UserStore},
    types::{DataType, HistoryRecord, NewSubscription, SubscriptionRecord, SubscriptionType, UserRecord},
};

/// Run database migrations.
///
/// Creates the `users`, `subscriptions` and `history` tables. Must run
/// before a [`SqliteStore`] is used.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
