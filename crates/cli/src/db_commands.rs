use std::str::FromStr;

use {
    anyhow::Context,
    clap::Subcommand,
    mqtg_config::MqtgConfig,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
};

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
    /// Delete all users, subscriptions and history but keep the schema.
    Clear,
}

pub async fn handle_db(action: &DbAction, config: &MqtgConfig) -> anyhow::Result<()> {
    match action {
        DbAction::Migrate => {
            open_pool(&config.database.url).await?;
            println!("Migrations applied to {}", config.database.url);
            Ok(())
        },
        DbAction::Clear => clear_database(&config.database.url).await,
    }
}

/// Connect to the database, creating the file if needed, and bring its
/// schema up to date.
pub async fn open_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to SQLite")?;
    mqtg_store::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    Ok(pool)
}

async fn clear_database(database_url: &str) -> anyhow::Result<()> {
    let pool = open_pool(database_url).await?;

    // Children first.
    for table in ["history", "subscriptions", "users"] {
        let result = sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&pool)
            .await?;
        println!("  {table}: {} row(s) deleted", result.rows_affected());
    }
    pool.close().await;
    println!("Database cleared.");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("mqtg.db").display());

        let pool = open_pool(&url).await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"users"));
        assert!(names.contains(&"subscriptions"));
        assert!(names.contains(&"history"));
    }

    #[tokio::test]
    async fn clear_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("mqtg.db").display());
        let pool = open_pool(&url).await.unwrap();
        sqlx::query("INSERT INTO users (chat_id, created_at) VALUES (1, 0)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        clear_database(&url).await.unwrap();

        let pool = open_pool(&url).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
