use crate::Result;
use crate::config::config;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool};

pub mod convert;
pub mod data;
pub mod lead;
pub mod store;
pub mod sync;

pub struct Db {
    pub db: SqlitePool,
}

impl Db {
    pub async fn new() -> Result<Db> {
        Db::connect(&config().DB_URL).await
    }

    pub async fn connect(db_url: &str) -> Result<Db> {
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
            log::info!("database created successfully");
        }
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;
        create_schema(&db).await?;

        Ok(Db { db })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Db {
        // one connection, so every query sees the same in-memory database
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&db).await.unwrap();
        Db { db }
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    let qry = r#"
    CREATE TABLE IF NOT EXISTS lead
    (
        lead_key        TEXT PRIMARY KEY    NOT NULL,
        name            TEXT                NOT NULL,
        price           TEXT                NOT NULL,
        status_id       TEXT                NOT NULL,
        status_name     TEXT                NOT NULL,
        status_color    TEXT                NOT NULL,
        responsible     TEXT                NOT NULL,
        created_at      TEXT                NOT NULL,
        announced       INTEGER             NOT NULL DEFAULT 0,
        created_on      DATETIME DEFAULT    (datetime('now', 'localtime')),
        updated_on      DATETIME DEFAULT    (datetime('now', 'localtime'))
    );
    CREATE TABLE IF NOT EXISTS contact
    (
        lead_key        TEXT                NOT NULL,
        position        INTEGER             NOT NULL,
        id              TEXT                NOT NULL,
        name            TEXT                NOT NULL,
        phone           TEXT,
        email           TEXT,
        PRIMARY KEY (lead_key, position)
    );
    CREATE TABLE IF NOT EXISTS log
    (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        last_checked_date   INTEGER             NOT NULL,
        row_count           INTEGER             NOT NULL,
        created_on          DATETIME DEFAULT    (datetime('now', 'localtime')),
        updated_on          DATETIME DEFAULT    (datetime('now', 'localtime'))
    );
    "#;
    sqlx::query(qry).execute(pool).await?;
    Ok(())
}
