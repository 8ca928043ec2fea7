use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Database schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sport (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS country (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS league (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sport_id INTEGER NOT NULL REFERENCES sport(id),
            country_id INTEGER NOT NULL REFERENCES country(id),
            name TEXT NOT NULL,
            relative_url TEXT NOT NULL,
            UNIQUE (sport_id, country_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES league(id),
            web_key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            local_team TEXT NOT NULL,
            visitor_team TEXT,
            url TEXT NOT NULL,
            is_live BOOLEAN NOT NULL,
            begin_time TEXT,
            last_written TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookmaker (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Simple markets store an empty row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS odd_cat (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bookmaker_id INTEGER NOT NULL REFERENCES bookmaker(id),
            tab TEXT NOT NULL,
            subtab TEXT NOT NULL,
            row_label TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL,
            UNIQUE (bookmaker_id, tab, subtab, row_label, outcome)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // observed_at is NULL when the source time could not be parsed
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS odd (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL REFERENCES matches(id),
            cat_id INTEGER NOT NULL REFERENCES odd_cat(id),
            observed_at TEXT,
            observed_text TEXT NOT NULL,
            value REAL NOT NULL,
            UNIQUE (match_id, cat_id, observed_text)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_odd_match ON odd(match_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_league ON matches(league_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    if current.is_none() {
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(SCHEMA_VERSION)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Read the stored schema version
pub async fn get_schema_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}
