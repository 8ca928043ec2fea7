pub mod schema;

use crate::domain::{MatchObservationSet, OddKey};
use crate::infrastructure::persistence::{Store, StoreError};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, info};

pub use schema::{get_schema_version, initialize_schema, SCHEMA_VERSION};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    SchemaError(#[from] schema::SchemaError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// SQLite-backed observation store
///
/// Owns a private single-threaded runtime and must be driven from a plain
/// thread (the persistence writer), never from async code.
pub struct SqliteStore {
    runtime: Runtime,
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and initialize the schema
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening database: {}", path);
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true);
        Self::connect(options)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?)
    }

    fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // One connection: writes are serialized anyway and an in-memory
        // database lives only as long as its connection
        let pool = runtime.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        })?;
        runtime.block_on(schema::initialize_schema(&pool))?;

        info!("Database initialized successfully");
        Ok(Self { runtime, pool })
    }

    /// Write one observation set in a single transaction
    pub fn write_observations(&self, set: &MatchObservationSet) -> Result<()> {
        self.runtime.block_on(self.write_async(set))
    }

    async fn write_async(&self, set: &MatchObservationSet) -> Result<()> {
        let fixture = &set.fixture;
        let league = &fixture.league;
        let mut tx = self.pool.begin().await?;

        let sport_id = upsert_named(&mut tx, "sport", &league.sport.name).await?;
        let country_id = upsert_named(&mut tx, "country", &league.country.name).await?;

        sqlx::query(
            r#"
            INSERT INTO league (sport_id, country_id, name, relative_url)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (sport_id, country_id, name) DO UPDATE SET
                relative_url = excluded.relative_url
            "#,
        )
        .bind(sport_id)
        .bind(country_id)
        .bind(&league.name)
        .bind(&league.relative_url)
        .execute(&mut *tx)
        .await?;
        let league_id: i64 = sqlx::query_scalar(
            "SELECT id FROM league WHERE sport_id = ? AND country_id = ? AND name = ?",
        )
        .bind(sport_id)
        .bind(country_id)
        .bind(&league.name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO matches (
                league_id, web_key, name, local_team, visitor_team, url, is_live, begin_time, last_written
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (web_key) DO UPDATE SET
                league_id = excluded.league_id,
                name = excluded.name,
                local_team = excluded.local_team,
                visitor_team = excluded.visitor_team,
                url = excluded.url,
                is_live = excluded.is_live,
                begin_time = COALESCE(excluded.begin_time, matches.begin_time),
                last_written = excluded.last_written
            "#,
        )
        .bind(league_id)
        .bind(&fixture.web_key)
        .bind(&fixture.name)
        .bind(fixture.local_team())
        .bind(fixture.visitor_team())
        .bind(&fixture.url)
        .bind(fixture.is_live)
        .bind(set.event_start.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let match_id: i64 = sqlx::query_scalar("SELECT id FROM matches WHERE web_key = ?")
            .bind(&fixture.web_key)
            .fetch_one(&mut *tx)
            .await?;

        let mut written = 0usize;
        for (key, series) in set.odds() {
            let cat_id = upsert_category(&mut tx, key).await?;
            for (at, value) in series {
                sqlx::query(
                    r#"
                    INSERT INTO odd (match_id, cat_id, observed_at, observed_text, value)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (match_id, cat_id, observed_text) DO UPDATE SET
                        value = excluded.value
                    "#,
                )
                .bind(match_id)
                .bind(cat_id)
                .bind(at.timestamp().map(|t| t.to_rfc3339()))
                .bind(at.as_text())
                .bind(*value)
                .execute(&mut *tx)
                .await?;
                written += 1;
            }
        }

        tx.commit().await?;
        debug!(web_key = %fixture.web_key, "Stored {} observations", written);
        Ok(())
    }

    /// Total stored observations
    pub fn odd_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM odd")
    }

    /// Total stored matches
    pub fn match_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM matches")
    }

    /// Stored price for one observation of a match, by observation text
    pub fn price_of(&self, web_key: &str, key: &OddKey, observed_text: &str) -> Result<Option<f64>> {
        self.runtime.block_on(async {
            let price: Option<f64> = sqlx::query_scalar(
                r#"
                SELECT o.value FROM odd o
                JOIN matches m ON m.id = o.match_id
                JOIN odd_cat c ON c.id = o.cat_id
                JOIN bookmaker b ON b.id = c.bookmaker_id
                WHERE m.web_key = ? AND b.name = ? AND c.tab = ? AND c.subtab = ?
                  AND c.row_label = ? AND c.outcome = ? AND o.observed_text = ?
                "#,
            )
            .bind(web_key)
            .bind(&key.bookmaker)
            .bind(&key.section.tab)
            .bind(&key.section.subtab)
            .bind(key.row.as_deref().unwrap_or(""))
            .bind(&key.outcome)
            .bind(observed_text)
            .fetch_optional(&self.pool)
            .await?;
            Ok(price)
        })
    }

    fn count(&self, sql: &str) -> Result<i64> {
        self.runtime.block_on(async {
            let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
            Ok(count)
        })
    }
}

impl Store<MatchObservationSet> for SqliteStore {
    fn write(&mut self, record: &MatchObservationSet) -> std::result::Result<(), StoreError> {
        self.write_observations(record).map_err(StoreError::from)
    }

    fn close(&mut self) -> std::result::Result<(), StoreError> {
        self.runtime.block_on(self.pool.close());
        info!("Database closed");
        Ok(())
    }
}

async fn upsert_named(tx: &mut Transaction<'_, Sqlite>, table: &str, name: &str) -> Result<i64> {
    sqlx::query(&format!(
        "INSERT INTO {} (name) VALUES (?) ON CONFLICT (name) DO NOTHING",
        table
    ))
    .bind(name)
    .execute(&mut **tx)
    .await?;

    let id: i64 = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE name = ?", table))
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

async fn upsert_category(tx: &mut Transaction<'_, Sqlite>, key: &OddKey) -> Result<i64> {
    let bookmaker_id = upsert_named(tx, "bookmaker", &key.bookmaker).await?;
    let row = key.row.as_deref().unwrap_or("");

    sqlx::query(
        r#"
        INSERT INTO odd_cat (bookmaker_id, tab, subtab, row_label, outcome)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (bookmaker_id, tab, subtab, row_label, outcome) DO NOTHING
        "#,
    )
    .bind(bookmaker_id)
    .bind(&key.section.tab)
    .bind(&key.section.subtab)
    .bind(row)
    .bind(&key.outcome)
    .execute(&mut **tx)
    .await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        SELECT id FROM odd_cat
        WHERE bookmaker_id = ? AND tab = ? AND subtab = ? AND row_label = ? AND outcome = ?
        "#,
    )
    .bind(bookmaker_id)
    .bind(&key.section.tab)
    .bind(&key.section.subtab)
    .bind(row)
    .bind(&key.outcome)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}
