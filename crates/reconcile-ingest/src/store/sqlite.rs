//! SQLite batch store
//!
//! Each batch becomes a single `INSERT INTO t (cols) VALUES (..), (..), ...`
//! built with [`QueryBuilder::push_values`]. Statements are persistent, so
//! the connection caches the prepared full-batch statement and reuses it for
//! every full batch; the trailing batch gets its own statement sized to its
//! length.

use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite};
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::{debug, info};

use super::{BatchStore, StoreError, SQLITE_MAX_PARAMETERS};
use crate::config::StoreConfig;
use crate::parser::Edition;

/// A record type that maps onto one SQLite table
pub trait SqliteRow: Send + Sync + 'static {
    const TABLE: &'static str;
    /// Inserted columns, in bind order
    const COLUMNS: &'static [&'static str];
    const CREATE_TABLE: &'static str;

    /// Bind one value per entry of [`Self::COLUMNS`]
    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Sqlite, &'static str>);
}

impl SqliteRow for Edition {
    const TABLE: &'static str = "ol";
    const COLUMNS: &'static [&'static str] = &["edition_id", "ocaid", "isbn_13"];
    const CREATE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS ol (
            id INTEGER NOT NULL PRIMARY KEY,
            edition_id TEXT,
            ocaid TEXT,
            isbn_13 TEXT
        )
    "#;

    fn bind_columns<'args>(&'args self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.olid.as_str())
            .push_bind(self.ocaid.as_str())
            .push_bind(self.isbn13.as_str());
    }
}

/// Grouped inserts into a single-connection SQLite pool
pub struct SqliteStore<R> {
    pool: SqlitePool,
    _row: PhantomData<fn() -> R>,
}

impl<R: SqliteRow> SqliteStore<R> {
    /// Open (creating if needed) the database and the row table
    ///
    /// The connection runs with a WAL journal and `synchronous = OFF`: a
    /// crash may lose the most recent batches but never leaves a partially
    /// written one.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Off);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!(url = %config.database_url, table = R::TABLE, "Connected to SQLite store");
        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the row table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(R::CREATE_TABLE).execute(&pool).await?;
        Ok(Self {
            pool,
            _row: PhantomData,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Rows currently in the table
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", R::TABLE))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl<R: SqliteRow> BatchStore<R> for SqliteStore<R> {
    async fn write_batch(&mut self, records: &[R]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let columns = R::COLUMNS.len();
        if records.len() * columns > SQLITE_MAX_PARAMETERS {
            return Err(StoreError::TooManyParameters {
                rows: records.len(),
                columns,
                limit: SQLITE_MAX_PARAMETERS,
            });
        }

        let mut query_builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            R::TABLE,
            R::COLUMNS.join(", ")
        ));
        query_builder.push_values(records.iter(), |mut b, record| {
            record.bind_columns(&mut b);
        });

        let result = query_builder
            .build()
            .persistent(true)
            .execute(&self.pool)
            .await?;

        debug!(rows = records.len(), table = R::TABLE, "Inserted batch");
        Ok(result.rows_affected())
    }
}
