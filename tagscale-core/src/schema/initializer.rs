//! One-time, idempotent schema bootstrap

use super::{CREATE_STATEMENTS, METRIC_TABLE, TAG_TABLE, TIMESCALE_EXTENSION, TIME_SERIES_TABLE};
use crate::Result;
use sqlx::PgPool;
use tracing::{error, info};

/// What [`DatabaseInitializer::initialize_if_needed`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// TimescaleDB is not installed; nothing was touched
    ExtensionMissing,
    /// All tables were already present
    AlreadyInitialized,
    /// Missing tables were created
    Created,
}

/// Checks for and creates the adapter's tables
pub struct DatabaseInitializer<'a> {
    pool: &'a PgPool,
}

impl<'a> DatabaseInitializer<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables unless they exist. A missing extension is logged
    /// and reported, not treated as an error.
    pub async fn initialize_if_needed(&self) -> Result<InitOutcome> {
        if !self.is_extension_installed().await? {
            error!(
                "It looks like the {} extension is not installed. Please install it first. Aborting.",
                TIMESCALE_EXTENSION
            );
            return Ok(InitOutcome::ExtensionMissing);
        }

        if self.tables_exist().await? {
            info!("Timescale tables exist. We are good to go.");
            return Ok(InitOutcome::AlreadyInitialized);
        }

        info!("Timescale tables are missing. Will create them now.");
        self.create_tables().await?;
        info!("Timescale tables created.");
        Ok(InitOutcome::Created)
    }

    pub async fn is_extension_installed(&self) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM pg_extension WHERE extname = $1")
            .bind(TIMESCALE_EXTENSION)
            .fetch_one(self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn tables_exist(&self) -> Result<bool> {
        for table in [TIME_SERIES_TABLE, METRIC_TABLE, TAG_TABLE] {
            if !self.table_exists(table).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run every DDL statement on one connection
    pub async fn create_tables(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        for stmt in CREATE_STATEMENTS {
            info!("{}", stmt);
            sqlx::raw_sql(stmt).execute(&mut *conn).await?;
        }
        Ok(())
    }
}
