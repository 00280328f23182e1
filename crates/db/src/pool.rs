//! Database connection pool management.

use anyhow::Result;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use tracing::info;

/// Schema shipped with the service.
static EMBEDDED_MIGRATIONS: Migrator = sqlx::migrate!("./migrations");

/// Rewrite a driver-qualified URL (`postgresql+psycopg2://...`) into the
/// plain `postgresql://...` form the Postgres driver accepts.
pub fn normalize_database_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.contains('+') => {
            let base = scheme.split('+').next().unwrap_or(scheme);
            format!("{base}://{rest}")
        }
        _ => url.to_string(),
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Create a new database pool from a PostgreSQL connection URL.
    ///
    /// # Arguments
    /// * `database_url` - Connection string, optionally driver-qualified
    ///
    /// # Returns
    /// A new `DbPool` instance
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&normalize_database_url(database_url))
            .await?;

        info!("Connected to database");

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations up to head.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running embedded database migrations");
        EMBEDDED_MIGRATIONS
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Apply the migrations found in `dir` up to head.
    pub async fn migrate_from(&self, dir: &Path) -> Result<()> {
        info!("Running database migrations from {}", dir.display());
        let migrator = Migrator::new(dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load migrations from {}: {}", dir.display(), e))?;
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_suffix_is_stripped() {
        assert_eq!(
            normalize_database_url("postgresql+psycopg2://app:pw@db:5432/poi"),
            "postgresql://app:pw@db:5432/poi"
        );
    }

    #[test]
    fn plain_urls_are_untouched() {
        assert_eq!(
            normalize_database_url("postgres://app@localhost/poi"),
            "postgres://app@localhost/poi"
        );
        assert_eq!(normalize_database_url("not a url"), "not a url");
    }
}
