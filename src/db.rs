use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;
use tracing::info;

/// Lazily connected Postgres pool.
///
/// The pool is created on first use. Concurrent first callers wait on the
/// same connection attempt; a failed attempt leaves the cell empty so the
/// next caller retries. Clones share the cell.
#[derive(Clone)]
pub struct Database {
    url: Arc<str>,
    max_connections: u32,
    pool: Arc<OnceCell<PgPool>>,
}

impl Database {
    pub fn new(url: &str, max_connections: u32) -> Self {
        Self {
            url: Arc::from(url),
            max_connections,
            pool: Arc::new(OnceCell::new()),
        }
    }

    pub async fn pool(&self) -> Result<&PgPool, sqlx::Error> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .connect(&self.url)
                    .await?;
                info!(max_connections = self.max_connections, "database pool connected");
                Ok(pool)
            })
            .await
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        let pool = self.pool().await.context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.pool.initialized()
    }
}
