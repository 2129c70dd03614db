use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use toneout_common::error::Result;
use toneout_common::DispatchError;

/// Postgres store for the call/unit/alert aggregates.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PgDispatchStore {
    pool: PgPool,
}

impl PgDispatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and return a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DispatchError::Database(e.into()))?;
        Ok(())
    }

    /// Liveness check for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// The shared pool, for wiring sibling stores over one set of
    /// connections.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
