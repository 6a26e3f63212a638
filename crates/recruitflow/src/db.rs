use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;

use crate::error::HiringError;
use crate::outbox::UnitOfWork;

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub async fn make_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let max_connections = std::env::var("RECRUITFLOW_DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(8)
        .clamp(1, 64);

    let acquire_timeout_secs = std::env::var("RECRUITFLOW_DB_ACQUIRE_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10)
        .clamp(1, 60);

    let disable_jit = env_bool("RECRUITFLOW_DISABLE_JIT", true);

    let mut opts = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs));

    opts = opts.after_connect(move |conn, _meta| {
        Box::pin(async move {
            // every guard relies on row locks, never on a stricter default isolation
            sqlx::query("SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL READ COMMITTED")
                .execute(&mut *conn)
                .await?;
            if disable_jit {
                sqlx::query("SET jit = OFF").execute(&mut *conn).await?;
            }
            Ok(())
        })
    });

    let pool = opts.connect(database_url).await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Shared handle every repository is built from: the process-wide pool plus the
/// deadline each executor operation runs under.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    op_timeout: Duration,
}

impl Store {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<UnitOfWork, HiringError> {
        UnitOfWork::begin(&self.pool).await
    }

    /// Run one operation under the configured deadline.
    ///
    /// When the deadline fires the future is dropped, which drops any open
    /// transaction. A commit may or may not have reached the server by then, so
    /// the caller gets `OutcomeUnknown`, never a plain failure.
    pub async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, HiringError>
    where
        F: Future<Output = Result<T, HiringError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::error!(op, after_ms = self.op_timeout.as_millis() as u64, "operation deadline elapsed");
                Err(HiringError::OutcomeUnknown {
                    op,
                    after: self.op_timeout,
                })
            }
        }
    }
}
