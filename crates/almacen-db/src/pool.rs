//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite, plus access to
//! the repositories and engine services built on it.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path) ← pool sizes, timeouts, conflict retry policy     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ├── db.products() / db.sales() / db.operations()   (reads)       │
//! │       │                                                                 │
//! │       └── db.stock() / db.checkout() / db.reversals() /                │
//! │           db.debts() / db.distributor()          (transactional ops)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Readers never block the single writer. Two writers that both read
//! before writing collide; the loser gets `SQLITE_BUSY` and the engine
//! retries it.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DistributionOrder;
use crate::engine::checkout::SaleProcessor;
use crate::engine::debt::DebtAccount;
use crate::engine::distributor::PaymentDistributor;
use crate::engine::retry::RetryPolicy;
use crate::engine::reversal::ReversalLedger;
use crate::engine::stock::StockLedger;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::operation::OperationRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/almacen.db")
///     .max_connections(5)
///     .max_conflict_retries(8)
///     .distribution_order(DistributionOrder::OldestFirst);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// SQLite busy handler timeout.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Retries after a write conflict before an operation gives up.
    /// Default: 5
    pub max_conflict_retries: u32,

    /// First backoff after a conflict; grows exponentially from here.
    /// Default: 20 ms
    pub conflict_backoff: Duration,

    /// Ceiling for a single conflict backoff.
    /// Default: 500 ms
    pub max_conflict_backoff: Duration,

    /// Order for spreading a lump payment over a client's debts.
    pub distribution_order: DistributionOrder,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            max_conflict_retries: 5,
            conflict_backoff: Duration::from_millis(20),
            max_conflict_backoff: Duration::from_millis(500),
            distribution_order: DistributionOrder::default(),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn conflict_backoff(mut self, backoff: Duration) -> Self {
        self.conflict_backoff = backoff;
        self
    }

    pub fn max_conflict_backoff(mut self, backoff: Duration) -> Self {
        self.max_conflict_backoff = backoff;
        self
    }

    pub fn distribution_order(mut self, order: DistributionOrder) -> Self {
        self.distribution_order = order;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// One connection only: every connection to `:memory:` is a separate
    /// database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            ..DbConfig::new(":memory:")
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_conflict_retries,
            initial_backoff: self.conflict_backoff,
            max_backoff: self.max_conflict_backoff,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository and engine access.
///
/// Cheap to clone; every clone shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    retry: RetryPolicy,
    distribution_order: DistributionOrder,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys, busy timeout
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            max_conflict_retries = config.max_conflict_retries,
            distribution_order = %config.distribution_order,
            "Database pool created"
        );

        let db = Database {
            pool,
            retry: config.retry_policy(),
            distribution_order: config.distribution_order,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Repositories
    // -------------------------------------------------------------------------

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn operations(&self) -> OperationRepository {
        OperationRepository::new(self.pool.clone())
    }

    // -------------------------------------------------------------------------
    // Engine
    // -------------------------------------------------------------------------

    /// Stock reservations, credits and purchase receiving.
    pub fn stock(&self) -> StockLedger {
        StockLedger::new(self.pool.clone(), self.retry)
    }

    /// Cart checkout.
    pub fn checkout(&self) -> SaleProcessor {
        SaleProcessor::new(self.pool.clone(), self.retry)
    }

    /// Voids, conversions to credit, remaining quantities.
    pub fn reversals(&self) -> ReversalLedger {
        ReversalLedger::new(self.pool.clone(), self.retry)
    }

    /// Payments against a single fiado sale.
    pub fn debts(&self) -> DebtAccount {
        DebtAccount::new(self.pool.clone(), self.retry)
    }

    /// Lump payments across a client's fiado sales.
    pub fn distributor(&self) -> PaymentDistributor {
        PaymentDistributor::new(self.pool.clone(), self.retry, self.distribution_order)
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
