//! # almacen-db: Persistence and Engine for Almacén
//!
//! SQLite storage for products, sales and the Operation ledger, plus the
//! transactional services that keep stock, sales and debts reconciled.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Almacén Data Flow                                │
//! │                                                                         │
//! │  Request handler (checkout, void, abono, ...)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   almacen-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Engine     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (engine/*.rs) │───►│ product.rs    │    │  (embedded)  │  │   │
//! │  │   │               │    │ sale.rs       │    │              │  │   │
//! │  │   │ retry on      │    │ operation.rs  │    │ 001_init.sql │  │   │
//! │  │   │ conflict      │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            │                                                    │   │
//! │  │            ▼                                                    │   │
//! │  │   almacen-core (stock math, reversal plans, debt math)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - TOML configuration with environment overrides
//! - [`pool`] - Connection pool and service accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database, engine and config error types
//! - [`repository`] - SQL for products, sales and operations
//! - [`engine`] - Checkout, reversals, payments
//!
//! ## Usage
//!
//! ```rust,ignore
//! use almacen_db::{Database, DbConfig};
//! use almacen_core::{CartLine, MeasureUnit, PaymentIntent, Quantity, Selection};
//!
//! let db = Database::new(DbConfig::new("almacen.db")).await?;
//!
//! let cart = [CartLine::new(product_id, MeasureUnit::Unit, Quantity::from_whole(10), 150)];
//! let receipt = db.checkout().checkout(&cart, &PaymentIntent::cash()).await?;
//!
//! let item = &receipt.items[0];
//! db.reversals()
//!     .void(&receipt.sale.id, &[Selection::new(&item.id, Quantity::from_whole(2))], None)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AlmacenConfig, DistributionOrder};
pub use error::{ConfigError, DbError, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};

pub use engine::checkout::{CheckoutReceipt, SaleProcessor};
pub use engine::debt::{ClientBalance, DebtAccount, PaymentReceipt};
pub use engine::distributor::{DistributionReceipt, PaymentDistributor};
pub use engine::retry::RetryPolicy;
pub use engine::reversal::{ConversionReceipt, ItemBalance, ReversalLedger, SaleLedger, VoidReceipt};
pub use engine::stock::StockLedger;

pub use repository::operation::OperationRepository;
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::sale::SaleRepository;
