//! # almacen-core: Pure Domain Logic for Almacén
//!
//! Stock conversion, reversal planning and fiado debt math, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Almacén Reconciliation Engine                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Request handlers (HTTP/RPC, out of workspace)         │   │
//! │  │    checkout, void, convert_to_credit, register_payment, ...     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          almacen-db (transactions, repositories, engine)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ almacen-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌──────────┐  ┌─────────┐          │   │
//! │  │   │  stock  │  │reversal │  │   debt   │  │  types  │          │   │
//! │  │   │ reserve │  │remaining│  │ payments │  │  money  │          │   │
//! │  │   │ credit  │  │  plans  │  │ allocate │  │quantity │          │   │
//! │  │   └─────────┘  └─────────┘  └──────────┘  └─────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, SaleItem, Operation, ...)
//! - [`money`] - Integer cents
//! - [`quantity`] - Integer thousandths of a measure unit
//! - [`stock`] - Package/unit/weight reservation and credit
//! - [`reversal`] - Remaining quantity, void and conversion planning
//! - [`debt`] - Fiado balances and payment allocation
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use almacen_core::stock::reserve;
//! use almacen_core::{MeasureUnit, Product, ProductKind, Quantity};
//! use chrono::Utc;
//!
//! let yerba = Product {
//!     id: "p-1".into(),
//!     name: "Yerba 1kg".into(),
//!     kind: ProductKind::Package,
//!     pesable: false,
//!     stock_units: 3,
//!     stock_packages: 2,
//!     stock_kg: Quantity::zero(),
//!     units_per_package: Some(12),
//!     version: 0,
//!     created_at: Utc::now(),
//!     updated_at: Utc::now(),
//! };
//!
//! let change = reserve(&yerba, MeasureUnit::Unit, Quantity::from_whole(10)).unwrap();
//! assert_eq!(change.packages_opened, 1);
//! assert_eq!((change.after.units, change.after.packages), (5, 1));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod debt;
pub mod error;
pub mod money;
pub mod quantity;
pub mod reversal;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use quantity::Quantity;
pub use stock::{StockChange, StockLevels};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single checkout.
pub const MAX_CART_ITEMS: usize = 100;
