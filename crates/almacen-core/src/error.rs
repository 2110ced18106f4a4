//! # Error Types
//!
//! Domain-specific error types for almacen-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  almacen-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  almacen-db errors (separate crate)                                    │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - CoreError | DbError | RetriesExhausted         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → request handler     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Domain errors are recoverable: the caller fixes the request and tries
//! again. Nothing in this file is ever retried automatically.

use thiserror::Error;

use crate::types::MeasureUnit;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough stock in any form to cover a reservation.
    ///
    /// ## When This Occurs
    /// ```text
    /// Sell 30 unidades of a package product
    ///      │
    ///      ▼
    /// stock_units = 5, stock_packages = 1, units_per_package = 20
    ///      │
    ///      ▼
    /// deficit 25 needs 2 packages, only 1 on hand
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Yerba 500g", unit: unidad, available: 25, requested: 30 }
    /// ```
    #[error("Insufficient stock for {product}: available {available} {unit}, requested {requested}")]
    InsufficientStock {
        product: String,
        unit: MeasureUnit,
        /// Rendered quantity (whole or `x.yyy` kg).
        available: String,
        requested: String,
    },

    /// A void or conversion asked for more than is left on a sale item.
    #[error("Sale item {sale_item_id}: requested {requested}, only {remaining} remaining")]
    ExceedsAvailableQuantity {
        sale_item_id: String,
        remaining: String,
        requested: String,
    },

    /// A void or conversion against an open fiado would reverse more value
    /// than the client still owes.
    #[error("Sale {sale_id}: selection worth {requested_cents} exceeds outstanding {outstanding_cents}")]
    ExceedsOutstandingBalance {
        sale_id: String,
        outstanding_cents: i64,
        requested_cents: i64,
    },

    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Fiado sales and conversions need a client to owe the money.
    #[error("A client is required for fiado")]
    MissingClient,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Sale item {sale_item_id} does not belong to sale {sale_id}")]
    SaleItemNotFound {
        sale_id: String,
        sale_item_id: String,
    },

    /// The product cannot be sold or credited in this measure unit.
    #[error("Product {product} cannot be handled in {unit}")]
    UnsupportedUnit { product: String, unit: MeasureUnit },

    /// Product data is inconsistent (e.g. a package product without
    /// `units_per_package`).
    #[error("Product {product} is misconfigured: {reason}")]
    InvalidProduct { product: String, reason: String },

    #[error("Cart is empty")]
    EmptyCart,

    /// Payments only apply to open fiado sales.
    #[error("Sale {0} has no outstanding fiado balance")]
    SaleNotOutstanding(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any stock or ledger arithmetic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// `unidad` and `paquete` quantities are counts.
    #[error("{field} must be a whole number of {unit}")]
    MustBeWhole { field: String, unit: MeasureUnit },

    /// The same sale item was selected twice in one request.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
