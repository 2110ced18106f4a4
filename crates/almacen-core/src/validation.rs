//! # Validation Module
//!
//! Input validation for engine requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request handler                                              │
//! │  └── Type validation (deserialization)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Quantity shape (positive, whole for unidad/paquete)               │
//! │  ├── Prices, payment amounts, cart size                                │
//! │  └── Selection lists (non-empty, no duplicates)                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Engine (stock, remaining quantity, outstanding balance)      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite (NOT NULL, UNIQUE, CHECK, FOREIGN KEY)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use almacen_core::validation::validate_quantity;
//! use almacen_core::{MeasureUnit, Quantity};
//!
//! assert!(validate_quantity(Quantity::from_whole(3), MeasureUnit::Unit).is_ok());
//! assert!(validate_quantity(Quantity::from_thousandths(1_500), MeasureUnit::Unit).is_err());
//! assert!(validate_quantity(Quantity::from_thousandths(1_500), MeasureUnit::Kilogram).is_ok());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{CartLine, MeasureUnit, Selection};
use crate::MAX_CART_ITEMS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest free-text reason stored on an Operation.
pub const MAX_REASON_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name: non-empty, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Trims an optional void reason, mapping blank input to `None`.
pub fn normalize_reason(reason: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(Some(reason.to_string()))
}

/// Validates a client identifier and returns it trimmed.
///
/// `None` means no client was given at all; callers decide whether that
/// is an error.
pub fn normalize_client_id(client_id: Option<&str>) -> Option<String> {
    client_id
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity for its measure unit.
///
/// ## Rules
/// - Must be positive
/// - `unidad` and `paquete` must be whole
pub fn validate_quantity(qty: Quantity, unit: MeasureUnit) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if unit.requires_whole() && !qty.is_whole() {
        return Err(ValidationError::MustBeWhole {
            field: "quantity".to_string(),
            unit,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use almacen_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents: must be strictly positive.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a cart (at most `MAX_CART_ITEMS`).
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

/// Sums cart line subtotals, rejecting any line or total that does not fit
/// in `i64` cents.
///
/// ## Example
/// ```rust
/// use almacen_core::validation::cart_total;
/// use almacen_core::{CartLine, MeasureUnit, Quantity};
///
/// let cart = [
///     CartLine::new("p-1", MeasureUnit::Unit, Quantity::from_whole(2), 150),
///     CartLine::new("p-2", MeasureUnit::Kilogram, Quantity::from_thousandths(500), 1_000),
/// ];
/// assert_eq!(cart_total(&cart).unwrap().cents(), 800);
/// ```
pub fn cart_total(lines: &[CartLine]) -> ValidationResult<Money> {
    let mut total = Money::zero();

    for line in lines {
        let subtotal = line.checked_subtotal().ok_or_else(|| ValidationError::OutOfRange {
            field: "subtotal".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
        total = total.checked_add(subtotal).ok_or_else(|| ValidationError::OutOfRange {
            field: "total".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
    }

    Ok(total)
}

/// Validates a void/conversion selection list.
///
/// ## Rules
/// - At least one selection
/// - Each sale item appears once
/// - Each quantity is positive
///
/// Whole-number checks need the item's unit and happen once the item is
/// loaded.
pub fn validate_selections(selections: &[Selection]) -> ValidationResult<()> {
    if selections.is_empty() {
        return Err(ValidationError::Required {
            field: "selections".to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(selections.len());
    for selection in selections {
        if !seen.insert(selection.sale_item_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "sale_item_id".to_string(),
                value: selection.sale_item_id.clone(),
            });
        }

        if !selection.quantity.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
