//! # Stock Arithmetic
//!
//! Pure package/unit/weight conversion for the stock ledger.
//!
//! ## Selling Loose Units of a Package Product
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  units_per_package = 20, stock: 5 loose + 3 packages, sell 30 unidad   │
//! │                                                                         │
//! │   30 > 5 loose        → deficit = 25                                    │
//! │   ceil(25 / 20) = 2   → open 2 packages                                 │
//! │   2 ≤ 3 packages      → ok                                              │
//! │                                                                         │
//! │   loose    = 5 + 2×20 − 30 = 15                                         │
//! │   packages = 3 − 2         = 1                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credits go back in the unit they were sold in. Loose units are never
//! recombined into packages.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;
use crate::types::{MeasureUnit, Product, ProductKind};
use crate::validation::validate_quantity;

/// The three stock counters of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLevels {
    pub units: i64,
    pub packages: i64,
    pub kg: Quantity,
}

impl StockLevels {
    pub fn of(product: &Product) -> Self {
        StockLevels {
            units: product.stock_units,
            packages: product.stock_packages,
            kg: product.stock_kg,
        }
    }

    pub fn is_non_negative(&self) -> bool {
        self.units >= 0 && self.packages >= 0 && !self.kg.is_negative()
    }
}

/// Result of a reservation or credit against one product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    pub product_id: String,
    pub unit: MeasureUnit,
    pub quantity: Quantity,
    pub before: StockLevels,
    pub after: StockLevels,
    /// Packages broken open to cover a loose-unit sale.
    pub packages_opened: i64,
}

/// Takes `qty` of `unit` out of `product`'s stock.
///
/// Fails with `InsufficientStock` without changing anything when stock in
/// every usable form cannot cover the request.
pub fn reserve(product: &Product, unit: MeasureUnit, qty: Quantity) -> CoreResult<StockChange> {
    check_unit(product, unit)?;
    validate_quantity(qty, unit)?;

    let before = StockLevels::of(product);
    let mut after = before;
    let mut packages_opened = 0;

    match unit {
        MeasureUnit::Kilogram => {
            if qty > before.kg {
                return Err(insufficient(product, unit, before.kg, qty));
            }
            after.kg -= qty;
        }
        MeasureUnit::Package => {
            let wanted = whole(qty);
            if wanted > before.packages {
                return Err(insufficient(
                    product,
                    unit,
                    Quantity::from_whole(before.packages),
                    qty,
                ));
            }
            after.packages -= wanted;
        }
        MeasureUnit::Unit => {
            let wanted = whole(qty);
            if wanted <= before.units {
                after.units -= wanted;
            } else if product.kind == ProductKind::Package {
                let per_package = units_per_package(product)?;
                let deficit = wanted - before.units;
                let open = (deficit + per_package - 1) / per_package;

                if open > before.packages {
                    let available = before.units.max(0) + before.packages.max(0) * per_package;
                    return Err(insufficient(
                        product,
                        unit,
                        Quantity::from_whole(available),
                        qty,
                    ));
                }

                after.units = before.units + open * per_package - wanted;
                after.packages -= open;
                packages_opened = open;
            } else {
                return Err(insufficient(
                    product,
                    unit,
                    Quantity::from_whole(before.units),
                    qty,
                ));
            }
        }
    }

    Ok(StockChange {
        product_id: product.id.clone(),
        unit,
        quantity: qty,
        before,
        after,
        packages_opened,
    })
}

/// Puts `qty` of `unit` back into `product`'s stock.
///
/// A stored negative counter is treated as zero before crediting.
pub fn credit(product: &Product, unit: MeasureUnit, qty: Quantity) -> CoreResult<StockChange> {
    check_unit(product, unit)?;
    validate_quantity(qty, unit)?;

    let before = StockLevels::of(product);
    let mut after = before;

    match unit {
        MeasureUnit::Kilogram => after.kg = before.kg.clamp_non_negative() + qty,
        MeasureUnit::Package => after.packages = before.packages.max(0) + whole(qty),
        MeasureUnit::Unit => after.units = before.units.max(0) + whole(qty),
    }

    Ok(StockChange {
        product_id: product.id.clone(),
        unit,
        quantity: qty,
        before,
        after,
        packages_opened: 0,
    })
}

fn check_unit(product: &Product, unit: MeasureUnit) -> CoreResult<()> {
    if product.accepts(unit) {
        Ok(())
    } else {
        Err(CoreError::UnsupportedUnit {
            product: product.name.clone(),
            unit,
        })
    }
}

fn units_per_package(product: &Product) -> CoreResult<i64> {
    match product.units_per_package {
        Some(n) if n > 0 => Ok(n),
        _ => Err(CoreError::InvalidProduct {
            product: product.name.clone(),
            reason: "units_per_package must be positive".to_string(),
        }),
    }
}

// Callers validate whole-ness first.
fn whole(qty: Quantity) -> i64 {
    qty.whole().unwrap_or(0)
}

fn insufficient(
    product: &Product,
    unit: MeasureUnit,
    available: Quantity,
    requested: Quantity,
) -> CoreError {
    CoreError::InsufficientStock {
        product: product.name.clone(),
        unit,
        available: available.to_string(),
        requested: requested.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
