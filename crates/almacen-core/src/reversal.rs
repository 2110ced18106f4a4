//! # Reversal Planning
//!
//! Remaining-quantity derivation and void/conversion planning.
//!
//! ## Source of Truth
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remaining(item) = item.quantity                                        │
//! │                  − Σ lines of anulacion_completa                        │
//! │                  − Σ lines of anulacion_parcial                         │
//! │                  − Σ lines of conversion_fiado (in place)               │
//! │                                                                         │
//! │  Partial conversions carve their quantity out of item.quantity and     │
//! │  are skipped by the sum.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here caches a running total. Callers load the Operation history
//! inside the transaction that writes the next Operation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{Operation, OperationItem, OperationType, Sale, SaleItem, Selection};
use crate::validation::{validate_quantity, validate_selections};

// =============================================================================
// Remaining Quantity
// =============================================================================

/// Quantity of `item` not yet voided or converted.
///
/// Pure function of the item and its sale's Operation history.
pub fn remaining_quantity(item: &SaleItem, operations: &[Operation]) -> Quantity {
    let consumed: Quantity = operations
        .iter()
        .map(|op| op.consumed_from(&item.id))
        .sum();

    (item.quantity - consumed).clamp_non_negative()
}

/// Value already taken off `item` by prior voids and in-place conversions.
fn reversed_value(item: &SaleItem, operations: &[Operation]) -> Money {
    operations
        .iter()
        .filter(|op| op.operation_type.consumes_quantity() && op.spawned_sale_id.is_none())
        .flat_map(|op| op.items.iter())
        .filter(|line| line.sale_item_id == item.id)
        .map(|line| Money::from_cents(line.subtotal_cents))
        .sum()
}

/// Value of `item` still standing on its sale.
pub fn remaining_value(item: &SaleItem, operations: &[Operation]) -> Money {
    item.subtotal()
        .saturating_sub_to_zero(reversed_value(item, operations))
}

// =============================================================================
// Reversal Plan
// =============================================================================

/// One validated selection.
#[derive(Debug, Clone)]
pub struct PlannedLine {
    pub item: SaleItem,
    pub quantity: Quantity,
    /// Value of `quantity` at the item's frozen price.
    pub value: Money,
}

/// A validated void or conversion request, ready to be written.
#[derive(Debug, Clone)]
pub struct ReversalPlan {
    pub lines: Vec<PlannedLine>,
    pub total: Money,
    /// Every item with quantity left is selected at its full remaining
    /// quantity.
    pub covers_all: bool,
}

impl ReversalPlan {
    /// Operation item list for this plan.
    pub fn items(&self) -> Vec<OperationItem> {
        self.lines
            .iter()
            .map(|line| OperationItem {
                sale_item_id: line.item.id.clone(),
                quantity: line.quantity,
                unit_price_cents: line.item.unit_price_cents,
                subtotal_cents: line.value.cents(),
            })
            .collect()
    }

    /// Operation type for a void under this plan.
    pub fn void_type(&self) -> OperationType {
        if self.covers_all {
            OperationType::FullVoid
        } else {
            OperationType::PartialVoid
        }
    }
}

/// Validates `selections` against `sale` and builds a plan.
///
/// ## Checks (in order)
/// 1. Selection list shape (non-empty, unique items, positive)
/// 2. Each item belongs to the sale, quantity is whole where required
/// 3. `quantity ≤ remaining` else `ExceedsAvailableQuantity`
/// 4. Open fiado: plan value `≤ total − paid` else `ExceedsOutstandingBalance`
///
/// A selection taking an item's full remaining quantity is valued at the
/// item's unreversed subtotal, so voiding everything brings the total to
/// exactly zero even after fractional partial voids.
pub fn plan_reversal(
    sale: &Sale,
    items: &[SaleItem],
    operations: &[Operation],
    selections: &[Selection],
) -> CoreResult<ReversalPlan> {
    validate_selections(selections)?;

    let by_id: HashMap<&str, &SaleItem> = items.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut lines = Vec::with_capacity(selections.len());

    for selection in selections {
        let item = by_id
            .get(selection.sale_item_id.as_str())
            .copied()
            .filter(|item| item.sale_id == sale.id)
            .ok_or_else(|| CoreError::SaleItemNotFound {
                sale_id: sale.id.clone(),
                sale_item_id: selection.sale_item_id.clone(),
            })?;

        validate_quantity(selection.quantity, item.unit)?;

        let remaining = remaining_quantity(item, operations);
        if selection.quantity > remaining {
            return Err(CoreError::ExceedsAvailableQuantity {
                sale_item_id: item.id.clone(),
                remaining: remaining.to_string(),
                requested: selection.quantity.to_string(),
            });
        }

        let value = if selection.quantity == remaining {
            remaining_value(item, operations)
        } else {
            item.value_of(selection.quantity)
        };

        lines.push(PlannedLine {
            item: item.clone(),
            quantity: selection.quantity,
            value,
        });
    }

    let total: Money = lines.iter().map(|l| l.value).sum();

    if sale.is_open_fiado() && total > sale.outstanding() {
        return Err(CoreError::ExceedsOutstandingBalance {
            sale_id: sale.id.clone(),
            outstanding_cents: sale.outstanding().cents(),
            requested_cents: total.cents(),
        });
    }

    let covers_all = items
        .iter()
        .filter(|item| item.sale_id == sale.id)
        .all(|item| {
            let remaining = remaining_quantity(item, operations);
            remaining.is_zero()
                || lines
                    .iter()
                    .any(|l| l.item.id == item.id && l.quantity == remaining)
        });

    Ok(ReversalPlan {
        lines,
        total,
        covers_all,
    })
}

// =============================================================================
// Void Settlement
// =============================================================================

/// New balance of a sale after a void.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VoidSettlement {
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub fiado_completed: bool,
    pub is_fiado: bool,
    /// Cash handed back on a contado sale.
    pub refund_cents: i64,
    /// Overpayment forgiven on a fiado sale.
    pub absorbed_cents: i64,
}

/// Applies a void plan to a sale's balance.
///
/// The total is floored at zero and `paid` clamped to it. Excess paid on
/// a sale that was ever fiado is absorbed; on a contado sale it is refunded.
/// An open fiado that ends up fully covered is closed.
pub fn settle_void(sale: &Sale, plan: &ReversalPlan) -> VoidSettlement {
    let new_total = sale.total().saturating_sub_to_zero(plan.total);
    let paid = sale.amount_paid();

    let (new_paid, excess) = if paid > new_total {
        (new_total, paid - new_total)
    } else {
        (paid, Money::zero())
    };

    let (refund, absorbed) = if sale.was_fiado {
        (Money::zero(), excess)
    } else {
        (excess, Money::zero())
    };

    let (is_fiado, fiado_completed) = if sale.is_open_fiado() && new_paid >= new_total {
        (false, true)
    } else {
        (sale.is_fiado, sale.fiado_completed)
    };

    VoidSettlement {
        total_cents: new_total.cents(),
        amount_paid_cents: new_paid.cents(),
        fiado_completed,
        is_fiado,
        refund_cents: refund.cents(),
        absorbed_cents: absorbed.cents(),
    }
}

// =============================================================================
// Conversion Split
// =============================================================================

/// New quantity and subtotal of an original item after a partial conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReduction {
    pub sale_item_id: String,
    pub quantity: Quantity,
    pub subtotal_cents: i64,
}

/// How a partial conversion divides a sale.
#[derive(Debug, Clone)]
pub struct ConversionSplit {
    pub reductions: Vec<ItemReduction>,
    /// Total of the new fiado sale.
    pub spawned_total: Money,
    /// Remaining value of the original sale.
    pub original_total: Money,
    /// Original `paid`, clamped to `original_total`.
    pub original_paid: Money,
}

/// Splits a partial conversion plan off its sale.
pub fn split_conversion(
    sale: &Sale,
    items: &[SaleItem],
    operations: &[Operation],
    plan: &ReversalPlan,
) -> ConversionSplit {
    let reductions: Vec<ItemReduction> = plan
        .lines
        .iter()
        .map(|line| ItemReduction {
            sale_item_id: line.item.id.clone(),
            quantity: line.item.quantity - line.quantity,
            subtotal_cents: (line.item.subtotal() - line.value).cents().max(0),
        })
        .collect();

    let original_total: Money = items
        .iter()
        .filter(|item| item.sale_id == sale.id)
        .map(|item| {
            let reduced = reductions.iter().find(|r| r.sale_item_id == item.id);
            let standing = match reduced {
                Some(r) => Money::from_cents(r.subtotal_cents),
                None => item.subtotal(),
            };
            standing.saturating_sub_to_zero(reversed_value(item, operations))
        })
        .sum();

    let original_paid = sale.amount_paid().min(original_total);

    ConversionSplit {
        reductions,
        spawned_total: plan.total,
        original_total,
        original_paid,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
