//! # Debt Math
//!
//! Fiado balances: opening a sale's balance at checkout, applying a payment
//! to one sale, and spreading a payment across several.
//!
//! ## Debt Bound
//! Every function here keeps `0 ≤ amount_paid ≤ total`. Money beyond the
//! outstanding balance is reported as change and never recorded as paid.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{OperationType, PaymentIntent, PaymentType, Sale};
use crate::validation::{normalize_client_id, validate_payment_amount};

// =============================================================================
// Opening Balance
// =============================================================================

/// Payment fields of a new sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningBalance {
    pub payment_type: PaymentType,
    pub client_id: Option<String>,
    pub amount_paid: Money,
    pub is_fiado: bool,
    pub fiado_completed: bool,
    pub was_fiado: bool,
}

/// Computes how a checkout of `total` starts out paid.
///
/// ```text
/// contado            → paid = total
/// fiado              → paid = 0
/// fiado + upfront u  → paid = min(u, total), completed iff paid ≥ total
/// ```
pub fn opening_balance(total: Money, intent: &PaymentIntent) -> CoreResult<OpeningBalance> {
    match intent.payment_type {
        PaymentType::Cash => Ok(OpeningBalance {
            payment_type: PaymentType::Cash,
            client_id: normalize_client_id(intent.client_id.as_deref()),
            amount_paid: total,
            is_fiado: false,
            fiado_completed: false,
            was_fiado: false,
        }),
        PaymentType::Fiado => {
            let client_id = normalize_client_id(intent.client_id.as_deref())
                .ok_or(CoreError::MissingClient)?;

            let upfront = Money::from_cents(intent.upfront_cents.unwrap_or(0));
            if upfront.is_negative() {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!("upfront payment {} is negative", upfront),
                });
            }

            let amount_paid = upfront.min(total);
            let fiado_completed = amount_paid >= total;

            Ok(OpeningBalance {
                payment_type: PaymentType::Fiado,
                client_id: Some(client_id),
                amount_paid,
                is_fiado: !fiado_completed,
                fiado_completed,
                was_fiado: true,
            })
        }
    }
}

// =============================================================================
// Single Payment
// =============================================================================

/// Outcome of one payment against one sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentApplication {
    pub applied_cents: i64,
    pub change_cents: i64,
    pub amount_paid_cents: i64,
    pub fiado_completed: bool,
    pub is_fiado: bool,
    pub operation_type: OperationType,
}

/// Applies `amount` to an open fiado sale.
///
/// ## Errors
/// - `InvalidPaymentAmount` when `amount ≤ 0`
/// - `SaleNotOutstanding` when the sale is not an open fiado
pub fn apply_payment(sale: &Sale, amount: Money) -> CoreResult<PaymentApplication> {
    validate_payment_amount(amount.cents()).map_err(|e| CoreError::InvalidPaymentAmount {
        reason: e.to_string(),
    })?;

    if !sale.is_open_fiado() {
        return Err(CoreError::SaleNotOutstanding(sale.id.clone()));
    }

    let outstanding = sale.outstanding();
    let applied = amount.min(outstanding);
    let paid = sale.amount_paid() + applied;
    let fiado_completed = paid >= sale.total();

    Ok(PaymentApplication {
        applied_cents: applied.cents(),
        change_cents: (amount - applied).cents(),
        amount_paid_cents: paid.cents(),
        fiado_completed,
        is_fiado: !fiado_completed,
        operation_type: if fiado_completed {
            OperationType::FiadoPayoff
        } else {
            OperationType::PartialPayment
        },
    })
}

// =============================================================================
// Distribution
// =============================================================================

/// Share of a distributed payment assigned to one sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPart {
    pub sale_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub parts: Vec<AllocationPart>,
    pub total_applied: Money,
    pub change: Money,
}

/// Greedily spreads `amount` over `sales` in the order given.
///
/// Sales that are not open fiados, or owe nothing, are skipped.
pub fn allocate(sales: &[Sale], amount: Money) -> CoreResult<Allocation> {
    validate_payment_amount(amount.cents()).map_err(|e| CoreError::InvalidPaymentAmount {
        reason: e.to_string(),
    })?;

    let mut left = amount;
    let mut parts = Vec::new();

    for sale in sales.iter().filter(|s| s.is_open_fiado()) {
        if left.is_zero() {
            break;
        }

        let share = left.min(sale.outstanding());
        if share.is_positive() {
            parts.push(AllocationPart {
                sale_id: sale.id.clone(),
                amount: share,
            });
            left -= share;
        }
    }

    Ok(Allocation {
        total_applied: amount - left,
        change: left,
        parts,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
