//! # Reversal Ledger
//!
//! Voids and conversions to credit, driven by the Operation history.
//!
//! ## Void
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    load sale, items, operations                                         │
//! │    plan_reversal        remaining / open-fiado guard checked here      │
//! │    credit stock         per line, at the item's recorded unit          │
//! │    settle_void          total ↓, paid clamped, refund or absorbed      │
//! │    write_balance        WHERE version = ?                               │
//! │    INSERT operation     anulacion_completa | anulacion_parcial         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conversion to Credit
//! ```text
//! covers every remaining item?
//!   yes → sale becomes fiado in place (paid = 0, client set)
//!   no  → new fiado sale with the selected quantities,
//!         original items reduced, original total recomputed
//! no stock moves either way
//! ```
//!
//! Remaining quantities are read inside the same transaction that appends
//! the next Operation. The sale's version check makes two concurrent voids
//! of the same sale serialize: the loser re-reads the history and sees the
//! winner's Operation.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::engine::retry::{with_retry, RetryPolicy};
use crate::engine::stock::credit_in;
use crate::error::{DbError, LedgerResult};
use crate::repository::{operation, sale};
use almacen_core::debt::opening_balance;
use almacen_core::reversal::{
    plan_reversal, remaining_quantity, settle_void, split_conversion, ReversalPlan,
};
use almacen_core::validation::{normalize_client_id, normalize_reason};
use almacen_core::{
    CoreError, Operation, OperationType, PaymentIntent, PaymentType, Quantity, Sale, SaleItem,
    Selection, StockChange,
};

// =============================================================================
// Results
// =============================================================================

/// A committed void.
#[derive(Debug, Clone, Serialize)]
pub struct VoidReceipt {
    pub operation: Operation,
    pub sale: Sale,
    pub stock_changes: Vec<StockChange>,
    /// Cash to hand back (contado sales).
    pub refund_cents: i64,
    /// Overpayment forgiven (sales that were ever fiado).
    pub absorbed_cents: i64,
}

/// A committed conversion to credit.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReceipt {
    pub operation: Operation,
    /// The original sale after the conversion.
    pub sale: Sale,
    /// New fiado sale, for partial conversions.
    pub spawned_sale: Option<Sale>,
    pub spawned_items: Vec<SaleItem>,
    /// Payment the original sale no longer counts as received
    /// (`paid before − paid after`); cash to hand back.
    pub refund_cents: i64,
}

/// A sale item with what is left of it.
#[derive(Debug, Clone, Serialize)]
pub struct ItemBalance {
    pub item: SaleItem,
    pub remaining: Quantity,
}

/// A sale, its items and its full Operation history.
#[derive(Debug, Clone, Serialize)]
pub struct SaleLedger {
    pub sale: Sale,
    pub items: Vec<ItemBalance>,
    pub operations: Vec<Operation>,
}

// =============================================================================
// Reversal Ledger
// =============================================================================

/// Voids, conversions to credit and remaining-quantity queries.
#[derive(Debug, Clone)]
pub struct ReversalLedger {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl ReversalLedger {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        ReversalLedger { pool, retry }
    }

    /// Quantity of a sale item not yet voided or converted.
    pub async fn remaining_quantity(&self, sale_item_id: &str) -> LedgerResult<Quantity> {
        let mut conn = self.pool.acquire().await?;

        let item = sale::fetch_item(&mut conn, sale_item_id)
            .await?
            .ok_or_else(|| DbError::not_found("SaleItem", sale_item_id))?;
        let operations = operation::list_for_sale(&mut conn, &item.sale_id).await?;

        Ok(remaining_quantity(&item, &operations))
    }

    /// Everything a void dialog needs about one sale.
    pub async fn sale_ledger(&self, sale_id: &str) -> LedgerResult<SaleLedger> {
        let mut conn = self.pool.acquire().await?;
        let (sale, items, operations) = load(&mut conn, sale_id).await?;

        let items = items
            .into_iter()
            .map(|item| ItemBalance {
                remaining: remaining_quantity(&item, &operations),
                item,
            })
            .collect();

        Ok(SaleLedger {
            sale,
            items,
            operations,
        })
    }

    /// Voids quantities of a sale's items and credits them back to stock.
    ///
    /// ## Errors
    /// - `Validation` for an empty, duplicated or malformed selection list
    /// - `SaleNotFound`, `SaleItemNotFound`
    /// - `ExceedsAvailableQuantity` when a selection is above what is left
    /// - `ExceedsOutstandingBalance` on an open fiado
    pub async fn void(
        &self,
        sale_id: &str,
        selections: &[Selection],
        reason: Option<&str>,
    ) -> LedgerResult<VoidReceipt> {
        let reason = normalize_reason(reason)?;
        let reason = reason.as_deref();

        let receipt = with_retry(self.retry, "void", move || {
            self.try_void(sale_id, selections, reason)
        })
        .await?;

        if receipt.absorbed_cents > 0 {
            warn!(
                sale_id = %sale_id,
                absorbed_cents = receipt.absorbed_cents,
                "Void left the sale overpaid; excess absorbed"
            );
        }

        info!(
            sale_id = %sale_id,
            operation_id = %receipt.operation.id,
            operation_type = %receipt.operation.operation_type,
            voided_cents = receipt.operation.amount_cents,
            refund_cents = receipt.refund_cents,
            "Void committed"
        );

        Ok(receipt)
    }

    async fn try_void(
        &self,
        sale_id: &str,
        selections: &[Selection],
        reason: Option<&str>,
    ) -> LedgerResult<VoidReceipt> {
        let mut tx = self.pool.begin().await?;
        let (original, items, operations) = load(&mut tx, sale_id).await?;

        let plan = plan_reversal(&original, &items, &operations, selections)?;

        let mut stock_changes = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let change = credit_in(&mut tx, &line.item.product_id, line.item.unit, line.quantity).await?;
            stock_changes.push(change);
        }

        let settlement = settle_void(&original, &plan);
        let mut updated = Sale {
            total_cents: settlement.total_cents,
            amount_paid_cents: settlement.amount_paid_cents,
            is_fiado: settlement.is_fiado,
            fiado_completed: settlement.fiado_completed,
            updated_at: Utc::now(),
            ..original.clone()
        };
        updated.version = sale::write_balance(&mut tx, &updated).await?;

        let op = new_operation(
            &original,
            plan.void_type(),
            &plan,
            original.client_id.clone(),
            reason.map(str::to_string),
            None,
            settlement.absorbed_cents,
        );
        operation::insert(&mut tx, &op).await?;

        tx.commit().await?;

        Ok(VoidReceipt {
            operation: op,
            sale: updated,
            stock_changes,
            refund_cents: settlement.refund_cents,
            absorbed_cents: settlement.absorbed_cents,
        })
    }

    /// Reclassifies quantities of a sale as credit owed by `client_id`.
    ///
    /// No stock moves.
    pub async fn convert_to_credit(
        &self,
        sale_id: &str,
        selections: &[Selection],
        client_id: &str,
    ) -> LedgerResult<ConversionReceipt> {
        let client_id = normalize_client_id(Some(client_id)).ok_or(CoreError::MissingClient)?;
        let client_id = client_id.as_str();

        let receipt = with_retry(self.retry, "convert_to_credit", move || {
            self.try_convert(sale_id, selections, client_id)
        })
        .await?;

        info!(
            sale_id = %sale_id,
            client_id = %client_id,
            converted_cents = receipt.operation.amount_cents,
            refund_cents = receipt.refund_cents,
            spawned_sale_id = ?receipt.operation.spawned_sale_id,
            "Conversion to credit committed"
        );

        Ok(receipt)
    }

    async fn try_convert(
        &self,
        sale_id: &str,
        selections: &[Selection],
        client_id: &str,
    ) -> LedgerResult<ConversionReceipt> {
        let mut tx = self.pool.begin().await?;
        let (original, items, operations) = load(&mut tx, sale_id).await?;

        let plan = plan_reversal(&original, &items, &operations, selections)?;
        let now = Utc::now();

        let receipt = if plan.covers_all {
            let mut updated = Sale {
                payment_type: PaymentType::Fiado,
                is_fiado: true,
                fiado_completed: false,
                was_fiado: true,
                client_id: Some(client_id.to_string()),
                amount_paid_cents: 0,
                updated_at: now,
                ..original.clone()
            };
            updated.version = sale::write_balance(&mut tx, &updated).await?;

            let op = new_operation(
                &original,
                OperationType::FiadoConversion,
                &plan,
                Some(client_id.to_string()),
                None,
                None,
                0,
            );
            operation::insert(&mut tx, &op).await?;

            ConversionReceipt {
                operation: op,
                refund_cents: original.amount_paid_cents - updated.amount_paid_cents,
                sale: updated,
                spawned_sale: None,
                spawned_items: Vec::new(),
            }
        } else {
            let split = split_conversion(&original, &items, &operations, &plan);
            let opening = opening_balance(split.spawned_total, &PaymentIntent::fiado(client_id))?;

            let spawned_id = sale::generate_sale_id();
            let spawned_items: Vec<SaleItem> = plan
                .lines
                .iter()
                .map(|line| SaleItem {
                    id: sale::generate_sale_item_id(),
                    sale_id: spawned_id.clone(),
                    product_id: line.item.product_id.clone(),
                    quantity: line.quantity,
                    unit: line.item.unit,
                    unit_price_cents: line.item.unit_price_cents,
                    subtotal_cents: line.value.cents(),
                    created_at: now,
                })
                .collect();

            let spawned = Sale {
                id: spawned_id,
                sale_number: sale::next_sale_number(&mut tx).await?,
                total_cents: split.spawned_total.cents(),
                payment_type: opening.payment_type,
                is_fiado: opening.is_fiado,
                fiado_completed: opening.fiado_completed,
                was_fiado: opening.was_fiado,
                amount_paid_cents: opening.amount_paid.cents(),
                client_id: opening.client_id,
                origin_sale_id: Some(original.id.clone()),
                version: 0,
                created_at: now,
                updated_at: now,
            };
            sale::insert_with_items(&mut tx, &spawned, &spawned_items).await?;

            for reduction in &split.reductions {
                sale::write_item_quantity(
                    &mut tx,
                    &reduction.sale_item_id,
                    reduction.quantity,
                    reduction.subtotal_cents,
                )
                .await?;
            }

            let closes_debt = original.is_open_fiado() && split.original_paid >= split.original_total;
            let mut updated = Sale {
                total_cents: split.original_total.cents(),
                amount_paid_cents: split.original_paid.cents(),
                is_fiado: original.is_fiado && !closes_debt,
                fiado_completed: original.fiado_completed || closes_debt,
                updated_at: now,
                ..original.clone()
            };
            updated.version = sale::write_balance(&mut tx, &updated).await?;

            let op = new_operation(
                &original,
                OperationType::FiadoConversion,
                &plan,
                Some(client_id.to_string()),
                None,
                Some(spawned.id.clone()),
                0,
            );
            operation::insert(&mut tx, &op).await?;

            ConversionReceipt {
                operation: op,
                refund_cents: original.amount_paid_cents - updated.amount_paid_cents,
                sale: updated,
                spawned_sale: Some(spawned),
                spawned_items,
            }
        };

        tx.commit().await?;
        Ok(receipt)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Loads a sale with its items and Operation history.
async fn load(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> LedgerResult<(Sale, Vec<SaleItem>, Vec<Operation>)> {
    let sale = sale::fetch(&mut *conn, sale_id)
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
    let items = sale::fetch_items(&mut *conn, sale_id).await?;
    let operations = operation::list_for_sale(&mut *conn, sale_id).await?;

    Ok((sale, items, operations))
}

fn new_operation(
    sale: &Sale,
    operation_type: OperationType,
    plan: &ReversalPlan,
    client_id: Option<String>,
    reason: Option<String>,
    spawned_sale_id: Option<String>,
    absorbed_cents: i64,
) -> Operation {
    Operation {
        id: operation::generate_operation_id(),
        sale_id: sale.id.clone(),
        operation_type,
        items: plan.items(),
        amount_cents: plan.total.cents(),
        client_id,
        reason,
        spawned_sale_id,
        absorbed_cents,
        created_at: Utc::now(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use almacen_core::{CartLine, MeasureUnit, Money, Product};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn alfajor(db: &Database, stock: i64) -> Product {
        db.products()
            .create(NewProduct::unit("Alfajor", stock))
            .await
            .unwrap()
    }

    /// Two items of 5 units at $1.00, total $10.00.
    async fn two_item_sale(db: &Database, payment: PaymentIntent) -> (Sale, Vec<SaleItem>, Product) {
        let product = alfajor(db, 20).await;
        let cart = [
            CartLine::new(&product.id, MeasureUnit::Unit, Quantity::from_whole(5), 100),
            CartLine::new(&product.id, MeasureUnit::Unit, Quantity::from_whole(5), 100),
        ];
        let receipt = db.checkout().checkout(&cart, &payment).await.unwrap();
        (receipt.sale, receipt.items, product)
    }

    fn units(n: i64) -> Quantity {
        Quantity::from_whole(n)
    }

    #[tokio::test]
    async fn test_partial_void_updates_total_and_remaining() {
        let db = db().await;
        let (sale, items, product) = two_item_sale(&db, PaymentIntent::cash()).await;

        let receipt = db
            .reversals()
            .void(&sale.id, &[Selection::new(&items[0].id, units(2))], Some("  roto "))
            .await
            .unwrap();

        assert_eq!(receipt.sale.total_cents, 800);
        assert_eq!(receipt.sale.amount_paid_cents, 800);
        assert_eq!(receipt.refund_cents, 200);
        assert_eq!(receipt.absorbed_cents, 0);
        assert_eq!(receipt.operation.operation_type, OperationType::PartialVoid);
        assert_eq!(receipt.operation.reason.as_deref(), Some("roto"));
        assert_eq!(
            db.reversals().remaining_quantity(&items[0].id).await.unwrap(),
            units(3)
        );

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 12);
    }

    #[tokio::test]
    async fn test_cannot_void_more_than_remaining() {
        let db = db().await;
        let (sale, items, product) = two_item_sale(&db, PaymentIntent::cash()).await;
        let reversals = db.reversals();

        reversals
            .void(&sale.id, &[Selection::new(&items[0].id, units(3))], None)
            .await
            .unwrap();

        let err = reversals
            .void(&sale.id, &[Selection::new(&items[0].id, units(3))], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::ExceedsAvailableQuantity { .. })
        ));

        // Failed void changed nothing.
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 13);
        assert_eq!(db.operations().list_for_sale(&sale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_voiding_everything_is_a_full_void() {
        let db = db().await;
        let (sale, items, product) = two_item_sale(&db, PaymentIntent::cash()).await;
        let reversals = db.reversals();

        reversals
            .void(&sale.id, &[Selection::new(&items[0].id, units(1))], None)
            .await
            .unwrap();

        let receipt = reversals
            .void(
                &sale.id,
                &[
                    Selection::new(&items[0].id, units(4)),
                    Selection::new(&items[1].id, units(5)),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(receipt.operation.operation_type, OperationType::FullVoid);
        assert_eq!(receipt.sale.total_cents, 0);
        assert_eq!(receipt.sale.amount_paid_cents, 0);

        // Conservation: everything sold came back.
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 20);

        let ledger = reversals.sale_ledger(&sale.id).await.unwrap();
        assert!(ledger.items.iter().all(|i| i.remaining.is_zero()));
        assert_eq!(ledger.operations.len(), 2);
    }

    #[tokio::test]
    async fn test_void_guard_on_open_fiado() {
        let db = db().await;
        let (sale, items, _) =
            two_item_sale(&db, PaymentIntent::fiado_with_upfront("ana", 800)).await;

        let err = db
            .reversals()
            .void(&sale.id, &[Selection::new(&items[0].id, units(3))], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::ExceedsOutstandingBalance {
                outstanding_cents: 200,
                requested_cents: 300,
                ..
            })
        ));

        // Within the balance: closes the debt.
        let receipt = db
            .reversals()
            .void(&sale.id, &[Selection::new(&items[0].id, units(2))], None)
            .await
            .unwrap();
        assert_eq!(receipt.sale.total_cents, 800);
        assert_eq!(receipt.sale.amount_paid_cents, 800);
        assert!(receipt.sale.fiado_completed);
        assert!(!receipt.sale.is_fiado);
        assert!(receipt.sale.was_fiado);
    }

    #[tokio::test]
    async fn test_void_of_settled_fiado_absorbs_excess() {
        let db = db().await;
        let (sale, items, _) =
            two_item_sale(&db, PaymentIntent::fiado_with_upfront("ana", 1000)).await;
        assert!(sale.fiado_completed);

        let receipt = db
            .reversals()
            .void(&sale.id, &[Selection::new(&items[1].id, units(5))], None)
            .await
            .unwrap();
        assert_eq!(receipt.sale.total_cents, 500);
        assert_eq!(receipt.sale.amount_paid_cents, 500);
        assert_eq!(receipt.absorbed_cents, 500);
        assert_eq!(receipt.refund_cents, 0);
        assert_eq!(receipt.operation.absorbed_cents, 500);
    }

    #[tokio::test]
    async fn test_fractional_voids_reach_exact_zero() {
        let db = db().await;
        let queso = db
            .products()
            .create(NewProduct::weight("Queso", Quantity::from_whole(2)))
            .await
            .unwrap();
        // 1.000 kg at $9.99
        let cart = [CartLine::new(&queso.id, MeasureUnit::Kilogram, Quantity::from_whole(1), 999)];
        let receipt = db.checkout().checkout(&cart, &PaymentIntent::cash()).await.unwrap();
        let item = &receipt.items[0];

        let reversals = db.reversals();
        for grams in [333, 333] {
            reversals
                .void(
                    &receipt.sale.id,
                    &[Selection::new(&item.id, Quantity::from_thousandths(grams))],
                    None,
                )
                .await
                .unwrap();
        }
        let last = reversals
            .void(
                &receipt.sale.id,
                &[Selection::new(&item.id, Quantity::from_thousandths(334))],
                None,
            )
            .await
            .unwrap();

        assert_eq!(last.operation.operation_type, OperationType::FullVoid);
        assert_eq!(last.sale.total_cents, 0);

        let stored = db.products().get_by_id(&queso.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_kg, Quantity::from_whole(2));
    }

    #[tokio::test]
    async fn test_full_conversion_in_place() {
        let db = db().await;
        let (sale, items, product) = two_item_sale(&db, PaymentIntent::cash()).await;

        let receipt = db
            .reversals()
            .convert_to_credit(
                &sale.id,
                &[
                    Selection::new(&items[0].id, units(5)),
                    Selection::new(&items[1].id, units(5)),
                ],
                "ana",
            )
            .await
            .unwrap();

        assert!(receipt.spawned_sale.is_none());
        assert_eq!(receipt.sale.id, sale.id);
        assert_eq!(receipt.sale.payment_type, PaymentType::Fiado);
        assert!(receipt.sale.is_fiado);
        assert!(receipt.sale.was_fiado);
        assert_eq!(receipt.sale.amount_paid_cents, 0);
        assert_eq!(receipt.sale.total_cents, 1000);
        // The $10.00 taken at checkout goes back; the whole sale is now owed.
        assert_eq!(receipt.refund_cents, 1000);
        assert_eq!(receipt.sale.client_id.as_deref(), Some("ana"));
        assert_eq!(receipt.operation.operation_type, OperationType::FiadoConversion);

        // No stock movement.
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 10);
    }

    #[tokio::test]
    async fn test_partial_conversion_spawns_fiado_sale() {
        let db = db().await;
        let (sale, items, product) = two_item_sale(&db, PaymentIntent::cash()).await;

        let receipt = db
            .reversals()
            .convert_to_credit(&sale.id, &[Selection::new(&items[0].id, units(2))], "ana")
            .await
            .unwrap();

        let spawned = receipt.spawned_sale.clone().unwrap();
        assert_eq!(spawned.total_cents, 200);
        assert_eq!(spawned.amount_paid_cents, 0);
        assert!(spawned.is_open_fiado());
        assert_eq!(spawned.origin_sale_id.as_deref(), Some(sale.id.as_str()));
        assert_eq!(receipt.spawned_items.len(), 1);
        assert_eq!(receipt.spawned_items[0].quantity, units(2));

        assert_eq!(receipt.sale.total_cents, 800);
        assert_eq!(receipt.sale.amount_paid_cents, 800);
        assert_eq!(receipt.refund_cents, 200);
        assert_eq!(receipt.operation.spawned_sale_id.as_deref(), Some(spawned.id.as_str()));

        // The carved-out quantity is not counted twice.
        let reversals = db.reversals();
        assert_eq!(reversals.remaining_quantity(&items[0].id).await.unwrap(), units(3));
        assert_eq!(
            reversals
                .remaining_quantity(&receipt.spawned_items[0].id)
                .await
                .unwrap(),
            units(2)
        );

        // Across both sales the sold quantity is still 10.
        let original_items = db.sales().get_items(&sale.id).await.unwrap();
        let sold: Quantity = original_items
            .iter()
            .map(|i| i.quantity)
            .chain(receipt.spawned_items.iter().map(|i| i.quantity))
            .sum();
        assert_eq!(sold, units(10));

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 10);

        // The spawned debt is collectable.
        let payment = db
            .debts()
            .register_payment(&spawned.id, Money::from_cents(200))
            .await
            .unwrap();
        assert!(payment.sale.fiado_completed);
    }

    #[tokio::test]
    async fn test_conversion_requires_client() {
        let db = db().await;
        let (sale, items, _) = two_item_sale(&db, PaymentIntent::cash()).await;

        let err = db
            .reversals()
            .convert_to_credit(&sale.id, &[Selection::new(&items[0].id, units(1))], "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Domain(CoreError::MissingClient)));
    }

    #[tokio::test]
    async fn test_item_from_another_sale_rejected() {
        let db = db().await;
        let (first, _, _) = two_item_sale(&db, PaymentIntent::cash()).await;
        let (_, other_items, _) = two_item_sale(&db, PaymentIntent::cash()).await;

        let err = db
            .reversals()
            .void(&first.id, &[Selection::new(&other_items[0].id, units(1))], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::SaleItemNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_sale() {
        let db = db().await;
        let err = db
            .reversals()
            .void("missing", &[Selection::new("x", units(1))], None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Domain(CoreError::SaleNotFound(_))));
    }

    /// File-backed so several connections really race.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_voids_never_over_reverse() {
        let path = std::env::temp_dir().join(format!("almacen-void-race-{}.db", uuid::Uuid::new_v4()));
        let config = DbConfig::new(&path)
            .max_connections(5)
            .max_conflict_retries(100)
            .conflict_backoff(std::time::Duration::from_millis(2))
            .max_conflict_backoff(std::time::Duration::from_millis(20));
        let db = Database::new(config).await.unwrap();

        let product = alfajor(&db, 10).await;
        let cart = [CartLine::new(&product.id, MeasureUnit::Unit, units(5), 100)];
        let receipt = db.checkout().checkout(&cart, &PaymentIntent::cash()).await.unwrap();
        let sale_id = receipt.sale.id.clone();
        let item_id = receipt.items[0].id.clone();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            let sale_id = sale_id.clone();
            let item_id = item_id.clone();
            handles.push(tokio::spawn(async move {
                db.reversals()
                    .void(&sale_id, &[Selection::new(item_id, units(1))], None)
                    .await
            }));
        }

        let mut voided = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => voided += 1,
                Err(LedgerError::Domain(CoreError::ExceedsAvailableQuantity { .. })) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(voided, 5);
        assert_eq!(rejected, 5);

        let reversals = db.reversals();
        assert_eq!(reversals.remaining_quantity(&item_id).await.unwrap(), Quantity::zero());

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 10);

        let sale = db.sales().get_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(sale.total_cents, 0);
        assert_eq!(db.operations().list_for_sale(&sale_id).await.unwrap().len(), 5);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
