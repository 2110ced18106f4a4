//! # Debt Account
//!
//! Payments (`abonos`) against a single fiado sale, and client balances.
//!
//! ```text
//! register_payment(sale, amount)
//!   applied = min(amount, total − paid)
//!   paid   += applied
//!   paid ≥ total → cancelacion_fiado, fiado closed
//!   otherwise    → abono_parcial
//!   amount − applied is returned as change
//! ```
//!
//! Payments never touch stock.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::config::DistributionOrder;
use crate::engine::retry::{with_retry, RetryPolicy};
use crate::error::LedgerResult;
use crate::repository::{operation, sale};
use almacen_core::debt::apply_payment;
use almacen_core::validation::normalize_client_id;
use almacen_core::{CoreError, Money, Operation, Sale};

/// A committed payment against one sale.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub operation: Operation,
    pub sale: Sale,
    pub applied_cents: i64,
    /// Part of the amount beyond the outstanding balance.
    pub change_cents: i64,
}

/// What a client owes right now.
#[derive(Debug, Clone, Serialize)]
pub struct ClientBalance {
    pub client_id: String,
    pub outstanding_cents: i64,
    /// Open fiado sales, oldest first.
    pub open_sales: Vec<Sale>,
}

/// Applies `amount` to `sale` inside the caller's transaction.
///
/// `sale` must have been read in the same transaction.
pub(crate) async fn pay_in(
    conn: &mut SqliteConnection,
    sale: &Sale,
    amount: Money,
) -> LedgerResult<PaymentReceipt> {
    let application = apply_payment(sale, amount)?;
    let now = Utc::now();

    let mut updated = Sale {
        amount_paid_cents: application.amount_paid_cents,
        is_fiado: application.is_fiado,
        fiado_completed: application.fiado_completed,
        updated_at: now,
        ..sale.clone()
    };
    updated.version = sale::write_balance(&mut *conn, &updated).await?;

    let op = Operation {
        id: operation::generate_operation_id(),
        sale_id: sale.id.clone(),
        operation_type: application.operation_type,
        items: Vec::new(),
        amount_cents: application.applied_cents,
        client_id: sale.client_id.clone(),
        reason: None,
        spawned_sale_id: None,
        absorbed_cents: 0,
        created_at: now,
    };
    operation::insert(&mut *conn, &op).await?;

    Ok(PaymentReceipt {
        operation: op,
        sale: updated,
        applied_cents: application.applied_cents,
        change_cents: application.change_cents,
    })
}

/// Payments against single fiado sales.
#[derive(Debug, Clone)]
pub struct DebtAccount {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl DebtAccount {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        DebtAccount { pool, retry }
    }

    /// Registers a payment against an open fiado sale.
    ///
    /// ## Errors
    /// - `InvalidPaymentAmount` when `amount ≤ 0`
    /// - `SaleNotFound`
    /// - `SaleNotOutstanding` when the sale is not an open fiado
    pub async fn register_payment(&self, sale_id: &str, amount: Money) -> LedgerResult<PaymentReceipt> {
        let receipt = with_retry(self.retry, "register_payment", move || {
            self.try_register_payment(sale_id, amount)
        })
        .await?;

        info!(
            sale_id = %sale_id,
            operation_type = %receipt.operation.operation_type,
            applied_cents = receipt.applied_cents,
            change_cents = receipt.change_cents,
            "Payment committed"
        );

        Ok(receipt)
    }

    async fn try_register_payment(&self, sale_id: &str, amount: Money) -> LedgerResult<PaymentReceipt> {
        let mut tx = self.pool.begin().await?;

        let sale = sale::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
        let receipt = pay_in(&mut tx, &sale, amount).await?;

        tx.commit().await?;
        Ok(receipt)
    }

    /// Outstanding fiado balance of a client.
    pub async fn client_balance(&self, client_id: &str) -> LedgerResult<ClientBalance> {
        let client_id = normalize_client_id(Some(client_id)).ok_or(CoreError::MissingClient)?;

        let mut conn = self.pool.acquire().await?;
        let open_sales =
            sale::list_outstanding_for_client(&mut conn, &client_id, DistributionOrder::OldestFirst)
                .await?;

        let outstanding: Money = open_sales.iter().map(Sale::outstanding).sum();

        Ok(ClientBalance {
            client_id,
            outstanding_cents: outstanding.cents(),
            open_sales,
        })
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
    use almacen_core::{CartLine, MeasureUnit, OperationType, PaymentIntent, Quantity};

    async fn fiado_sale(db: &Database, client: &str, total_cents: i64) -> Sale {
        let product = db
            .products()
            .create(NewProduct::unit("Galletitas", 1))
            .await
            .unwrap();
        let cart = [CartLine::new(&product.id, MeasureUnit::Unit, Quantity::from_whole(1), total_cents)];
        db.checkout()
            .checkout(&cart, &PaymentIntent::fiado(client))
            .await
            .unwrap()
            .sale
    }

    #[tokio::test]
    async fn test_abono_then_payoff() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sale = fiado_sale(&db, "ana", 1000).await;
        let debts = db.debts();

        let first = debts.register_payment(&sale.id, Money::from_cents(300)).await.unwrap();
        assert_eq!(first.operation.operation_type, OperationType::PartialPayment);
        assert_eq!(first.sale.amount_paid_cents, 300);
        assert!(first.sale.is_fiado);

        let second = debts.register_payment(&sale.id, Money::from_cents(900)).await.unwrap();
        assert_eq!(second.operation.operation_type, OperationType::FiadoPayoff);
        assert_eq!(second.applied_cents, 700);
        assert_eq!(second.change_cents, 200);
        assert_eq!(second.sale.amount_paid_cents, 1000);
        assert!(second.sale.fiado_completed);
        assert!(!second.sale.is_fiado);
        assert!(second.sale.was_fiado);

        // Debt bound: nothing more can be paid.
        let err = debts
            .register_payment(&sale.id, Money::from_cents(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::SaleNotOutstanding(_))
        ));

        let ops = db.operations().list_for_sale(&sale.id).await.unwrap();
        let recorded: i64 = ops.iter().map(|op| op.amount_cents).sum();
        assert_eq!(recorded, 1000);
    }

    #[tokio::test]
    async fn test_invalid_amounts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sale = fiado_sale(&db, "ana", 1000).await;

        for cents in [0, -50] {
            let err = db
                .debts()
                .register_payment(&sale.id, Money::from_cents(cents))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                LedgerError::Domain(CoreError::InvalidPaymentAmount { .. })
            ));
        }

        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid_cents, 0);
    }

    #[tokio::test]
    async fn test_cash_sale_is_not_payable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(NewProduct::unit("Galletitas", 1))
            .await
            .unwrap();
        let cart = [CartLine::new(&product.id, MeasureUnit::Unit, Quantity::from_whole(1), 500)];
        let sale = db
            .checkout()
            .checkout(&cart, &PaymentIntent::cash())
            .await
            .unwrap()
            .sale;

        assert!(matches!(
            db.debts().register_payment(&sale.id, Money::from_cents(100)).await,
            Err(LedgerError::Domain(CoreError::SaleNotOutstanding(_)))
        ));
    }

    #[tokio::test]
    async fn test_client_balance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = fiado_sale(&db, "ana", 500).await;
        fiado_sale(&db, "ana", 300).await;
        fiado_sale(&db, "beto", 900).await;

        db.debts()
            .register_payment(&first.id, Money::from_cents(100))
            .await
            .unwrap();

        let balance = db.debts().client_balance("ana").await.unwrap();
        assert_eq!(balance.outstanding_cents, 700);
        assert_eq!(balance.open_sales.len(), 2);

        let nobody = db.debts().client_balance("carla").await.unwrap();
        assert_eq!(nobody.outstanding_cents, 0);
        assert!(nobody.open_sales.is_empty());
    }

    /// File-backed so several connections really race.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_never_overpay() {
        let path = std::env::temp_dir().join(format!("almacen-abono-race-{}.db", uuid::Uuid::new_v4()));
        let config = DbConfig::new(&path)
            .max_connections(5)
            .max_conflict_retries(100)
            .conflict_backoff(std::time::Duration::from_millis(2))
            .max_conflict_backoff(std::time::Duration::from_millis(20));
        let db = Database::new(config).await.unwrap();
        let sale = fiado_sale(&db, "ana", 500).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            let sale_id = sale.id.clone();
            handles.push(tokio::spawn(async move {
                db.debts().register_payment(&sale_id, Money::from_cents(100)).await
            }));
        }

        let mut applied = 0;
        let mut change = 0;
        let mut paid_payments = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    paid_payments += 1;
                    applied += receipt.applied_cents;
                    change += receipt.change_cents;
                }
                Err(LedgerError::Domain(CoreError::SaleNotOutstanding(_))) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(paid_payments, 5);
        assert_eq!(rejected, 5);
        assert_eq!(applied, 500);
        assert_eq!(change, 0);

        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid_cents, 500);
        assert!(stored.fiado_completed);

        let ops = db.operations().list_for_sale(&sale.id).await.unwrap();
        assert_eq!(ops.len(), 5);
        assert_eq!(ops.iter().map(|op| op.amount_cents).sum::<i64>(), 500);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
