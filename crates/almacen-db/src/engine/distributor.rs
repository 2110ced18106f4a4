//! # Payment Distributor
//!
//! Spreads one lump payment across a client's open fiado sales.
//!
//! ```text
//! client owes:  #12 $5.00   #15 $3.00        pays $7.00, oldest first
//!
//!   #12  ← $5.00   paid off   (cancelacion_fiado)
//!   #15  ← $2.00   still owes (abono_parcial)
//!   change $0.00
//! ```
//!
//! Listing, allocation and every per-sale payment share one transaction, so
//! a concurrent payment against any of those sales forces a clean retry.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::DistributionOrder;
use crate::engine::debt::{pay_in, PaymentReceipt};
use crate::engine::retry::{with_retry, RetryPolicy};
use crate::error::LedgerResult;
use crate::repository::sale;
use almacen_core::debt::allocate;
use almacen_core::validation::normalize_client_id;
use almacen_core::{CoreError, Money};

/// Outcome of a distributed payment.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionReceipt {
    pub client_id: String,
    /// One entry per sale that received money, in application order.
    pub payments: Vec<PaymentReceipt>,
    pub total_applied_cents: i64,
    pub change_cents: i64,
}

/// Lump payments across a client's fiado sales.
#[derive(Debug, Clone)]
pub struct PaymentDistributor {
    pool: SqlitePool,
    retry: RetryPolicy,
    order: DistributionOrder,
}

impl PaymentDistributor {
    pub fn new(pool: SqlitePool, retry: RetryPolicy, order: DistributionOrder) -> Self {
        PaymentDistributor { pool, retry, order }
    }

    /// Uses a different distribution order for this distributor.
    pub fn with_order(mut self, order: DistributionOrder) -> Self {
        self.order = order;
        self
    }

    /// Applies `amount` to the client's open fiado sales in order.
    ///
    /// ## Errors
    /// - `MissingClient` for a blank client
    /// - `InvalidPaymentAmount` when `amount ≤ 0`
    pub async fn pay_across_sales(
        &self,
        client_id: &str,
        amount: Money,
    ) -> LedgerResult<DistributionReceipt> {
        let client_id = normalize_client_id(Some(client_id)).ok_or(CoreError::MissingClient)?;
        let client_id = client_id.as_str();

        let receipt = with_retry(self.retry, "pay_across_sales", move || {
            self.try_pay_across_sales(client_id, amount)
        })
        .await?;

        info!(
            client_id = %client_id,
            order = %self.order,
            sales_paid = receipt.payments.len(),
            applied_cents = receipt.total_applied_cents,
            change_cents = receipt.change_cents,
            "Distributed payment committed"
        );

        Ok(receipt)
    }

    async fn try_pay_across_sales(
        &self,
        client_id: &str,
        amount: Money,
    ) -> LedgerResult<DistributionReceipt> {
        let mut tx = self.pool.begin().await?;

        let open_sales = sale::list_outstanding_for_client(&mut tx, client_id, self.order).await?;
        let allocation = allocate(&open_sales, amount)?;

        debug!(
            client_id = %client_id,
            open_sales = open_sales.len(),
            parts = allocation.parts.len(),
            "Allocated payment"
        );

        let mut payments = Vec::with_capacity(allocation.parts.len());
        for part in &allocation.parts {
            let Some(target) = open_sales.iter().find(|s| s.id == part.sale_id) else {
                continue;
            };
            payments.push(pay_in(&mut tx, target, part.amount).await?);
        }

        tx.commit().await?;

        Ok(DistributionReceipt {
            client_id: client_id.to_string(),
            payments,
            total_applied_cents: allocation.total_applied.cents(),
            change_cents: allocation.change.cents(),
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
    use almacen_core::{CartLine, MeasureUnit, OperationType, PaymentIntent, Quantity, Sale};

    async fn fiado_sale(db: &Database, client: &str, total_cents: i64) -> Sale {
        let product = db
            .products()
            .create(NewProduct::unit("Fideos", 1))
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
    async fn test_oldest_first() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let older = fiado_sale(&db, "ana", 500).await;
        let newer = fiado_sale(&db, "ana", 300).await;

        let receipt = db
            .distributor()
            .pay_across_sales("ana", Money::from_cents(700))
            .await
            .unwrap();

        assert_eq!(receipt.payments.len(), 2);
        assert_eq!(receipt.total_applied_cents, 700);
        assert_eq!(receipt.change_cents, 0);

        let first = &receipt.payments[0];
        assert_eq!(first.sale.id, older.id);
        assert_eq!(first.applied_cents, 500);
        assert!(first.sale.fiado_completed);
        assert_eq!(first.operation.operation_type, OperationType::FiadoPayoff);

        let second = &receipt.payments[1];
        assert_eq!(second.sale.id, newer.id);
        assert_eq!(second.applied_cents, 200);
        assert!(!second.sale.fiado_completed);
        assert_eq!(second.operation.operation_type, OperationType::PartialPayment);

        let balance = db.debts().client_balance("ana").await.unwrap();
        assert_eq!(balance.outstanding_cents, 100);
    }

    #[tokio::test]
    async fn test_newest_first_with_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let older = fiado_sale(&db, "ana", 500).await;
        let newer = fiado_sale(&db, "ana", 300).await;

        let receipt = db
            .distributor()
            .with_order(DistributionOrder::NewestFirst)
            .pay_across_sales("ana", Money::from_cents(1000))
            .await
            .unwrap();

        assert_eq!(receipt.payments[0].sale.id, newer.id);
        assert_eq!(receipt.payments[1].sale.id, older.id);
        assert_eq!(receipt.total_applied_cents, 800);
        assert_eq!(receipt.change_cents, 200);
        assert!(receipt.payments.iter().all(|p| p.sale.fiado_completed));
    }

    #[tokio::test]
    async fn test_other_clients_untouched() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        fiado_sale(&db, "ana", 500).await;
        let beto = fiado_sale(&db, "beto", 400).await;

        db.distributor()
            .pay_across_sales("ana", Money::from_cents(500))
            .await
            .unwrap();

        let stored = db.sales().get_by_id(&beto.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid_cents, 0);
        assert!(stored.is_open_fiado());
    }

    #[tokio::test]
    async fn test_no_debt_returns_everything_as_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let receipt = db
            .distributor()
            .pay_across_sales("ana", Money::from_cents(250))
            .await
            .unwrap();
        assert!(receipt.payments.is_empty());
        assert_eq!(receipt.change_cents, 250);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(matches!(
            db.distributor().pay_across_sales("", Money::from_cents(100)).await,
            Err(LedgerError::Domain(CoreError::MissingClient))
        ));
        assert!(matches!(
            db.distributor().pay_across_sales("ana", Money::zero()).await,
            Err(LedgerError::Domain(CoreError::InvalidPaymentAmount { .. }))
        ));
    }
}
