//! # Sale Transaction Processor
//!
//! Turns a cart into a Sale atomically.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate cart (empty, size, quantities, prices)                       │
//! │  opening balance (contado / fiado / fiado + upfront)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │    for line in cart:  reserve stock  ── InsufficientStock → ROLLBACK   │
//! │    sale_number = MAX + 1                                                │
//! │    INSERT sale + sale_items                                             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A conflict anywhere (a product's version moved, a duplicate sale number)
//! rolls everything back and the whole checkout runs again.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::engine::retry::{with_retry, RetryPolicy};
use crate::engine::stock::reserve_in;
use crate::error::LedgerResult;
use crate::repository::sale;
use almacen_core::debt::{opening_balance, OpeningBalance};
use almacen_core::validation::{
    cart_total, validate_cart_size, validate_price_cents, validate_quantity,
};
use almacen_core::{CartLine, CoreError, Money, PaymentIntent, Sale, SaleItem, StockChange};

/// A committed checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub stock_changes: Vec<StockChange>,
}

/// Cart checkout.
#[derive(Debug, Clone)]
pub struct SaleProcessor {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SaleProcessor {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SaleProcessor { pool, retry }
    }

    /// Reserves stock for every cart line and records the sale.
    ///
    /// ## Errors
    /// - `EmptyCart`, `Validation` for malformed carts
    /// - `MissingClient`, `InvalidPaymentAmount` for bad fiado intents
    /// - `InsufficientStock`, `UnsupportedUnit`, `ProductNotFound` per line
    /// - `RetriesExhausted` under sustained contention
    pub async fn checkout(
        &self,
        cart: &[CartLine],
        payment: &PaymentIntent,
    ) -> LedgerResult<CheckoutReceipt> {
        let total = validate_cart(cart)?;
        let opening = opening_balance(total, payment)?;
        let opening = &opening;

        let receipt = with_retry(self.retry, "checkout", move || {
            self.try_checkout(cart, total, opening)
        })
        .await?;

        info!(
            sale_id = %receipt.sale.id,
            sale_number = receipt.sale.sale_number,
            total = %total,
            payment_type = ?receipt.sale.payment_type,
            lines = receipt.items.len(),
            "Checkout committed"
        );

        Ok(receipt)
    }

    async fn try_checkout(
        &self,
        cart: &[CartLine],
        total: Money,
        opening: &OpeningBalance,
    ) -> LedgerResult<CheckoutReceipt> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let sale_id = sale::generate_sale_id();

        let mut items = Vec::with_capacity(cart.len());
        let mut stock_changes = Vec::with_capacity(cart.len());

        for line in cart {
            let change = reserve_in(&mut tx, &line.product_id, line.unit, line.quantity).await?;
            stock_changes.push(change);

            items.push(SaleItem {
                id: sale::generate_sale_item_id(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit: line.unit,
                unit_price_cents: line.unit_price_cents,
                subtotal_cents: line.subtotal().cents(),
                created_at: now,
            });
        }

        let sale = Sale {
            id: sale_id,
            sale_number: sale::next_sale_number(&mut tx).await?,
            total_cents: total.cents(),
            payment_type: opening.payment_type,
            is_fiado: opening.is_fiado,
            fiado_completed: opening.fiado_completed,
            was_fiado: opening.was_fiado,
            amount_paid_cents: opening.amount_paid.cents(),
            client_id: opening.client_id.clone(),
            origin_sale_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        sale::insert_with_items(&mut tx, &sale, &items).await?;
        tx.commit().await?;

        Ok(CheckoutReceipt {
            sale,
            items,
            stock_changes,
        })
    }
}

/// Checks every line and returns the cart total.
fn validate_cart(cart: &[CartLine]) -> Result<Money, CoreError> {
    if cart.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    validate_cart_size(cart.len())?;

    for line in cart {
        validate_quantity(line.quantity, line.unit)?;
        validate_price_cents(line.unit_price_cents)?;
    }

    Ok(cart_total(cart)?)
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
    use almacen_core::{MeasureUnit, PaymentType, Quantity, ValidationError};
    use std::time::Duration;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_cash_checkout_opens_packages() {
        let db = db().await;
        let yerba = db
            .products()
            .create(NewProduct::package("Yerba 500g", 20, 5, 3))
            .await
            .unwrap();

        let cart = [CartLine::new(&yerba.id, MeasureUnit::Unit, Quantity::from_whole(30), 150)];
        let receipt = db.checkout().checkout(&cart, &PaymentIntent::cash()).await.unwrap();

        assert_eq!(receipt.sale.total_cents, 4500);
        assert_eq!(receipt.sale.amount_paid_cents, 4500);
        assert_eq!(receipt.sale.payment_type, PaymentType::Cash);
        assert!(!receipt.sale.is_fiado);
        assert_eq!(receipt.sale.sale_number, 1);
        assert_eq!(receipt.stock_changes[0].packages_opened, 2);

        let stored = db.products().get_by_id(&yerba.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 15);
        assert_eq!(stored.stock_packages, 1);
    }

    #[tokio::test]
    async fn test_failed_line_rolls_back_earlier_reservations() {
        let db = db().await;
        let alfajor = db
            .products()
            .create(NewProduct::unit("Alfajor", 10))
            .await
            .unwrap();
        let yerba = db
            .products()
            .create(NewProduct::package("Yerba 500g", 20, 5, 1))
            .await
            .unwrap();

        let cart = [
            CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(4), 300),
            CartLine::new(&yerba.id, MeasureUnit::Unit, Quantity::from_whole(30), 150),
        ];
        let err = db
            .checkout()
            .checkout(&cart, &PaymentIntent::cash())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::InsufficientStock { .. })
        ));

        let alfajor = db.products().get_by_id(&alfajor.id).await.unwrap().unwrap();
        assert_eq!(alfajor.stock_units, 10);
        let yerba = db.products().get_by_id(&yerba.id).await.unwrap().unwrap();
        assert_eq!(yerba.stock_units, 5);
        assert_eq!(yerba.stock_packages, 1);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fiado_checkout_with_upfront() {
        let db = db().await;
        let queso = db
            .products()
            .create(NewProduct::weight("Queso", Quantity::from_whole(5)))
            .await
            .unwrap();

        // 1.250 kg at $40.00/kg = $50.00
        let cart = [CartLine::new(
            &queso.id,
            MeasureUnit::Kilogram,
            Quantity::from_thousandths(1_250),
            4000,
        )];
        let receipt = db
            .checkout()
            .checkout(&cart, &PaymentIntent::fiado_with_upfront("ana", 2000))
            .await
            .unwrap();

        assert_eq!(receipt.sale.total_cents, 5000);
        assert_eq!(receipt.sale.amount_paid_cents, 2000);
        assert!(receipt.sale.is_fiado);
        assert!(receipt.sale.was_fiado);
        assert!(!receipt.sale.fiado_completed);
        assert_eq!(receipt.sale.client_id.as_deref(), Some("ana"));

        let stored = db.products().get_by_id(&queso.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_kg, Quantity::from_thousandths(3_750));
    }

    #[tokio::test]
    async fn test_cart_validation() {
        let db = db().await;
        let alfajor = db
            .products()
            .create(NewProduct::unit("Alfajor", 10))
            .await
            .unwrap();

        let empty = db.checkout().checkout(&[], &PaymentIntent::cash()).await;
        assert!(matches!(empty, Err(LedgerError::Domain(CoreError::EmptyCart))));

        let fractional = [CartLine::new(
            &alfajor.id,
            MeasureUnit::Unit,
            Quantity::from_thousandths(1_500),
            300,
        )];
        assert!(matches!(
            db.checkout().checkout(&fractional, &PaymentIntent::cash()).await,
            Err(LedgerError::Domain(CoreError::Validation(_)))
        ));

        let one = [CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(1), 300)];
        let no_client = PaymentIntent {
            client_id: None,
            ..PaymentIntent::fiado("x")
        };
        assert!(matches!(
            db.checkout().checkout(&one, &no_client).await,
            Err(LedgerError::Domain(CoreError::MissingClient))
        ));
    }

    #[tokio::test]
    async fn test_overflowing_prices_are_rejected() {
        let db = db().await;
        let alfajor = db
            .products()
            .create(NewProduct::unit("Alfajor", 10))
            .await
            .unwrap();

        let one_line = [CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(2), i64::MAX)];
        assert!(matches!(
            db.checkout().checkout(&one_line, &PaymentIntent::cash()).await,
            Err(LedgerError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. })))
        ));

        let two_lines = [
            CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(1), i64::MAX),
            CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(1), i64::MAX),
        ];
        assert!(matches!(
            db.checkout().checkout(&two_lines, &PaymentIntent::cash()).await,
            Err(LedgerError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. })))
        ));

        let stored = db.products().get_by_id(&alfajor.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 10);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sale_numbers_are_sequential() {
        let db = db().await;
        let alfajor = db
            .products()
            .create(NewProduct::unit("Alfajor", 10))
            .await
            .unwrap();
        let cart = [CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(1), 300)];

        for expected in 1..=3 {
            let receipt = db.checkout().checkout(&cart, &PaymentIntent::cash()).await.unwrap();
            assert_eq!(receipt.sale.sale_number, expected);
        }
    }

    /// File-backed so several connections really race.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_never_oversell() {
        let path = std::env::temp_dir().join(format!("almacen-race-{}.db", uuid::Uuid::new_v4()));
        let config = DbConfig::new(&path)
            .max_connections(5)
            .max_conflict_retries(100)
            .conflict_backoff(Duration::from_millis(2))
            .max_conflict_backoff(Duration::from_millis(20));
        let db = Database::new(config).await.unwrap();

        let alfajor = db
            .products()
            .create(NewProduct::unit("Alfajor", 5))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            let product_id = alfajor.id.clone();
            handles.push(tokio::spawn(async move {
                let cart = [CartLine::new(product_id, MeasureUnit::Unit, Quantity::from_whole(1), 300)];
                db.checkout().checkout(&cart, &PaymentIntent::cash()).await
            }));
        }

        let mut sold = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(LedgerError::Domain(CoreError::InsufficientStock { .. })) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(sold, 5);
        assert_eq!(rejected, 5);

        let stored = db.products().get_by_id(&alfajor.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_units, 0);
        assert_eq!(db.sales().count().await.unwrap(), 5);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
