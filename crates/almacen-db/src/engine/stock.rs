//! # Stock Ledger
//!
//! Applies the pure reservation and credit arithmetic to stored products.
//!
//! ```text
//! product::fetch ──► stock::reserve / stock::credit ──► product::write_stock
//!      (reads version)        (pure, may fail)           (WHERE version = ?)
//! ```
//!
//! The `*_in` helpers run inside a caller's transaction and are shared by
//! checkout and voids. The public methods each open their own transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::engine::retry::{with_retry, RetryPolicy};
use crate::error::{LedgerError, LedgerResult};
use crate::repository::product;
use almacen_core::{stock, CoreError, MeasureUnit, PurchaseLine, Quantity, StockChange, ValidationError};

/// Takes stock out of a product inside the caller's transaction.
pub(crate) async fn reserve_in(
    conn: &mut SqliteConnection,
    product_id: &str,
    unit: MeasureUnit,
    qty: Quantity,
) -> LedgerResult<StockChange> {
    let product = product::fetch(&mut *conn, product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

    let change = stock::reserve(&product, unit, qty)?;
    product::write_stock(&mut *conn, &product, &change.after).await?;

    if change.packages_opened > 0 {
        debug!(
            product = %product.name,
            packages_opened = change.packages_opened,
            "Opened packages for loose-unit sale"
        );
    }

    Ok(change)
}

/// Puts stock back into a product inside the caller's transaction.
pub(crate) async fn credit_in(
    conn: &mut SqliteConnection,
    product_id: &str,
    unit: MeasureUnit,
    qty: Quantity,
) -> LedgerResult<StockChange> {
    let product = product::fetch(&mut *conn, product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

    let change = stock::credit(&product, unit, qty)?;
    product::write_stock(&mut *conn, &product, &change.after).await?;

    Ok(change)
}

/// Stock reservations, credits and supplier deliveries.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl StockLedger {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        StockLedger { pool, retry }
    }

    /// Reserves `qty` of `unit` from a product.
    pub async fn reserve(
        &self,
        product_id: &str,
        unit: MeasureUnit,
        qty: Quantity,
    ) -> LedgerResult<StockChange> {
        with_retry(self.retry, "reserve", move || async move {
            let mut tx = self.pool.begin().await?;
            let change = reserve_in(&mut tx, product_id, unit, qty).await?;
            tx.commit().await?;
            Ok(change)
        })
        .await
    }

    /// Credits `qty` of `unit` back to a product.
    pub async fn credit(
        &self,
        product_id: &str,
        unit: MeasureUnit,
        qty: Quantity,
    ) -> LedgerResult<StockChange> {
        with_retry(self.retry, "credit", move || async move {
            let mut tx = self.pool.begin().await?;
            let change = credit_in(&mut tx, product_id, unit, qty).await?;
            tx.commit().await?;
            Ok(change)
        })
        .await
    }

    /// Credits every line of a supplier delivery, all or nothing.
    pub async fn receive_purchase(&self, lines: &[PurchaseLine]) -> LedgerResult<Vec<StockChange>> {
        if lines.is_empty() {
            return Err(LedgerError::from(ValidationError::Required {
                field: "purchase lines".to_string(),
            }));
        }

        let changes = with_retry(self.retry, "receive_purchase", move || {
            self.try_receive_purchase(lines)
        })
        .await?;

        info!(lines = changes.len(), "Purchase received");
        Ok(changes)
    }

    async fn try_receive_purchase(&self, lines: &[PurchaseLine]) -> LedgerResult<Vec<StockChange>> {
        let mut tx = self.pool.begin().await?;
        let mut changes = Vec::with_capacity(lines.len());

        for line in lines {
            let change = credit_in(&mut tx, &line.product_id, line.unit, line.quantity).await?;
            changes.push(change);
        }

        tx.commit().await?;
        Ok(changes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
