//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_with_items       checkout, partial conversion (spawned sale)   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  write_balance           voids, conversions, payments                  │
//! │    (version-checked)     total / paid / fiado flags / client           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  write_item_quantity     partial conversion only                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale items are never deleted. A void leaves the item untouched and
//! records the reversed quantity as an Operation instead.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::config::DistributionOrder;
use crate::error::{DbError, DbResult};
use almacen_core::{Quantity, Sale, SaleItem};

const SELECT_SALE: &str = r#"
    SELECT
        id, sale_number, total_cents, payment_type,
        is_fiado, fiado_completed, was_fiado,
        amount_paid_cents, client_id, origin_sale_id,
        version, created_at, updated_at
    FROM sales
"#;

const SELECT_ITEM: &str = r#"
    SELECT
        id, sale_id, product_id, quantity, unit,
        unit_price_cents, subtotal_cents, created_at
    FROM sale_items
"#;

/// Generates a new sale ID.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new sale item ID.
pub fn generate_sale_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Transaction-Level Reads
// =============================================================================

/// Loads a sale inside the caller's transaction.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>(&format!("{SELECT_SALE} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(sale)
}

/// Loads a sale's items in the order they were rung up.
pub async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(&format!(
        "{SELECT_ITEM} WHERE sale_id = ?1 ORDER BY created_at, rowid"
    ))
    .bind(sale_id)
    .fetch_all(conn)
    .await?;

    Ok(items)
}

/// Loads a single sale item.
pub async fn fetch_item(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<SaleItem>> {
    let item = sqlx::query_as::<_, SaleItem>(&format!("{SELECT_ITEM} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(item)
}

/// Next sequential sale number.
///
/// Two concurrent checkouts can read the same value; the unique index on
/// `sale_number` turns the loser's insert into a conflict.
pub async fn next_sale_number(conn: &mut SqliteConnection) -> DbResult<i64> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(sale_number) FROM sales")
        .fetch_one(conn)
        .await?;

    Ok(max.unwrap_or(0) + 1)
}

/// Open fiado sales of a client, in distribution order.
pub async fn list_outstanding_for_client(
    conn: &mut SqliteConnection,
    client_id: &str,
    order: DistributionOrder,
) -> DbResult<Vec<Sale>> {
    let order_by = match order {
        DistributionOrder::OldestFirst => "created_at ASC, sale_number ASC",
        DistributionOrder::NewestFirst => "created_at DESC, sale_number DESC",
    };

    let sales = sqlx::query_as::<_, Sale>(&format!(
        r#"{SELECT_SALE}
        WHERE client_id = ?1
          AND is_fiado = 1
          AND fiado_completed = 0
          AND amount_paid_cents < total_cents
        ORDER BY {order_by}"#
    ))
    .bind(client_id)
    .fetch_all(conn)
    .await?;

    Ok(sales)
}

// =============================================================================
// Transaction-Level Writes
// =============================================================================

/// Inserts a sale and its items.
pub async fn insert_with_items(
    conn: &mut SqliteConnection,
    sale: &Sale,
    items: &[SaleItem],
) -> DbResult<()> {
    debug!(
        id = %sale.id,
        sale_number = sale.sale_number,
        total_cents = sale.total_cents,
        items = items.len(),
        "Inserting sale"
    );

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, sale_number, total_cents, payment_type,
            is_fiado, fiado_completed, was_fiado,
            amount_paid_cents, client_id, origin_sale_id,
            version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&sale.id)
    .bind(sale.sale_number)
    .bind(sale.total_cents)
    .bind(sale.payment_type)
    .bind(sale.is_fiado)
    .bind(sale.fiado_completed)
    .bind(sale.was_fiado)
    .bind(sale.amount_paid_cents)
    .bind(&sale.client_id)
    .bind(&sale.origin_sale_id)
    .bind(sale.version)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in items {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, quantity, unit,
                unit_price_cents, subtotal_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit)
        .bind(item.unit_price_cents)
        .bind(item.subtotal_cents)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Writes a sale's balance and fiado fields if its version still matches.
///
/// `sale.version` is the version read earlier in this transaction.
/// `sale.updated_at` is stored as given.
///
/// ## Returns
/// The sale's new version.
pub async fn write_balance(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<i64> {
    debug!(
        id = %sale.id,
        total_cents = sale.total_cents,
        amount_paid_cents = sale.amount_paid_cents,
        is_fiado = sale.is_fiado,
        fiado_completed = sale.fiado_completed,
        version = sale.version,
        "Writing sale balance"
    );

    let result = sqlx::query(
        r#"
        UPDATE sales SET
            total_cents = ?3,
            amount_paid_cents = ?4,
            payment_type = ?5,
            is_fiado = ?6,
            fiado_completed = ?7,
            was_fiado = ?8,
            client_id = ?9,
            updated_at = ?10,
            version = version + 1
        WHERE id = ?1 AND version = ?2
        "#,
    )
    .bind(&sale.id)
    .bind(sale.version)
    .bind(sale.total_cents)
    .bind(sale.amount_paid_cents)
    .bind(sale.payment_type)
    .bind(sale.is_fiado)
    .bind(sale.fiado_completed)
    .bind(sale.was_fiado)
    .bind(&sale.client_id)
    .bind(sale.updated_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("Sale", &sale.id));
    }

    Ok(sale.version + 1)
}

/// Sets a sale item's quantity and subtotal.
///
/// Items are only written together with a version-checked write of their
/// sale, which serializes concurrent callers.
pub async fn write_item_quantity(
    conn: &mut SqliteConnection,
    item_id: &str,
    quantity: Quantity,
    subtotal_cents: i64,
) -> DbResult<()> {
    debug!(id = %item_id, quantity = %quantity, subtotal_cents, "Reducing sale item");

    let result = sqlx::query(
        r#"
        UPDATE sale_items SET
            quantity = ?2,
            subtotal_cents = ?3
        WHERE id = ?1
        "#,
    )
    .bind(item_id)
    .bind(quantity)
    .bind(subtotal_cents)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("SaleItem", item_id));
    }

    Ok(())
}

// =============================================================================
// Pool-Level Repository
// =============================================================================

/// Repository for sale reads.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets a sale by its human-facing number.
    pub async fn get_by_number(&self, sale_number: i64) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!("{SELECT_SALE} WHERE sale_number = ?1"))
            .bind(sale_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets all items of a sale.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, sale_id).await
    }

    /// Sales split off `sale_id` by partial conversions.
    pub async fn list_spawned_from(&self, sale_id: &str) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "{SELECT_SALE} WHERE origin_sale_id = ?1 ORDER BY sale_number"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Most recent sales first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "{SELECT_SALE} ORDER BY sale_number DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use almacen_core::{MeasureUnit, PaymentType};
    use chrono::{Duration, Utc};

    fn fiado_sale(number: i64, client: &str, total: i64, minutes_ago: i64) -> Sale {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        Sale {
            id: generate_sale_id(),
            sale_number: number,
            total_cents: total,
            payment_type: PaymentType::Fiado,
            is_fiado: true,
            fiado_completed: false,
            was_fiado: true,
            amount_paid_cents: 0,
            client_id: Some(client.to_string()),
            origin_sale_id: None,
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(NewProduct::unit("Alfajor", 10))
            .await
            .unwrap();

        let sale = fiado_sale(1, "ana", 300, 0);
        let item = SaleItem {
            id: generate_sale_item_id(),
            sale_id: sale.id.clone(),
            product_id: product.id.clone(),
            quantity: Quantity::from_whole(3),
            unit: MeasureUnit::Unit,
            unit_price_cents: 100,
            subtotal_cents: 300,
            created_at: Utc::now(),
        };

        let mut conn = db.pool().acquire().await.unwrap();
        insert_with_items(&mut conn, &sale, std::slice::from_ref(&item))
            .await
            .unwrap();
        assert_eq!(next_sale_number(&mut conn).await.unwrap(), 2);
        drop(conn);

        let loaded = db.sales().get_by_number(1).await.unwrap().unwrap();
        assert_eq!(loaded.id, sale.id);
        assert_eq!(loaded.payment_type, PaymentType::Fiado);
        assert_eq!(loaded.client_id.as_deref(), Some("ana"));

        let items = db.sales().get_items(&sale.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit, MeasureUnit::Unit);
        assert_eq!(items[0].quantity, Quantity::from_whole(3));
    }

    #[tokio::test]
    async fn test_duplicate_sale_number_is_a_conflict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        insert_with_items(&mut conn, &fiado_sale(1, "ana", 100, 0), &[])
            .await
            .unwrap();
        let err = insert_with_items(&mut conn, &fiado_sale(1, "ana", 100, 0), &[])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_write_balance_is_version_checked() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let sale = fiado_sale(1, "ana", 1000, 0);
        insert_with_items(&mut conn, &sale, &[]).await.unwrap();

        let paid = Sale {
            amount_paid_cents: 400,
            ..sale.clone()
        };
        assert_eq!(write_balance(&mut conn, &paid).await.unwrap(), 1);
        assert!(write_balance(&mut conn, &paid).await.unwrap_err().is_conflict());

        let reloaded = fetch(&mut conn, &sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.amount_paid_cents, 400);
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn test_paid_above_total_is_rejected_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let sale = fiado_sale(1, "ana", 1000, 0);
        insert_with_items(&mut conn, &sale, &[]).await.unwrap();

        let overpaid = Sale {
            amount_paid_cents: 1500,
            ..sale
        };
        assert!(matches!(
            write_balance(&mut conn, &overpaid).await,
            Err(DbError::CheckViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_outstanding_listing_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let old = fiado_sale(1, "ana", 500, 30);
        let new = fiado_sale(2, "ana", 700, 5);
        let other_client = fiado_sale(3, "beto", 900, 10);
        let settled = Sale {
            is_fiado: false,
            fiado_completed: true,
            amount_paid_cents: 200,
            ..fiado_sale(4, "ana", 200, 20)
        };
        for sale in [&old, &new, &other_client, &settled] {
            insert_with_items(&mut conn, sale, &[]).await.unwrap();
        }

        let oldest = list_outstanding_for_client(&mut conn, "ana", DistributionOrder::OldestFirst)
            .await
            .unwrap();
        let ids: Vec<_> = oldest.iter().map(|s| s.sale_number).collect();
        assert_eq!(ids, vec![1, 2]);

        let newest = list_outstanding_for_client(&mut conn, "ana", DistributionOrder::NewestFirst)
            .await
            .unwrap();
        let ids: Vec<_> = newest.iter().map(|s| s.sale_number).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
