//! # Operation Repository
//!
//! The append-only ledger of voids, conversions and payments.
//!
//! ## Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  operations                                                             │
//! │  ────────────────────────────────────────────────────────────────────   │
//! │  id | sale_id | operation_type | items_json | amount_cents | ...        │
//! │                                                                         │
//! │  items_json = [{"sale_item_id": "...", "quantity": 2000,                │
//! │                 "unit_price_cents": 150, "subtotal_cents": 300}]        │
//! │                                                                         │
//! │  UPDATE / DELETE → trigger aborts ("operations are append-only")       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are written inside the same transaction as the stock and balance
//! writes they describe. Remaining quantities are derived from these rows,
//! so there is no insert-only-if-absent path and no update path.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use almacen_core::{Operation, OperationItem, OperationType};

/// Generates a new operation ID.
pub fn generate_operation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Raw `operations` row before the type and item list are decoded.
#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    id: String,
    sale_id: String,
    operation_type: String,
    items_json: String,
    amount_cents: i64,
    client_id: Option<String>,
    reason: Option<String>,
    spawned_sale_id: Option<String>,
    absorbed_cents: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OperationRow> for Operation {
    type Error = DbError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let operation_type =
            OperationType::parse(&row.operation_type).ok_or_else(|| DbError::Corrupt {
                entity: "Operation".to_string(),
                id: row.id.clone(),
                reason: format!("unknown operation_type '{}'", row.operation_type),
            })?;

        let items: Vec<OperationItem> =
            serde_json::from_str(&row.items_json).map_err(|e| DbError::Corrupt {
                entity: "Operation".to_string(),
                id: row.id.clone(),
                reason: format!("items_json: {e}"),
            })?;

        Ok(Operation {
            id: row.id,
            sale_id: row.sale_id,
            operation_type,
            items,
            amount_cents: row.amount_cents,
            client_id: row.client_id,
            reason: row.reason,
            spawned_sale_id: row.spawned_sale_id,
            absorbed_cents: row.absorbed_cents,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Transaction-Level Operations
// =============================================================================

/// Full Operation history of a sale, oldest first.
pub async fn list_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<Operation>> {
    let rows = sqlx::query_as::<_, OperationRow>(
        r#"
        SELECT
            id, sale_id, operation_type, items_json, amount_cents,
            client_id, reason, spawned_sale_id, absorbed_cents, created_at
        FROM operations
        WHERE sale_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(sale_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(Operation::try_from).collect()
}

/// Appends an Operation.
pub async fn insert(conn: &mut SqliteConnection, operation: &Operation) -> DbResult<()> {
    debug!(
        id = %operation.id,
        sale_id = %operation.sale_id,
        operation_type = %operation.operation_type,
        amount_cents = operation.amount_cents,
        lines = operation.items.len(),
        "Appending operation"
    );

    let items_json = serde_json::to_string(&operation.items)
        .map_err(|e| DbError::Internal(format!("serialize operation items: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO operations (
            id, sale_id, operation_type, items_json, amount_cents,
            client_id, reason, spawned_sale_id, absorbed_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&operation.id)
    .bind(&operation.sale_id)
    .bind(operation.operation_type.as_str())
    .bind(items_json)
    .bind(operation.amount_cents)
    .bind(&operation.client_id)
    .bind(&operation.reason)
    .bind(&operation.spawned_sale_id)
    .bind(operation.absorbed_cents)
    .bind(operation.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Pool-Level Repository
// =============================================================================

/// Read access to the Operation ledger.
#[derive(Debug, Clone)]
pub struct OperationRepository {
    pool: SqlitePool,
}

impl OperationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OperationRepository { pool }
    }

    /// Operation history of a sale, oldest first.
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<Operation>> {
        let mut conn = self.pool.acquire().await?;
        list_for_sale(&mut conn, sale_id).await
    }

    /// Payments and conversions recorded for a client, newest first.
    pub async fn list_for_client(&self, client_id: &str, limit: u32) -> DbResult<Vec<Operation>> {
        let rows = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT
                id, sale_id, operation_type, items_json, amount_cents,
                client_id, reason, spawned_sale_id, absorbed_cents, created_at
            FROM operations
            WHERE client_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Operation::try_from).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM operations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
