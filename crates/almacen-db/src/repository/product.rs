//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Two Levels
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fetch / write_stock / insert      (&mut SqliteConnection)              │
//! │    Run inside the caller's transaction. The engine uses these.         │
//! │                                                                         │
//! │  ProductRepository                 (SqlitePool)                         │
//! │    Catalog reads and inserts outside any engine operation.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Version-Checked Stock Writes
//! ```text
//! UPDATE products SET stock_... , version = version + 1
//! WHERE id = ? AND version = ?      ← version read earlier in this tx
//!
//! 0 rows → someone else wrote first → DbError::Conflict → retry
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use almacen_core::validation::validate_product_name;
use almacen_core::{CoreError, Product, ProductKind, Quantity, StockLevels};

const SELECT_PRODUCT: &str = r#"
    SELECT
        id, name, kind, pesable,
        stock_units, stock_packages, stock_kg, units_per_package,
        version, created_at, updated_at
    FROM products
"#;

// =============================================================================
// Transaction-Level Operations
// =============================================================================

/// Loads a product inside the caller's transaction.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(product)
}

/// Writes new stock levels if nobody changed the product since it was read.
///
/// ## Returns
/// The product's new version.
pub async fn write_stock(
    conn: &mut SqliteConnection,
    product: &Product,
    levels: &StockLevels,
) -> DbResult<i64> {
    debug!(
        id = %product.id,
        units = levels.units,
        packages = levels.packages,
        kg = %levels.kg,
        version = product.version,
        "Writing stock"
    );

    let result = sqlx::query(
        r#"
        UPDATE products SET
            stock_units = ?3,
            stock_packages = ?4,
            stock_kg = ?5,
            updated_at = ?6,
            version = version + 1
        WHERE id = ?1 AND version = ?2
        "#,
    )
    .bind(&product.id)
    .bind(product.version)
    .bind(levels.units)
    .bind(levels.packages)
    .bind(levels.kg)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("Product", &product.id));
    }

    Ok(product.version + 1)
}

/// Inserts a product inside the caller's transaction.
pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, kind = ?product.kind, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, kind, pesable,
            stock_units, stock_packages, stock_kg, units_per_package,
            version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(product.kind)
    .bind(product.pesable)
    .bind(product.stock_units)
    .bind(product.stock_packages)
    .bind(product.stock_kg)
    .bind(product.units_per_package)
    .bind(product.version)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// New Product
// =============================================================================

/// Catalog entry for a product that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub kind: ProductKind,
    pub pesable: bool,
    pub units_per_package: Option<i64>,
    pub stock_units: i64,
    pub stock_packages: i64,
    pub stock_kg: Quantity,
}

impl NewProduct {
    /// Sold by loose unit.
    pub fn unit(name: impl Into<String>, stock_units: i64) -> Self {
        NewProduct {
            name: name.into(),
            kind: ProductKind::Unit,
            pesable: false,
            units_per_package: None,
            stock_units,
            stock_packages: 0,
            stock_kg: Quantity::zero(),
        }
    }

    /// Sold by package or by loose units opened from packages.
    pub fn package(
        name: impl Into<String>,
        units_per_package: i64,
        stock_units: i64,
        stock_packages: i64,
    ) -> Self {
        NewProduct {
            name: name.into(),
            kind: ProductKind::Package,
            pesable: false,
            units_per_package: Some(units_per_package),
            stock_units,
            stock_packages,
            stock_kg: Quantity::zero(),
        }
    }

    /// Sold by weight.
    pub fn weight(name: impl Into<String>, stock_kg: Quantity) -> Self {
        NewProduct {
            name: name.into(),
            kind: ProductKind::Weight,
            pesable: true,
            units_per_package: None,
            stock_units: 0,
            stock_packages: 0,
            stock_kg,
        }
    }

    /// Checks the catalog rules a product must satisfy before it is stored.
    fn validate(&self) -> Result<(), CoreError> {
        validate_product_name(&self.name)?;

        let invalid = |reason: &str| CoreError::InvalidProduct {
            product: self.name.clone(),
            reason: reason.to_string(),
        };

        match (self.kind, self.units_per_package) {
            (ProductKind::Package, Some(n)) if n > 0 => {}
            (ProductKind::Package, _) => return Err(invalid("units_per_package must be positive")),
            (_, Some(_)) => return Err(invalid("only package products have units_per_package")),
            _ => {}
        }

        if self.stock_units < 0 || self.stock_packages < 0 || self.stock_kg.is_negative() {
            return Err(invalid("stock cannot be negative"));
        }

        Ok(())
    }

    fn into_product(self) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            kind: self.kind,
            pesable: self.pesable,
            stock_units: self.stock_units,
            stock_packages: self.stock_packages,
            stock_kg: self.stock_kg,
            units_per_package: self.units_per_package,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Pool-Level Repository
// =============================================================================

/// Repository for product reads and catalog inserts.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Validates and stores a new product.
    pub async fn create(&self, new: NewProduct) -> Result<Product, crate::error::LedgerError> {
        new.validate()?;
        let product = new.into_product();

        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, &product).await?;

        Ok(product)
    }

    /// Lists products by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "{SELECT_PRODUCT} ORDER BY name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts products (for diagnostics and the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
