//! # Repository Module
//!
//! SQL for products, sales and the Operation ledger.
//!
//! ## Two Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine service (one transaction per public operation)                 │
//! │       │                                                                 │
//! │       │  let mut tx = pool.begin().await?;                              │
//! │       │  product::fetch(&mut *tx, id)                                   │
//! │       │  product::write_stock(&mut *tx, &product, &levels)              │
//! │       │  operation::insert(&mut *tx, &op)                               │
//! │       │  tx.commit().await?;                                            │
//! │       ▼                                                                 │
//! │  Free functions over &mut SqliteConnection                              │
//! │                                                                         │
//! │  Reads outside the engine                                               │
//! │       │  db.sales().get_items(sale_id)                                  │
//! │       ▼                                                                 │
//! │  ProductRepository / SaleRepository / OperationRepository (pool)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod operation;
pub mod product;
pub mod sale;
