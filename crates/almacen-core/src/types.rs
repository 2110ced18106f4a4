//! # Domain Types
//!
//! Core domain types of the reconciliation engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │   Operation     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  kind, pesable  │   │  sale_number    │   │  sale_id (FK)   │       │
//! │  │  stock_units    │   │  total_cents    │   │  operation_type │       │
//! │  │  stock_packages │   │  amount_paid    │   │  items[]        │       │
//! │  │  stock_kg       │   │  is_fiado ...   │   │  (append-only)  │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ 1..n                                  │
//! │                        ┌────────┴────────┐                              │
//! │                        │    SaleItem     │                              │
//! │                        │  quantity, unit │                              │
//! │                        │  unit_price     │                              │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Names
//! Enum values serialize with the store's Spanish vocabulary
//! (`contado`, `fiado`, `unidad`, `paquete`, `kg`, `anulacion_parcial`, ...)
//! so request handlers and stored rows share one spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Product Kind & Measure Unit
// =============================================================================

/// Selling mode of a product (`tipo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    /// Sold by loose unit only.
    Unit,
    /// Sold by whole package, or by loose unit opened from packages.
    Package,
    /// Sold by weight.
    Weight,
}

/// Unit a quantity is expressed in (`unidad_medida`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum MeasureUnit {
    #[serde(rename = "unidad")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "unidad"))]
    Unit,
    #[serde(rename = "paquete")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "paquete"))]
    Package,
    #[serde(rename = "kg")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "kg"))]
    Kilogram,
}

impl MeasureUnit {
    /// Units and packages are counted; only kilograms may be fractional.
    #[inline]
    pub const fn requires_whole(&self) -> bool {
        matches!(self, MeasureUnit::Unit | MeasureUnit::Package)
    }
}

impl std::fmt::Display for MeasureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasureUnit::Unit => write!(f, "unidad"),
            MeasureUnit::Package => write!(f, "paquete"),
            MeasureUnit::Kilogram => write!(f, "kg"),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product whose stock the engine keeps.
///
/// Package products carry loose-unit stock and package stock at the same
/// time; both are authoritative and are reconciled together on every
/// unit-mode sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, used in logs and error context.
    pub name: String,

    /// Selling mode.
    pub kind: ProductKind,

    /// Sold by weight even if nominally packaged.
    pub pesable: bool,

    /// Loose units on hand (`stock_unidades`).
    pub stock_units: i64,

    /// Sealed packages on hand (`stock_paquetes`).
    pub stock_packages: i64,

    /// Weight on hand (`stock_kg`).
    pub stock_kg: Quantity,

    /// Units inside one package (package products only).
    pub units_per_package: Option<i64>,

    /// Optimistic-concurrency counter, bumped on every stock write.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Checks whether this product can be sold or credited in `unit`.
    ///
    /// ## Rules
    /// ```text
    /// kg       ← kind = weight, or pesable
    /// paquete  ← kind = package
    /// unidad   ← kind = unit, or kind = package and not pesable
    /// ```
    pub fn accepts(&self, unit: MeasureUnit) -> bool {
        match unit {
            MeasureUnit::Kilogram => self.kind == ProductKind::Weight || self.pesable,
            MeasureUnit::Package => self.kind == ProductKind::Package,
            MeasureUnit::Unit => match self.kind {
                ProductKind::Unit => true,
                ProductKind::Package => !self.pesable,
                ProductKind::Weight => false,
            },
        }
    }
}

// =============================================================================
// Payment Type
// =============================================================================

/// How a sale is paid (`tipo_pago`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PaymentType {
    /// Paid in full at the counter.
    #[serde(rename = "contado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "contado"))]
    Cash,
    /// Store credit owed by a client.
    #[serde(rename = "fiado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "fiado"))]
    Fiado,
}

// =============================================================================
// Sale
// =============================================================================

/// A completed sale.
///
/// Only `total_cents`, `amount_paid_cents` and the fiado flags change after
/// checkout. `fiado_completed` implies `!is_fiado`; `was_fiado` stays set
/// once a sale has ever been credit, so settled debts remain
/// distinguishable from cash sales.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-facing sequential number (`numero_venta`).
    pub sale_number: i64,
    pub total_cents: i64,
    pub payment_type: PaymentType,
    pub is_fiado: bool,
    pub fiado_completed: bool,
    pub was_fiado: bool,
    /// `monto_pagado`.
    pub amount_paid_cents: i64,
    pub client_id: Option<String>,
    /// Set when this sale was split off another by a partial fiado conversion.
    pub origin_sale_id: Option<String>,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// Unpaid remainder, never negative.
    #[inline]
    pub fn outstanding(&self) -> Money {
        self.total().saturating_sub_to_zero(self.amount_paid())
    }

    /// A credit sale that still has a balance to collect.
    #[inline]
    pub fn is_open_fiado(&self) -> bool {
        self.is_fiado && !self.fiado_completed
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line of a sale, frozen at checkout.
///
/// Only a partial fiado conversion may later reduce `quantity` and
/// `subtotal_cents`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub unit: MeasureUnit,
    pub unit_price_cents: i64,
    /// `round(quantity × unit_price)`.
    pub subtotal_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Value of `qty` of this line at its frozen unit price.
    #[inline]
    pub fn value_of(&self, qty: Quantity) -> Money {
        self.unit_price().for_quantity(qty)
    }
}

// =============================================================================
// Operation
// =============================================================================

/// Kind of ledger entry (`tipo_operacion`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Every remaining quantity of the sale was voided.
    #[serde(rename = "anulacion_completa")]
    FullVoid,
    /// Some remaining quantity was voided.
    #[serde(rename = "anulacion_parcial")]
    PartialVoid,
    /// Quantity reclassified as credit owed by a client.
    #[serde(rename = "conversion_fiado")]
    FiadoConversion,
    /// A payment that left a balance (`abono`).
    #[serde(rename = "abono_parcial")]
    PartialPayment,
    /// The payment that settled the debt.
    #[serde(rename = "cancelacion_fiado")]
    FiadoPayoff,
}

impl OperationType {
    /// Stable wire/storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationType::FullVoid => "anulacion_completa",
            OperationType::PartialVoid => "anulacion_parcial",
            OperationType::FiadoConversion => "conversion_fiado",
            OperationType::PartialPayment => "abono_parcial",
            OperationType::FiadoPayoff => "cancelacion_fiado",
        }
    }

    /// Parses a stored name back into a type.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "anulacion_completa" => Some(OperationType::FullVoid),
            "anulacion_parcial" => Some(OperationType::PartialVoid),
            "conversion_fiado" => Some(OperationType::FiadoConversion),
            "abono_parcial" => Some(OperationType::PartialPayment),
            "cancelacion_fiado" => Some(OperationType::FiadoPayoff),
            _ => None,
        }
    }

    /// Whether this entry consumes sale-item quantity.
    pub const fn consumes_quantity(&self) -> bool {
        matches!(
            self,
            OperationType::FullVoid | OperationType::PartialVoid | OperationType::FiadoConversion
        )
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an Operation's `items_anulados` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OperationItem {
    pub sale_item_id: String,
    pub quantity: Quantity,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

/// An immutable ledger entry against a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Operation {
    pub id: String,
    pub sale_id: String,
    pub operation_type: OperationType,
    /// Exactly which quantity of which sale item this entry affects.
    pub items: Vec<OperationItem>,
    /// `total_anulado` for voids/conversions, `monto_operacion` for payments.
    pub amount_cents: i64,
    pub client_id: Option<String>,
    pub reason: Option<String>,
    /// Fiado sale created by a partial conversion. Its quantities were
    /// carved out of the original items rather than left on them.
    pub spawned_sale_id: Option<String>,
    /// Overpayment forgiven when a void reduced the total below what was paid.
    pub absorbed_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Operation {
    /// Quantity this entry takes away from a sale item's remaining quantity.
    ///
    /// Partial conversions already reduced the item itself, so they count
    /// zero here.
    pub fn consumed_from(&self, sale_item_id: &str) -> Quantity {
        if !self.operation_type.consumes_quantity() || self.spawned_sale_id.is_some() {
            return Quantity::zero();
        }

        self.items
            .iter()
            .filter(|line| line.sale_item_id == sale_item_id)
            .map(|line| line.quantity)
            .sum()
    }
}

// =============================================================================
// Engine Inputs
// =============================================================================

/// A line of a cart submitted to checkout.
///
/// `unit_price_cents` is already resolved (retail vs wholesale) by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub unit: MeasureUnit,
    pub quantity: Quantity,
    pub unit_price_cents: i64,
}

impl CartLine {
    pub fn new(
        product_id: impl Into<String>,
        unit: MeasureUnit,
        quantity: Quantity,
        unit_price_cents: i64,
    ) -> Self {
        CartLine {
            product_id: product_id.into(),
            unit,
            quantity,
            unit_price_cents,
        }
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_price_cents).for_quantity(self.quantity)
    }

    /// `None` when the line value overflows.
    #[inline]
    pub fn checked_subtotal(&self) -> Option<Money> {
        Money::from_cents(self.unit_price_cents).checked_for_quantity(self.quantity)
    }
}

/// How the customer settles a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentIntent {
    pub payment_type: PaymentType,
    pub client_id: Option<String>,
    /// Partial payment handed over at a fiado checkout.
    pub upfront_cents: Option<i64>,
}

impl PaymentIntent {
    /// Paid in full at the counter.
    pub fn cash() -> Self {
        PaymentIntent {
            payment_type: PaymentType::Cash,
            client_id: None,
            upfront_cents: None,
        }
    }

    /// Full amount on the client's book.
    pub fn fiado(client_id: impl Into<String>) -> Self {
        PaymentIntent {
            payment_type: PaymentType::Fiado,
            client_id: Some(client_id.into()),
            upfront_cents: None,
        }
    }

    /// On the book with part paid now.
    pub fn fiado_with_upfront(client_id: impl Into<String>, upfront_cents: i64) -> Self {
        PaymentIntent {
            payment_type: PaymentType::Fiado,
            client_id: Some(client_id.into()),
            upfront_cents: Some(upfront_cents),
        }
    }
}

/// A request to void or convert `quantity` of one sale item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Selection {
    pub sale_item_id: String,
    pub quantity: Quantity,
}

impl Selection {
    pub fn new(sale_item_id: impl Into<String>, quantity: Quantity) -> Self {
        Selection {
            sale_item_id: sale_item_id.into(),
            quantity,
        }
    }
}

/// A line of a supplier delivery.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseLine {
    pub product_id: String,
    pub unit: MeasureUnit,
    pub quantity: Quantity,
}

impl PurchaseLine {
    pub fn new(product_id: impl Into<String>, unit: MeasureUnit, quantity: Quantity) -> Self {
        PurchaseLine {
            product_id: product_id.into(),
            unit,
            quantity,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
