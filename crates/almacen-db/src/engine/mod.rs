//! # Engine
//!
//! Transactional services built on the repositories and the pure
//! arithmetic in `almacen-core`.
//!
//! ## Components (leaf first)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StockLedger         reserve / credit / receive_purchase               │
//! │       ▲                                                                 │
//! │  SaleProcessor       checkout                                           │
//! │       ▲                                                                 │
//! │  ReversalLedger      void / convert_to_credit / remaining_quantity     │
//! │                                                                         │
//! │  DebtAccount         register_payment / client_balance                 │
//! │       ▲                                                                 │
//! │  PaymentDistributor  pay_across_sales                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Transaction per Call
//! Every public operation opens one transaction, reads what it needs,
//! writes with version checks and commits. Any error drops the transaction
//! (rolling back every write of the call). Conflicts are retried from the
//! top by [`retry::with_retry`].

pub mod checkout;
pub mod debt;
pub mod distributor;
pub mod retry;
pub mod reversal;
pub mod stock;
