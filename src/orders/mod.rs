//! Order Management Module
//!
//! Authoritative tracking of every order's lifecycle.
//!
//! # Architecture
//!
//! - `OrderLedger` - thread-safe order state machine, one instance per
//!   process, shared by the evaluator, the reconciler and the dispatcher
//! - Core types - `OrderId`, `OrderStatus`, `Order`

mod ledger;
mod types;

pub use ledger::{LedgerError, OrderLedger};
pub use types::{Order, OrderId, OrderStatus};
