//! Position Accounting Module
//!
//! FIFO cost-basis ledger per (symbol, direction) with futures-style
//! today/yesterday settlement splitting.
//!
//! # Architecture
//!
//! - `PositionAccountingEngine` - thread-safe FIFO lot books, one instance
//!   per process, fed by the fill reconciliation path
//! - `PositionLot` / `PositionSummary` - the queryable position views
//! - `Execution` - a normalized fill (direction and offset resolved from
//!   the originating order)

mod engine;

pub use engine::{
    AccountingError, Execution, PositionAccountingEngine, PositionLot, PositionSummary,
};
