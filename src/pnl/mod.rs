//! PnL Derivation Module
//!
//! Realized PnL from closed lots, unrealized PnL by marking open positions
//! to the latest tick. Both sides are append-only logs; the combined curve
//! is recomputed on demand from the logs so historical queries reproduce.

mod calculator;

pub use calculator::{PnlCalculator, RealizedPnlRecord, UnrealizedMark};
