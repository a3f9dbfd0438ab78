//! Fill Reconciliation Module
//!
//! Consumes fill reports from the gateway, updates the order ledger and the
//! position books, appends realized PnL, and decides whether a partially
//! filled order should chase the market.

mod reconciler;

pub use reconciler::{FillDecision, FillReconciler, PartialFillTracking, ReconcileError};
