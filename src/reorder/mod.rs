//! Cancel/Reorder Module
//!
//! Per-tick re-evaluation of resting orders: stale or badly priced orders
//! produce cancel/reorder intents for the dispatcher.

mod evaluator;
mod intent;

pub use evaluator::CancelReorderEvaluator;
pub use intent::{CancelReorderIntent, ReorderReason};
