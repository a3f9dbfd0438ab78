//! Risk Management Module
//!
//! Pre-submission checks: daily loss limit, per-symbol position caps and
//! order-rate limiting through a sliding-window counter.

mod gate;
mod window;

pub use gate::{RiskGate, RiskViolation};
pub use window::SlidingWindowCounter;
