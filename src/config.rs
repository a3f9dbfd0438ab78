//! Configuration structs bridging deployment settings to domain components.
//!
//! These structs decouple tuning parameters from the business logic so
//! components can be constructed with validated, typed configurations.

use rust_decimal::Decimal;

/// Configuration for the cancel/reorder evaluator.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Relative price deviation that triggers a reprice (e.g. 0.02 = 2%)
    pub price_tolerance: Decimal,
    /// Resting time before an order is repriced at market (seconds)
    pub time_threshold_secs: i64,
    /// Volume above which an order gets the shortened timeout
    pub large_order_threshold: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            price_tolerance: Decimal::new(2, 2), // 0.02
            time_threshold_secs: 30,
            large_order_threshold: 10,
        }
    }
}

/// Configuration for the partial-fill decision policy.
#[derive(Debug, Clone)]
pub struct FillPolicyConfig {
    /// Below this fill rate the remainder is cancelled and re-sent
    pub low_fill_rate: Decimal,
    /// Above this fill rate the order is left resting
    pub high_fill_rate: Decimal,
    /// Relative market move that triggers a reprice in the middle band
    pub price_moved_tolerance: Decimal,
}

impl Default for FillPolicyConfig {
    fn default() -> Self {
        Self {
            low_fill_rate: Decimal::new(3, 1),          // 0.3
            high_fill_rate: Decimal::new(7, 1),         // 0.7
            price_moved_tolerance: Decimal::new(1, 2),  // 0.01
        }
    }
}

/// Configuration for pre-submission risk checks.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Maximum tolerated daily loss, as a positive magnitude
    pub max_daily_loss: Decimal,
    /// Maximum open volume per symbol
    pub max_position_per_symbol: u64,
    /// Maximum order submissions in a one-minute sliding window
    pub max_order_frequency: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: Decimal::new(10_000, 0),
            max_position_per_symbol: 50,
            max_order_frequency: 100,
        }
    }
}

impl RiskConfig {
    /// Conservative limits for paper trading.
    pub fn paper_trading() -> Self {
        Self {
            max_daily_loss: Decimal::new(1_000, 0),
            max_position_per_symbol: 5,
            max_order_frequency: 20,
        }
    }
}

/// Configuration for the work-queue dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Capacity of each of the three work queues
    pub queue_capacity: usize,
    /// Dequeue timeout so worker loops observe shutdown (milliseconds)
    pub poll_timeout_ms: u64,
    /// Resubmission attempts before a failed order is rejected
    pub max_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            poll_timeout_ms: 1_000,
            max_retries: 3,
        }
    }
}
