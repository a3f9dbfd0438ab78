//! Cancel/reorder intent types.

use rust_decimal::Decimal;

use crate::orders::OrderId;

/// Why an order should be cancelled and re-sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderReason {
    /// Market moved beyond the price tolerance
    PriceDeviation,
    /// Order rested longer than the time threshold
    TimeThreshold,
    /// Large order rested longer than the shortened threshold
    LargeOrderTimeout,
    /// Partial fill progressing too slowly
    LowFillRate,
    /// Market moved away from a partially filled order
    PriceMoved,
}

impl ReorderReason {
    /// Priority when several rules fire in one evaluation pass; the highest
    /// wins deterministically.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::PriceDeviation => 1,
            Self::TimeThreshold => 2,
            Self::LargeOrderTimeout => 3,
            Self::LowFillRate => 2,
            Self::PriceMoved => 1,
        }
    }
}

impl std::fmt::Display for ReorderReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriceDeviation => write!(f, "price_deviation"),
            Self::TimeThreshold => write!(f, "time_threshold"),
            Self::LargeOrderTimeout => write!(f, "large_order_timeout"),
            Self::LowFillRate => write!(f, "low_fill_rate"),
            Self::PriceMoved => write!(f, "price_moved"),
        }
    }
}

/// Ephemeral request to cancel a resting order and re-send it at a revised
/// price. Valid until superseded by a newer tick's intent for the same
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelReorderIntent {
    pub order_id: OrderId,
    pub symbol: String,
    pub new_price: Decimal,
    pub reason: ReorderReason,
    pub priority: u8,
}

impl CancelReorderIntent {
    pub fn new(order_id: OrderId, symbol: String, new_price: Decimal, reason: ReorderReason) -> Self {
        Self {
            order_id,
            symbol,
            new_price,
            reason,
            priority: reason.priority(),
        }
    }
}
