//! Venue gateway abstraction.

use async_trait::async_trait;
use thiserror::Error;

use crate::orders::OrderId;
use crate::types::SubmitOrder;

/// Errors from the venue gateway.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Worth retrying: connectivity blips, throttling, venue busy
    #[error("Transient gateway failure: {0}")]
    Transient(String),

    /// Not worth retrying: malformed request, unknown instrument, session
    /// rejected
    #[error("Permanent gateway failure: {0}")]
    Permanent(String),
}

impl GatewayError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Order entry endpoint at the trading venue.
///
/// Implementations wrap the venue session (or a paper-trading simulator in
/// tests). Fills and cancel acknowledgments come back asynchronously through
/// the fill queue, not through these return values.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Place a new order at the venue.
    async fn submit_order(&self, order: &SubmitOrder) -> Result<(), GatewayError>;

    /// Request cancellation of a resting order.
    async fn cancel_order(&self, order_id: &OrderId, symbol: &str) -> Result<(), GatewayError>;
}
