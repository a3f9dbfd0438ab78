//! Authoritative in-memory order state machine.
//!
//! One ledger instance is shared by the tick-evaluation path, the fill
//! reconciliation path and the dispatcher workers. All mutations serialize
//! through a single `RwLock`; readers take cloned snapshots under the same
//! lock so risk checks and the evaluator never see torn state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{Order, OrderId, OrderStatus};

/// Errors from ledger operations.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order already tracked: {0}")]
    DuplicateOrder(OrderId),

    #[error("Invalid state transition for order {0}: {1} -> {2}")]
    InvalidTransition(OrderId, OrderStatus, OrderStatus),

    #[error("Fill of {qty} exceeds remaining volume {remaining} on order {order_id}")]
    FillExceedsVolume {
        order_id: OrderId,
        qty: u64,
        remaining: u64,
    },
}

/// Thread-safe order ledger.
///
/// The ledger's view may lag the venue's authoritative state; periodic
/// reconciliation against venue-reported status happens externally.
#[derive(Clone)]
pub struct OrderLedger {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    /// Seconds to keep terminal orders for late updates and audit
    retention_secs: u64,
}

impl OrderLedger {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            retention_secs,
        }
    }

    /// Accept a Pending order into the ledger and mark it Submitted.
    ///
    /// Risk checks run before this call; an order that reaches `submit` has
    /// already passed the gate.
    pub async fn submit(&self, mut order: Order) -> Result<Order, LedgerError> {
        if order.status != OrderStatus::Pending {
            return Err(LedgerError::InvalidTransition(
                order.id.clone(),
                order.status,
                OrderStatus::Submitted,
            ));
        }

        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(LedgerError::DuplicateOrder(order.id));
        }

        order.status = OrderStatus::Submitted;
        order.last_update_time = Utc::now();
        orders.insert(order.id.clone(), order.clone());
        debug!(
            order_id = %order.id,
            symbol = %order.symbol,
            direction = %order.direction,
            offset = %order.offset,
            price = %order.price,
            volume = order.volume,
            "Order submitted to ledger"
        );
        Ok(order)
    }

    /// Apply a fill: accumulate `filled_volume`, update the volume-weighted
    /// average fill price and transition to PartialFilled or FullyFilled.
    ///
    /// A fill that would exceed the declared volume is rejected without
    /// mutating the order, since it means ledger and venue have diverged.
    pub async fn apply_fill(
        &self,
        id: &OrderId,
        qty: u64,
        price: Decimal,
    ) -> Result<Order, LedgerError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| LedgerError::OrderNotFound(id.clone()))?;

        if !order.status.may_fill() {
            warn!(
                order_id = %id,
                status = %order.status,
                "Fill received for order that cannot fill"
            );
            return Err(LedgerError::InvalidTransition(
                id.clone(),
                order.status,
                OrderStatus::PartialFilled,
            ));
        }

        let remaining = order.remaining_volume();
        if qty > remaining {
            return Err(LedgerError::FillExceedsVolume {
                order_id: id.clone(),
                qty,
                remaining,
            });
        }

        let prev_filled = Decimal::from(order.filled_volume);
        let fill_qty = Decimal::from(qty);
        let new_filled = prev_filled + fill_qty;
        order.avg_fill_price = Some(match order.avg_fill_price {
            Some(avg) => (avg * prev_filled + price * fill_qty) / new_filled,
            None => price,
        });
        order.filled_volume += qty;

        let old_status = order.status;
        order.status = if order.remaining_volume() == 0 {
            OrderStatus::FullyFilled
        } else {
            OrderStatus::PartialFilled
        };
        order.last_update_time = Utc::now();

        info!(
            order_id = %id,
            symbol = %order.symbol,
            old_status = %old_status,
            new_status = %order.status,
            fill_qty = qty,
            fill_price = %price,
            filled = order.filled_volume,
            volume = order.volume,
            "Fill applied"
        );
        Ok(order.clone())
    }

    /// Mark a cancel request as in flight.
    ///
    /// Idempotency guard: returns `Ok(false)` if the order is already
    /// CancelSubmitted, so a second intent racing the evaluator produces no
    /// duplicate cancel command. Fills arriving while CancelSubmitted still
    /// apply via [`apply_fill`](Self::apply_fill).
    pub async fn mark_cancel_submitted(&self, id: &OrderId) -> Result<bool, LedgerError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| LedgerError::OrderNotFound(id.clone()))?;

        match order.status {
            OrderStatus::CancelSubmitted => {
                debug!(order_id = %id, "Cancel already in flight, ignoring duplicate intent");
                Ok(false)
            }
            OrderStatus::Submitted | OrderStatus::PartialFilled => {
                let old_status = order.status;
                order.status = OrderStatus::CancelSubmitted;
                order.last_update_time = Utc::now();
                info!(order_id = %id, old_status = %old_status, "Cancel submitted");
                Ok(true)
            }
            status => Err(LedgerError::InvalidTransition(
                id.clone(),
                status,
                OrderStatus::CancelSubmitted,
            )),
        }
    }

    /// Mark an order cancelled (venue acknowledged the cancel).
    pub async fn mark_cancelled(&self, id: &OrderId) -> Result<Order, LedgerError> {
        self.transition_terminal(id, OrderStatus::Cancelled).await
    }

    /// Mark an order rejected, logging the reason for audit.
    pub async fn mark_rejected(&self, id: &OrderId, reason: &str) -> Result<Order, LedgerError> {
        warn!(order_id = %id, reason = reason, "Order rejected");
        self.transition_terminal(id, OrderStatus::Rejected).await
    }

    async fn transition_terminal(
        &self,
        id: &OrderId,
        terminal: OrderStatus,
    ) -> Result<Order, LedgerError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| LedgerError::OrderNotFound(id.clone()))?;

        if order.status.is_terminal() {
            return Err(LedgerError::InvalidTransition(
                id.clone(),
                order.status,
                terminal,
            ));
        }

        let old_status = order.status;
        order.status = terminal;
        order.last_update_time = Utc::now();
        info!(
            order_id = %id,
            symbol = %order.symbol,
            old_status = %old_status,
            new_status = %terminal,
            filled = order.filled_volume,
            "Order reached terminal state"
        );
        Ok(order.clone())
    }

    /// Bump the retry counter after a failed submission attempt.
    pub async fn record_retry(&self, id: &OrderId) -> Result<u32, LedgerError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| LedgerError::OrderNotFound(id.clone()))?;
        order.retry_count += 1;
        order.last_update_time = Utc::now();
        Ok(order.retry_count)
    }

    /// Get a snapshot of one order.
    pub async fn get(&self, id: &OrderId) -> Option<Order> {
        let orders = self.orders.read().await;
        orders.get(id).cloned()
    }

    /// Snapshot of resting orders (Submitted ∪ PartialFilled) for a symbol.
    pub async fn pending_for_symbol(&self, symbol: &str) -> Vec<Order> {
        let orders = self.orders.read().await;
        orders
            .values()
            .filter(|o| o.symbol == symbol && o.status.is_resting())
            .cloned()
            .collect()
    }

    /// Snapshot of every tracked order, for the queryable ledger view.
    pub async fn snapshot(&self) -> Vec<Order> {
        let orders = self.orders.read().await;
        orders.values().cloned().collect()
    }

    /// Count of non-terminal orders.
    #[must_use]
    pub async fn active_count(&self) -> usize {
        let orders = self.orders.read().await;
        orders.values().filter(|o| !o.is_terminal()).count()
    }

    /// Remove terminal orders older than the retention period.
    ///
    /// Returns the number archived. Call periodically to bound memory.
    pub async fn archive_terminal(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.retention_secs as i64);
        let mut orders = self.orders.write().await;

        let to_remove: Vec<OrderId> = orders
            .iter()
            .filter(|(_, o)| o.is_terminal() && o.last_update_time < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        let removed = to_remove.len();
        for id in &to_remove {
            orders.remove(id);
        }
        if removed > 0 {
            debug!(count = removed, "Archived terminal orders");
        }
        removed
    }
}

impl Default for OrderLedger {
    fn default() -> Self {
        Self::new(3600)
    }
}
