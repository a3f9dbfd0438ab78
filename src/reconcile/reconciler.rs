//! Fill report reconciliation.
//!
//! Every fill flows through one reconciliation path so fills for a given
//! order apply in the order received. Each fill updates the per-order
//! tracking record, the order ledger and the position books; the remainder
//! of a partial fill is then judged by the fill-rate policy.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::FillPolicyConfig;
use crate::orders::{LedgerError, OrderId, OrderLedger, OrderStatus};
use crate::pnl::PnlCalculator;
use crate::positions::{AccountingError, Execution, PositionAccountingEngine};
use crate::reorder::{CancelReorderIntent, ReorderReason};
use crate::types::{FillReport, MarketTick};

/// Errors from reconciling a fill report.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The ledger does not know the order: local state and venue have
    /// diverged. Logged and surfaced, never auto-corrected.
    #[error("Fill for unknown order {0}: ledger out of sync with venue")]
    UnknownOrder(OrderId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Accounting(#[from] AccountingError),
}

/// Per-order fill progress, keyed by order id.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFillTracking {
    pub order_id: OrderId,
    pub symbol: String,
    pub total_volume: u64,
    pub filled_volume: u64,
    pub remaining_volume: u64,
    pub avg_price: Decimal,
    pub status: OrderStatus,
}

/// What the fill-rate policy decided for the unfilled remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillDecision {
    /// Order fully filled, nothing resting
    Complete,
    /// Fill rate below the low threshold: reorder at the fill price
    ChaseLowFillRate,
    /// Market moved away in the middle band: reorder at market
    ChasePriceMoved,
    /// Leave the remainder resting
    Hold,
}

/// Reconciles gateway fill reports into the shared ledgers.
pub struct FillReconciler {
    ledger: Arc<OrderLedger>,
    positions: Arc<PositionAccountingEngine>,
    pnl: Arc<PnlCalculator>,
    config: FillPolicyConfig,
    tracking: DashMap<OrderId, PartialFillTracking>,
    last_price: DashMap<String, Decimal>,
    intent_tx: mpsc::Sender<CancelReorderIntent>,
}

impl FillReconciler {
    pub fn new(
        ledger: Arc<OrderLedger>,
        positions: Arc<PositionAccountingEngine>,
        pnl: Arc<PnlCalculator>,
        config: FillPolicyConfig,
        intent_tx: mpsc::Sender<CancelReorderIntent>,
    ) -> Self {
        Self {
            ledger,
            positions,
            pnl,
            config,
            tracking: DashMap::new(),
            last_price: DashMap::new(),
            intent_tx,
        }
    }

    /// Record the latest market price for the decision policy. Called from
    /// the tick path.
    pub fn update_market_price(&self, tick: &MarketTick) {
        self.last_price.insert(tick.symbol.clone(), tick.price);
    }

    /// Reconcile one fill report end to end.
    pub async fn on_fill(&self, fill: &FillReport) -> Result<FillDecision, ReconcileError> {
        let order = self
            .ledger
            .get(&fill.order_id)
            .await
            .ok_or_else(|| {
                warn!(
                    order_id = %fill.order_id,
                    symbol = %fill.symbol,
                    qty = fill.qty,
                    price = %fill.price,
                    "Fill for order the ledger does not track"
                );
                ReconcileError::UnknownOrder(fill.order_id.clone())
            })?;

        // Ledger first: it enforces the volume bound and state transitions.
        let updated = self
            .ledger
            .apply_fill(&fill.order_id, fill.qty, fill.price)
            .await?;

        let record = self.track_fill(fill, updated.volume);

        // Forward to the position books with the order's direction/offset.
        let realized = self
            .positions
            .apply_fill(&Execution {
                symbol: fill.symbol.clone(),
                direction: order.direction,
                offset: order.offset,
                price: fill.price,
                qty: fill.qty,
                timestamp: fill.timestamp,
            })
            .await?;
        if let Some(realized) = realized {
            self.pnl.record_realized(realized).await;
        }

        let decision = self.decide(&record, fill).await;
        debug!(
            order_id = %fill.order_id,
            filled = record.filled_volume,
            total = record.total_volume,
            decision = ?decision,
            "Fill reconciled"
        );
        Ok(decision)
    }

    /// Upsert the per-order tracking record. A new record seeds its total
    /// from the order's declared volume.
    fn track_fill(&self, fill: &FillReport, total_volume: u64) -> PartialFillTracking {
        let mut entry = self
            .tracking
            .entry(fill.order_id.clone())
            .or_insert_with(|| PartialFillTracking {
                order_id: fill.order_id.clone(),
                symbol: fill.symbol.clone(),
                total_volume,
                filled_volume: 0,
                remaining_volume: total_volume,
                avg_price: Decimal::ZERO,
                status: OrderStatus::PartialFilled,
            });

        let prev_filled = Decimal::from(entry.filled_volume);
        let fill_qty = Decimal::from(fill.qty);
        let new_filled = entry.filled_volume + fill.qty;
        entry.avg_price = if entry.filled_volume == 0 {
            fill.price
        } else {
            (entry.avg_price * prev_filled + fill.price * fill_qty) / Decimal::from(new_filled)
        };
        entry.filled_volume = new_filled;
        entry.remaining_volume = entry.total_volume.saturating_sub(new_filled);
        entry.status = if entry.remaining_volume == 0 {
            OrderStatus::FullyFilled
        } else {
            OrderStatus::PartialFilled
        };
        entry.clone()
    }

    /// The fill-rate decision policy for the unfilled remainder.
    ///
    /// A fill rate of exactly 0.3 does NOT chase (strict `<` on the low
    /// boundary); exactly 0.7 still consults the market.
    async fn decide(&self, record: &PartialFillTracking, fill: &FillReport) -> FillDecision {
        if record.remaining_volume == 0 {
            return FillDecision::Complete;
        }

        let fill_rate = Decimal::from(record.filled_volume) / Decimal::from(record.total_volume);

        if fill_rate < self.config.low_fill_rate {
            info!(
                order_id = %fill.order_id,
                fill_rate = %fill_rate,
                "Low fill rate, chasing at fill price"
            );
            self.send_intent(CancelReorderIntent::new(
                fill.order_id.clone(),
                fill.symbol.clone(),
                fill.price,
                ReorderReason::LowFillRate,
            ));
            return FillDecision::ChaseLowFillRate;
        }

        if fill_rate <= self.config.high_fill_rate {
            let Some(market) = self.last_price.get(&fill.symbol).map(|p| *p) else {
                return FillDecision::Hold;
            };
            if fill.price.is_zero() {
                return FillDecision::Hold;
            }
            let diff = (market - fill.price).abs() / fill.price;
            if diff > self.config.price_moved_tolerance {
                info!(
                    order_id = %fill.order_id,
                    fill_price = %fill.price,
                    market = %market,
                    "Market moved away from partial fill, chasing at market"
                );
                self.send_intent(CancelReorderIntent::new(
                    fill.order_id.clone(),
                    fill.symbol.clone(),
                    market,
                    ReorderReason::PriceMoved,
                ));
                return FillDecision::ChasePriceMoved;
            }
        }

        FillDecision::Hold
    }

    fn send_intent(&self, intent: CancelReorderIntent) {
        if let Err(e) = self.intent_tx.try_send(intent) {
            warn!(error = %e, "Failed to queue cancel/reorder intent from fill policy");
        }
    }

    /// Snapshot of one order's fill tracking record.
    pub fn tracking(&self, id: &OrderId) -> Option<PartialFillTracking> {
        self.tracking.get(id).map(|r| r.clone())
    }
}
