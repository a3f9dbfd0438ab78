//! Per-tick evaluation of resting orders.
//!
//! Runs once per incoming tick over the resting orders on that tick's
//! symbol. Each order produces zero or one intent per tick; when several
//! rules fire, the highest-priority reason wins deterministically (the
//! earlier sequential-overwrite behavior was ambiguous).

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::intent::{CancelReorderIntent, ReorderReason};
use crate::config::TrackingConfig;
use crate::orders::{Order, OrderLedger};
use crate::types::MarketTick;

/// Buy reorders land slightly above market, sell reorders slightly below,
/// to improve queue position at the venue.
const BUY_REPRICE_FACTOR: Decimal = Decimal::from_parts(1001, 0, 0, false, 3); // 1.001
const SELL_REPRICE_FACTOR: Decimal = Decimal::from_parts(999, 0, 0, false, 3); // 0.999

/// Evaluates resting orders against each tick and emits cancel/reorder
/// intents into the dispatcher's queue.
pub struct CancelReorderEvaluator {
    ledger: Arc<OrderLedger>,
    config: TrackingConfig,
    intent_tx: mpsc::Sender<CancelReorderIntent>,
}

impl CancelReorderEvaluator {
    pub fn new(
        ledger: Arc<OrderLedger>,
        config: TrackingConfig,
        intent_tx: mpsc::Sender<CancelReorderIntent>,
    ) -> Self {
        Self {
            ledger,
            config,
            intent_tx,
        }
    }

    /// Evaluate all resting orders on the tick's symbol. Returns the
    /// intents that were queued.
    pub async fn on_tick(&self, tick: &MarketTick) -> Vec<CancelReorderIntent> {
        let pending = self.ledger.pending_for_symbol(&tick.symbol).await;
        let mut queued = Vec::new();

        for order in &pending {
            let Some(intent) = self.evaluate(order, tick) else {
                continue;
            };
            debug!(
                order_id = %intent.order_id,
                reason = %intent.reason,
                new_price = %intent.new_price,
                "Cancel/reorder intent"
            );
            match self.intent_tx.try_send(intent.clone()) {
                Ok(()) => queued.push(intent),
                Err(mpsc::error::TrySendError::Full(intent)) => {
                    // A later tick will re-evaluate; dropping beats
                    // blocking the market-data path.
                    warn!(
                        order_id = %intent.order_id,
                        symbol = %tick.symbol,
                        "Dropping intent: cancel/reorder queue full"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(intent)) => {
                    warn!(
                        order_id = %intent.order_id,
                        "Cancel/reorder queue closed, dispatcher gone"
                    );
                }
            }
        }
        queued
    }

    /// Apply the rules to one order. Zero or one intent per order per tick.
    fn evaluate(&self, order: &Order, tick: &MarketTick) -> Option<CancelReorderIntent> {
        if order.price.is_zero() {
            return None;
        }
        let price_deviation = (tick.price - order.price).abs() / order.price;
        let elapsed_secs = (tick.timestamp - order.submit_time).num_milliseconds() as f64 / 1000.0;

        let mut best: Option<(ReorderReason, Decimal)> = None;
        let mut consider = |reason: ReorderReason, new_price: Decimal| {
            let better = best
                .map(|(current, _)| reason.priority() > current.priority())
                .unwrap_or(true);
            if better {
                best = Some((reason, new_price));
            }
        };

        if order.volume > self.config.large_order_threshold
            && elapsed_secs > self.config.time_threshold_secs as f64 * 0.5
        {
            consider(ReorderReason::LargeOrderTimeout, tick.price);
        }
        if elapsed_secs > self.config.time_threshold_secs as f64 {
            consider(ReorderReason::TimeThreshold, tick.price);
        }
        if price_deviation > self.config.price_tolerance {
            let new_price = if order.direction.is_buy() {
                tick.price * BUY_REPRICE_FACTOR
            } else {
                tick.price * SELL_REPRICE_FACTOR
            };
            consider(ReorderReason::PriceDeviation, new_price);
        }

        best.map(|(reason, new_price)| {
            CancelReorderIntent::new(order.id.clone(), order.symbol.clone(), new_price, reason)
        })
    }
}
