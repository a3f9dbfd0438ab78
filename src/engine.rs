//! Top-level order management facade.
//!
//! Owns the shared ledgers, the risk gate, the evaluator, the reconciler
//! and the dispatcher, and wires the queues between them. The strategy
//! layer talks to [`OrderManager`]; the market-data layer feeds
//! [`OrderManager::on_tick`]; the gateway feeds fills through
//! [`OrderManager::fill_sender`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::calendar::TradingCalendar;
use crate::config::{DispatchConfig, FillPolicyConfig, RiskConfig, TrackingConfig};
use crate::dispatch::{DispatchHandles, Gateway, WorkQueueDispatcher};
use crate::orders::{LedgerError, Order, OrderId, OrderLedger};
use crate::pnl::PnlCalculator;
use crate::positions::{AccountingError, PositionAccountingEngine};
use crate::reconcile::FillReconciler;
use crate::reorder::CancelReorderEvaluator;
use crate::risk::{RiskGate, RiskViolation};
use crate::types::{FillReport, MarketTick, NewOrderRequest, OrderAck, OrderReject, SubmitOrder};

/// Why a new-order request did not reach the venue.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Risk(#[from] RiskViolation),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// All tuning knobs for one [`OrderManager`] instance.
#[derive(Debug, Clone, Default)]
pub struct OrderManagerConfig {
    pub tracking: TrackingConfig,
    pub fill_policy: FillPolicyConfig,
    pub risk: RiskConfig,
    pub dispatch: DispatchConfig,
}

/// Facade over the order-lifecycle subsystem.
pub struct OrderManager {
    ledger: Arc<OrderLedger>,
    positions: Arc<PositionAccountingEngine>,
    pnl: Arc<PnlCalculator>,
    risk: RiskGate,
    evaluator: CancelReorderEvaluator,
    reconciler: Arc<FillReconciler>,
    gateway: Arc<dyn Gateway>,
    handles: DispatchHandles,
    id_seq: AtomicU64,
}

impl OrderManager {
    /// Build the subsystem and start the dispatcher workers.
    pub fn new(
        config: OrderManagerConfig,
        calendar: Arc<dyn TradingCalendar>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        let ledger = Arc::new(OrderLedger::default());
        let positions = Arc::new(PositionAccountingEngine::new(calendar));
        let pnl = Arc::new(PnlCalculator::new(positions.clone()));
        let risk = RiskGate::new(config.risk, positions.clone(), pnl.clone());

        let (intent_tx, intent_rx) = mpsc::channel(config.dispatch.queue_capacity);
        let evaluator =
            CancelReorderEvaluator::new(ledger.clone(), config.tracking, intent_tx.clone());
        let reconciler = Arc::new(FillReconciler::new(
            ledger.clone(),
            positions.clone(),
            pnl.clone(),
            config.fill_policy,
            intent_tx,
        ));
        let handles = WorkQueueDispatcher::new(
            config.dispatch,
            ledger.clone(),
            positions.clone(),
            reconciler.clone(),
            gateway.clone(),
        )
        .start(intent_rx);

        Self {
            ledger,
            positions,
            pnl,
            risk,
            evaluator,
            reconciler,
            gateway,
            handles,
            id_seq: AtomicU64::new(1),
        }
    }

    /// Submit a new order: risk gate, close-volume reservation, ledger
    /// registration, then the venue. Gateway failures go to the retry queue
    /// rather than back to the caller.
    pub async fn submit(&self, request: NewOrderRequest) -> Result<Order, SubmitError> {
        self.risk.check(&request).await?;

        let seq = self.id_seq.fetch_add(1, Ordering::Relaxed);
        let id = OrderId::new(format!("ord-{seq}"));

        if request.offset.is_close() {
            self.positions
                .freeze_for_close(
                    &request.symbol,
                    request.direction,
                    request.offset,
                    request.volume,
                )
                .await?;
        }

        let order = Order::new(
            id.clone(),
            request.symbol.clone(),
            request.direction,
            request.offset,
            request.price,
            request.volume,
        );
        let order = match self.ledger.submit(order).await {
            Ok(order) => order,
            Err(e) => {
                if request.offset.is_close() {
                    self.positions
                        .release_frozen(
                            &request.symbol,
                            request.direction,
                            request.offset,
                            request.volume,
                        )
                        .await;
                }
                return Err(e.into());
            }
        };

        let submit = SubmitOrder {
            order_id: id.clone(),
            symbol: request.symbol,
            direction: request.direction,
            offset: request.offset,
            price: request.price,
            volume: request.volume,
        };
        if let Err(e) = self.gateway.submit_order(&submit).await {
            if e.is_transient() {
                warn!(order_id = %id, error = %e, "Submission failed, queuing retry");
                if self.handles.retry_tx.send(submit).await.is_err() {
                    self.ledger.mark_rejected(&id, "retry queue closed").await?;
                }
            } else {
                self.ledger.mark_rejected(&id, &e.to_string()).await?;
                if order.offset.is_close() {
                    self.positions
                        .release_frozen(&order.symbol, order.direction, order.offset, order.volume)
                        .await;
                }
            }
        }
        Ok(order)
    }

    /// Venue acknowledged an order. The ledger already tracks it as
    /// Submitted, so this is an audit event.
    pub async fn on_ack(&self, ack: &OrderAck) {
        debug!(order_id = %ack.order_id, status = %ack.status, "Order acknowledged by venue");
    }

    /// Venue rejected an order: mark it terminal and release any reserved
    /// close volume for the unfilled remainder.
    pub async fn on_reject(&self, reject: &OrderReject) -> Result<(), LedgerError> {
        let order = self
            .ledger
            .mark_rejected(&reject.order_id, &reject.error)
            .await?;
        if order.offset.is_close() {
            self.positions
                .release_frozen(
                    &order.symbol,
                    order.direction,
                    order.offset,
                    order.remaining_volume(),
                )
                .await;
        }
        Ok(())
    }

    /// Fan a market tick out to the price cache, the unrealized marks and
    /// the cancel/reorder evaluator.
    pub async fn on_tick(&self, tick: &MarketTick) {
        self.reconciler.update_market_price(tick);
        self.pnl.on_tick(tick).await;
        self.evaluator.on_tick(tick).await;
    }

    /// Producer end of the fill queue, for the gateway's report callback.
    pub fn fill_sender(&self) -> mpsc::Sender<FillReport> {
        self.handles.fill_tx.clone()
    }

    pub fn ledger(&self) -> Arc<OrderLedger> {
        self.ledger.clone()
    }

    pub fn positions(&self) -> Arc<PositionAccountingEngine> {
        self.positions.clone()
    }

    pub fn pnl(&self) -> Arc<PnlCalculator> {
        self.pnl.clone()
    }

    pub fn reconciler(&self) -> Arc<FillReconciler> {
        self.reconciler.clone()
    }

    /// Stop the dispatcher workers and wait for them to drain.
    pub async fn shutdown(self) {
        info!("Order manager shutting down");
        self.handles.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WallClockCalendar;
    use crate::dispatch::GatewayError;
    use crate::orders::OrderStatus;
    use crate::types::{Direction, Offset};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        submits: Mutex<Vec<SubmitOrder>>,
        reject_all: bool,
    }

    #[async_trait::async_trait]
    impl Gateway for RecordingGateway {
        async fn submit_order(&self, order: &SubmitOrder) -> Result<(), GatewayError> {
            self.submits.lock().unwrap().push(order.clone());
            if self.reject_all {
                Err(GatewayError::Permanent("session down".into()))
            } else {
                Ok(())
            }
        }

        async fn cancel_order(
            &self,
            _order_id: &OrderId,
            _symbol: &str,
        ) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn manager(gateway: Arc<RecordingGateway>) -> OrderManager {
        OrderManager::new(
            OrderManagerConfig::default(),
            Arc::new(WallClockCalendar),
            gateway,
        )
    }

    fn request(offset: Offset, direction: Direction, volume: u64) -> NewOrderRequest {
        NewOrderRequest {
            symbol: "IC2509".to_string(),
            direction,
            offset,
            price: dec!(5000),
            volume,
        }
    }

    #[tokio::test]
    async fn test_submit_reaches_gateway_and_ledger() {
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(gateway.clone());

        let order = manager
            .submit(request(Offset::Open, Direction::Long, 2))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);
        assert_eq!(gateway.submits.lock().unwrap().len(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_without_position_is_rejected() {
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(gateway.clone());

        let err = manager
            .submit(request(Offset::Close, Direction::Short, 2))
            .await;
        assert!(matches!(err, Err(SubmitError::Accounting(_))));
        // Never reached the venue.
        assert!(gateway.submits.lock().unwrap().is_empty());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_freezes_volume() {
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(gateway.clone());

        manager
            .submit(request(Offset::Open, Direction::Long, 5))
            .await
            .unwrap();
        let fill_tx = manager.fill_sender();
        fill_tx
            .send(FillReport {
                order_id: OrderId::new("ord-1"),
                symbol: "IC2509".to_string(),
                price: dec!(5000),
                qty: 5,
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        manager
            .submit(request(Offset::Close, Direction::Short, 3))
            .await
            .unwrap();
        let summary = manager
            .positions()
            .summary("IC2509", Direction::Long)
            .await
            .unwrap();
        assert_eq!(summary.frozen_td + summary.frozen_yd, 3);

        // A second close for the remaining 2 fits; a third does not.
        manager
            .submit(request(Offset::Close, Direction::Short, 2))
            .await
            .unwrap();
        let err = manager
            .submit(request(Offset::Close, Direction::Short, 1))
            .await;
        assert!(matches!(err, Err(SubmitError::Accounting(_))));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_reject_releases_frozen_volume() {
        let gateway = Arc::new(RecordingGateway::default());
        let manager = manager(gateway.clone());

        manager
            .submit(request(Offset::Open, Direction::Long, 5))
            .await
            .unwrap();
        manager
            .fill_sender()
            .send(FillReport {
                order_id: OrderId::new("ord-1"),
                symbol: "IC2509".to_string(),
                price: dec!(5000),
                qty: 5,
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let close = manager
            .submit(request(Offset::Close, Direction::Short, 5))
            .await
            .unwrap();
        manager
            .on_reject(&OrderReject {
                order_id: close.id.clone(),
                error: "venue closed".to_string(),
            })
            .await
            .unwrap();

        let summary = manager
            .positions()
            .summary("IC2509", Direction::Long)
            .await
            .unwrap();
        assert_eq!(summary.frozen_td + summary.frozen_yd, 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_permanent_gateway_failure_rejects_order() {
        let gateway = Arc::new(RecordingGateway {
            reject_all: true,
            ..RecordingGateway::default()
        });
        let manager = manager(gateway.clone());

        let order = manager
            .submit(request(Offset::Open, Direction::Long, 2))
            .await
            .unwrap();
        let tracked = manager.ledger().get(&order.id).await.unwrap();
        assert_eq!(tracked.status, OrderStatus::Rejected);

        manager.shutdown().await;
    }
}
