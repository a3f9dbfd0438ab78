//! Queue workers.
//!
//! Each worker owns its receiver and polls with a timeout, re-checking the
//! shutdown flag between polls. Cancel/reorder commands for one order are
//! serialized by the single cancel worker, so a cancel and its replacement
//! submission cannot interleave with another intent for the same order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::gateway::{Gateway, GatewayError};
use crate::config::DispatchConfig;
use crate::orders::{Order, OrderId, OrderLedger};
use crate::positions::PositionAccountingEngine;
use crate::reconcile::FillReconciler;
use crate::reorder::CancelReorderIntent;
use crate::types::{FillReport, SubmitOrder};

/// Handles to a running dispatcher: producer ends of the queues plus the
/// shutdown switch.
pub struct DispatchHandles {
    pub fill_tx: mpsc::Sender<FillReport>,
    pub retry_tx: mpsc::Sender<SubmitOrder>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatchHandles {
    /// Signal shutdown and wait for every worker to drain out.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Dispatch worker panicked");
            }
        }
        info!("Dispatcher stopped");
    }
}

/// Spawns and coordinates the three queue workers.
pub struct WorkQueueDispatcher {
    config: DispatchConfig,
    ledger: Arc<OrderLedger>,
    positions: Arc<PositionAccountingEngine>,
    reconciler: Arc<FillReconciler>,
    gateway: Arc<dyn Gateway>,
    reorder_seq: Arc<AtomicU64>,
}

impl WorkQueueDispatcher {
    pub fn new(
        config: DispatchConfig,
        ledger: Arc<OrderLedger>,
        positions: Arc<PositionAccountingEngine>,
        reconciler: Arc<FillReconciler>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        Self {
            config,
            ledger,
            positions,
            reconciler,
            gateway,
            reorder_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Spawn the three workers. Takes the consumer end of the intent queue;
    /// the producer ends live with the evaluator and the reconciler.
    pub fn start(self, intent_rx: mpsc::Receiver<CancelReorderIntent>) -> DispatchHandles {
        let (fill_tx, fill_rx) = mpsc::channel(self.config.queue_capacity);
        let (retry_tx, retry_rx) = mpsc::channel(self.config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = vec![
            tokio::spawn(cancel_reorder_worker(
                intent_rx,
                shutdown_rx.clone(),
                self.config.clone(),
                self.ledger.clone(),
                self.positions.clone(),
                self.gateway.clone(),
                retry_tx.clone(),
                self.reorder_seq.clone(),
            )),
            tokio::spawn(fill_worker(
                fill_rx,
                shutdown_rx.clone(),
                self.config.clone(),
                self.reconciler.clone(),
            )),
            tokio::spawn(retry_worker(
                retry_rx,
                shutdown_rx,
                self.config.clone(),
                self.ledger.clone(),
                self.gateway.clone(),
                retry_tx.clone(),
            )),
        ];
        info!(
            queue_capacity = self.config.queue_capacity,
            poll_timeout_ms = self.config.poll_timeout_ms,
            "Dispatcher started"
        );

        DispatchHandles {
            fill_tx,
            retry_tx,
            shutdown_tx,
            workers,
        }
    }
}

/// Poll one item off a queue, honoring the shutdown flag between timeouts.
async fn poll_next<T>(
    rx: &mut mpsc::Receiver<T>,
    shutdown: &watch::Receiver<bool>,
    poll_timeout: Duration,
) -> Option<T> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        match timeout(poll_timeout, rx.recv()).await {
            Ok(Some(item)) => return Some(item),
            Ok(None) => return None, // all senders dropped
            Err(_) => continue,      // quiet queue; re-check shutdown
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cancel_reorder_worker(
    mut rx: mpsc::Receiver<CancelReorderIntent>,
    shutdown: watch::Receiver<bool>,
    config: DispatchConfig,
    ledger: Arc<OrderLedger>,
    positions: Arc<PositionAccountingEngine>,
    gateway: Arc<dyn Gateway>,
    retry_tx: mpsc::Sender<SubmitOrder>,
    reorder_seq: Arc<AtomicU64>,
) {
    let poll = Duration::from_millis(config.poll_timeout_ms);
    while let Some(intent) = poll_next(&mut rx, &shutdown, poll).await {
        if let Err(e) = handle_intent(
            &intent,
            &ledger,
            &positions,
            gateway.as_ref(),
            &retry_tx,
            &reorder_seq,
        )
        .await
        {
            warn!(order_id = %intent.order_id, error = %e, "Cancel/reorder failed");
        }
    }
    debug!("Cancel/reorder worker exiting");
}

/// Execute one cancel/reorder intent: cancel the resting order, then place a
/// replacement for the unfilled remainder at the revised price.
async fn handle_intent(
    intent: &CancelReorderIntent,
    ledger: &OrderLedger,
    positions: &PositionAccountingEngine,
    gateway: &dyn Gateway,
    retry_tx: &mpsc::Sender<SubmitOrder>,
    reorder_seq: &AtomicU64,
) -> Result<(), crate::orders::LedgerError> {
    // Idempotency gate: a second intent for an in-flight cancel is dropped
    // here, so the venue sees at most one cancel command.
    if !ledger.mark_cancel_submitted(&intent.order_id).await? {
        return Ok(());
    }

    if let Err(e) = gateway.cancel_order(&intent.order_id, &intent.symbol).await {
        warn!(
            order_id = %intent.order_id,
            error = %e,
            "Gateway cancel failed; order left CancelSubmitted for reconciliation"
        );
        return Ok(());
    }
    let old = ledger.mark_cancelled(&intent.order_id).await?;

    let remaining = old.remaining_volume();
    if old.offset.is_close() {
        // The cancelled remainder no longer needs its reservation.
        positions
            .release_frozen(&intent.symbol, old.direction, old.offset, remaining)
            .await;
    }
    if remaining == 0 {
        return Ok(());
    }

    let seq = reorder_seq.fetch_add(1, Ordering::Relaxed);
    let new_id = OrderId::new(format!("{}-r{}", old.id, seq));
    info!(
        old_order_id = %old.id,
        new_order_id = %new_id,
        reason = %intent.reason,
        new_price = %intent.new_price,
        volume = remaining,
        "Re-sending cancelled order at revised price"
    );

    let replacement = Order::new(
        new_id.clone(),
        old.symbol.clone(),
        old.direction,
        old.offset,
        intent.new_price,
        remaining,
    );
    if old.offset.is_close() {
        if let Err(e) = positions
            .freeze_for_close(&old.symbol, old.direction, old.offset, remaining)
            .await
        {
            warn!(order_id = %new_id, error = %e, "Replacement close cannot reserve volume");
            return Ok(());
        }
    }
    ledger.submit(replacement).await?;

    let submit = SubmitOrder {
        order_id: new_id.clone(),
        symbol: old.symbol.clone(),
        direction: old.direction,
        offset: old.offset,
        price: intent.new_price,
        volume: remaining,
    };
    if let Err(e) = gateway.submit_order(&submit).await {
        if e.is_transient() {
            if retry_tx.send(submit).await.is_err() {
                error!(order_id = %new_id, "Retry queue closed, dropping resubmission");
                ledger.mark_rejected(&new_id, "retry queue closed").await?;
            }
        } else {
            ledger.mark_rejected(&new_id, &e.to_string()).await?;
            if old.offset.is_close() {
                positions
                    .release_frozen(&old.symbol, old.direction, old.offset, remaining)
                    .await;
            }
        }
    }
    Ok(())
}

async fn fill_worker(
    mut rx: mpsc::Receiver<FillReport>,
    shutdown: watch::Receiver<bool>,
    config: DispatchConfig,
    reconciler: Arc<FillReconciler>,
) {
    let poll = Duration::from_millis(config.poll_timeout_ms);
    while let Some(fill) = poll_next(&mut rx, &shutdown, poll).await {
        if let Err(e) = reconciler.on_fill(&fill).await {
            error!(
                order_id = %fill.order_id,
                symbol = %fill.symbol,
                error = %e,
                "Fill reconciliation failed"
            );
        }
    }
    debug!("Fill worker exiting");
}

async fn retry_worker(
    mut rx: mpsc::Receiver<SubmitOrder>,
    shutdown: watch::Receiver<bool>,
    config: DispatchConfig,
    ledger: Arc<OrderLedger>,
    gateway: Arc<dyn Gateway>,
    retry_tx: mpsc::Sender<SubmitOrder>,
) {
    let poll = Duration::from_millis(config.poll_timeout_ms);
    while let Some(submit) = poll_next(&mut rx, &shutdown, poll).await {
        let attempts = match ledger.record_retry(&submit.order_id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(order_id = %submit.order_id, error = %e, "Retry for untracked order");
                continue;
            }
        };
        if attempts > config.max_retries {
            error!(
                order_id = %submit.order_id,
                attempts = attempts,
                "Retry budget exhausted, rejecting order"
            );
            if let Err(e) = ledger
                .mark_rejected(&submit.order_id, "retry budget exhausted")
                .await
            {
                warn!(order_id = %submit.order_id, error = %e, "Could not mark rejected");
            }
            continue;
        }

        match gateway.submit_order(&submit).await {
            Ok(()) => {
                info!(order_id = %submit.order_id, attempt = attempts, "Resubmission succeeded");
            }
            Err(e) if e.is_transient() => {
                debug!(order_id = %submit.order_id, attempt = attempts, error = %e, "Resubmission failed, re-queuing");
                if retry_tx.send(submit).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                if let Err(le) = ledger.mark_rejected(&submit.order_id, &e.to_string()).await {
                    warn!(order_id = %submit.order_id, error = %le, "Could not mark rejected");
                }
            }
        }
    }
    debug!("Retry worker exiting");
}
