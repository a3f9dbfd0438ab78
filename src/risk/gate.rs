//! Pre-submission risk gate.
//!
//! Every new-order request passes through here before it reaches the order
//! ledger. Checks run in a fixed order and the first failure is returned
//! synchronously to the caller; risk rejections are never retried.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use super::window::SlidingWindowCounter;
use crate::config::RiskConfig;
use crate::pnl::PnlCalculator;
use crate::positions::PositionAccountingEngine;
use crate::types::NewOrderRequest;

/// Why the gate rejected an order.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskViolation {
    #[error("Daily loss {loss} has reached the limit {limit}")]
    DailyLossLimit { loss: Decimal, limit: Decimal },

    #[error("Position {current} for {symbol} has reached the cap {limit}")]
    PositionLimit {
        symbol: String,
        current: u64,
        limit: u64,
    },

    #[error("{count} orders in the last minute reached the rate limit {limit}")]
    OrderRateLimit { count: usize, limit: usize },
}

/// Pre-trade risk checks over the shared position engine and PnL logs.
pub struct RiskGate {
    config: RiskConfig,
    positions: Arc<PositionAccountingEngine>,
    pnl: Arc<PnlCalculator>,
    submissions: SlidingWindowCounter,
}

impl RiskGate {
    pub fn new(
        config: RiskConfig,
        positions: Arc<PositionAccountingEngine>,
        pnl: Arc<PnlCalculator>,
    ) -> Self {
        Self {
            config,
            positions,
            pnl,
            submissions: SlidingWindowCounter::per_minute(),
        }
    }

    /// Run all checks in order; on pass, count the submission toward the
    /// rate window.
    pub async fn check(&self, request: &NewOrderRequest) -> Result<(), RiskViolation> {
        let now = Utc::now();

        // (a) daily loss limit: realized for the day plus latest unrealized
        let daily_pnl = self.pnl.daily_pnl(now.date_naive()).await;
        let daily_loss = -daily_pnl;
        if daily_loss >= self.config.max_daily_loss {
            warn!(
                symbol = %request.symbol,
                daily_loss = %daily_loss,
                limit = %self.config.max_daily_loss,
                "Order rejected: daily loss limit"
            );
            return Err(RiskViolation::DailyLossLimit {
                loss: daily_loss,
                limit: self.config.max_daily_loss,
            });
        }

        // (b) per-symbol position cap
        let current: u64 = self
            .positions
            .summaries_for_symbol(&request.symbol)
            .await
            .iter()
            .map(|s| s.qty)
            .sum();
        if current >= self.config.max_position_per_symbol {
            warn!(
                symbol = %request.symbol,
                current = current,
                limit = self.config.max_position_per_symbol,
                "Order rejected: position cap"
            );
            return Err(RiskViolation::PositionLimit {
                symbol: request.symbol.clone(),
                current,
                limit: self.config.max_position_per_symbol,
            });
        }

        // (c) order rate in the trailing minute
        let count = self.submissions.count(now);
        if count >= self.config.max_order_frequency {
            warn!(
                symbol = %request.symbol,
                count = count,
                limit = self.config.max_order_frequency,
                "Order rejected: submission rate limit"
            );
            return Err(RiskViolation::OrderRateLimit {
                count,
                limit: self.config.max_order_frequency,
            });
        }

        self.submissions.record(now);
        debug!(symbol = %request.symbol, volume = request.volume, "Risk checks passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WallClockCalendar;
    use crate::pnl::RealizedPnlRecord;
    use crate::positions::Execution;
    use crate::types::{Direction, Offset};
    use rust_decimal_macros::dec;

    fn request(symbol: &str) -> NewOrderRequest {
        NewOrderRequest {
            symbol: symbol.to_string(),
            direction: Direction::Long,
            offset: Offset::Open,
            price: dec!(5000),
            volume: 2,
        }
    }

    fn gate(config: RiskConfig) -> (RiskGate, Arc<PositionAccountingEngine>, Arc<PnlCalculator>) {
        let positions = Arc::new(PositionAccountingEngine::new(Arc::new(WallClockCalendar)));
        let pnl = Arc::new(PnlCalculator::new(positions.clone()));
        (
            RiskGate::new(config, positions.clone(), pnl.clone()),
            positions,
            pnl,
        )
    }

    #[tokio::test]
    async fn test_daily_loss_limit_boundary() {
        let (gate, _, pnl) = gate(RiskConfig {
            max_daily_loss: dec!(100),
            ..RiskConfig::default()
        });

        // Below the limit: accepted.
        pnl.record_realized(RealizedPnlRecord {
            symbol: "IC2509".to_string(),
            close_time: Utc::now(),
            avg_open_price: dec!(5000),
            close_price: dec!(4990),
            qty: 5,
            pnl: dec!(-99),
        })
        .await;
        assert!(gate.check(&request("IC2509")).await.is_ok());

        // One more unit of loss reaches the limit: rejected.
        pnl.record_realized(RealizedPnlRecord {
            symbol: "IC2509".to_string(),
            close_time: Utc::now(),
            avg_open_price: dec!(5000),
            close_price: dec!(4999),
            qty: 1,
            pnl: dec!(-1),
        })
        .await;
        let err = gate.check(&request("IC2509")).await;
        assert!(matches!(err, Err(RiskViolation::DailyLossLimit { .. })));
    }

    #[tokio::test]
    async fn test_position_cap() {
        let (gate, positions, _) = gate(RiskConfig {
            max_position_per_symbol: 5,
            ..RiskConfig::default()
        });

        positions
            .apply_fill(&Execution {
                symbol: "IC2509".to_string(),
                direction: Direction::Long,
                offset: Offset::Open,
                price: dec!(5000),
                qty: 5,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let err = gate.check(&request("IC2509")).await;
        assert!(matches!(err, Err(RiskViolation::PositionLimit { .. })));
        // Other symbols unaffected.
        assert!(gate.check(&request("IF2509")).await.is_ok());
    }

    #[tokio::test]
    async fn test_order_rate_limit() {
        let (gate, _, _) = gate(RiskConfig {
            max_order_frequency: 3,
            ..RiskConfig::default()
        });

        for _ in 0..3 {
            assert!(gate.check(&request("IC2509")).await.is_ok());
        }
        let err = gate.check(&request("IC2509")).await;
        assert!(matches!(err, Err(RiskViolation::OrderRateLimit { .. })));
    }
}
