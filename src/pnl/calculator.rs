//! Realized and unrealized profit-and-loss derivation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::positions::PositionAccountingEngine;
use crate::types::{Direction, MarketTick};

/// Immutable record of PnL realized by one closing fill. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedPnlRecord {
    pub symbol: String,
    pub close_time: DateTime<Utc>,
    pub avg_open_price: Decimal,
    pub close_price: Decimal,
    pub qty: u64,
    pub pnl: Decimal,
}

/// Immutable mark-to-market sample for one open position. Append-only;
/// one record per (position, tick) pair sharing the tick's symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrealizedMark {
    pub symbol: String,
    pub direction: Direction,
    pub mark_time: DateTime<Utc>,
    pub mark_price: Decimal,
    pub qty: u64,
    pub pnl: Decimal,
}

/// Derives realized and unrealized PnL from the position engine and the
/// append-only record logs.
#[derive(Clone)]
pub struct PnlCalculator {
    positions: Arc<PositionAccountingEngine>,
    realized: Arc<RwLock<Vec<RealizedPnlRecord>>>,
    marks: Arc<RwLock<Vec<UnrealizedMark>>>,
}

impl PnlCalculator {
    pub fn new(positions: Arc<PositionAccountingEngine>) -> Self {
        Self {
            positions,
            realized: Arc::new(RwLock::new(Vec::new())),
            marks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a realized record produced by a closing fill.
    pub async fn record_realized(&self, record: RealizedPnlRecord) {
        debug!(
            symbol = %record.symbol,
            qty = record.qty,
            pnl = %record.pnl,
            "Realized PnL recorded"
        );
        let mut realized = self.realized.write().await;
        realized.push(record);
    }

    /// Mark every open position on the tick's symbol to the tick price and
    /// append one `UnrealizedMark` per position.
    pub async fn on_tick(&self, tick: &MarketTick) -> Vec<UnrealizedMark> {
        let summaries = self.positions.summaries_for_symbol(&tick.symbol).await;

        let mut new_marks: Vec<UnrealizedMark> = summaries
            .into_iter()
            .map(|summary| {
                let qty = Decimal::from(summary.qty);
                let pnl = match summary.direction {
                    Direction::Long => qty * (tick.price - summary.avg_price),
                    Direction::Short => qty * (summary.avg_price - tick.price),
                };
                UnrealizedMark {
                    symbol: summary.symbol,
                    direction: summary.direction,
                    mark_time: tick.timestamp,
                    mark_price: tick.price,
                    qty: summary.qty,
                    pnl,
                }
            })
            .collect();

        let mut marks = self.marks.write().await;

        // A position closed since its last mark would otherwise keep
        // contributing that stale mark; supersede it with a zero sample.
        let open: std::collections::HashSet<Direction> =
            new_marks.iter().map(|m| m.direction).collect();
        let latest = Self::latest_by_key(marks.iter().filter(|m| m.symbol == tick.symbol));
        for ((symbol, direction), pnl) in latest {
            if !open.contains(&direction) && !pnl.is_zero() {
                new_marks.push(UnrealizedMark {
                    symbol,
                    direction,
                    mark_time: tick.timestamp,
                    mark_price: tick.price,
                    qty: 0,
                    pnl: Decimal::ZERO,
                });
            }
        }

        marks.extend(new_marks.iter().cloned());
        new_marks
    }

    /// Sum of realized PnL up to and including a timestamp; all of it when
    /// `up_to` is `None`.
    pub async fn realized_total(&self, up_to: Option<DateTime<Utc>>) -> Decimal {
        let realized = self.realized.read().await;
        realized
            .iter()
            .filter(|r| up_to.map_or(true, |t| r.close_time <= t))
            .map(|r| r.pnl)
            .sum()
    }

    /// Realized PnL for a single trading day (UTC date of the close).
    pub async fn realized_for_date(&self, date: NaiveDate) -> Decimal {
        let realized = self.realized.read().await;
        realized
            .iter()
            .filter(|r| r.close_time.date_naive() == date)
            .map(|r| r.pnl)
            .sum()
    }

    /// Sum of the latest mark per (symbol, direction).
    pub async fn latest_unrealized_total(&self) -> Decimal {
        let marks = self.marks.read().await;
        Self::latest_by_key(marks.iter()).values().copied().sum()
    }

    /// Combined PnL at a point in time: cumulative realized up to `at` plus
    /// the latest mark at or before `at` per position. Recomputed from the
    /// append-only logs, never cached, so historical queries reproduce.
    pub async fn combined_at(&self, at: DateTime<Utc>) -> Decimal {
        let realized = self.realized_total(Some(at)).await;
        let marks = self.marks.read().await;
        let unrealized: Decimal = Self::latest_by_key(marks.iter().filter(|m| m.mark_time <= at))
            .values()
            .copied()
            .sum();
        realized + unrealized
    }

    /// Today's realized plus latest unrealized; what the risk gate compares
    /// against the daily loss limit.
    pub async fn daily_pnl(&self, date: NaiveDate) -> Decimal {
        self.realized_for_date(date).await + self.latest_unrealized_total().await
    }

    /// Snapshot of the realized append log.
    pub async fn realized_records(&self) -> Vec<RealizedPnlRecord> {
        let realized = self.realized.read().await;
        realized.clone()
    }

    /// Snapshot of the unrealized mark series.
    pub async fn unrealized_marks(&self) -> Vec<UnrealizedMark> {
        let marks = self.marks.read().await;
        marks.clone()
    }

    fn latest_by_key<'a>(
        marks: impl Iterator<Item = &'a UnrealizedMark>,
    ) -> HashMap<(String, Direction), Decimal> {
        let mut latest: HashMap<(String, Direction), (DateTime<Utc>, Decimal)> = HashMap::new();
        for mark in marks {
            let key = (mark.symbol.clone(), mark.direction);
            match latest.get(&key) {
                Some((time, _)) if *time > mark.mark_time => {}
                _ => {
                    latest.insert(key, (mark.mark_time, mark.pnl));
                }
            }
        }
        latest.into_iter().map(|(k, (_, pnl))| (k, pnl)).collect()
    }
}
