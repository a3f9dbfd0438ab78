//! FIFO cost-basis position engine.
//!
//! Open fills enqueue lots; close fills drain the opposite direction's
//! queue oldest-first. Today/yesterday sub-counters follow the venue's
//! settlement rules: generic closes drain today's volume first, offset
//! closes debit their sub-counter directly, and the counters fold at
//! trading-session rollover.
//!
//! A close that exceeds available volume means the local books and the
//! venue have already diverged; the engine refuses the fill, leaves the
//! lots untouched and halts further fill application for that symbol until
//! an operator clears it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::calendar::TradingCalendar;
use crate::pnl::RealizedPnlRecord;
use crate::types::{Direction, Offset};

/// A single open-position parcel, matched FIFO on close.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLot {
    pub open_time: DateTime<Utc>,
    pub price: Decimal,
    pub remaining_volume: u64,
}

/// Queryable per-(symbol, direction) position row.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub direction: Direction,
    pub qty: u64,
    pub avg_price: Decimal,
    /// Volume opened in the current trading session
    pub td: u64,
    /// Volume carried over from prior sessions
    pub yd: u64,
    pub frozen_td: u64,
    pub frozen_yd: u64,
    pub trading_date: NaiveDate,
}

/// A normalized fill: the originating order's direction and offset resolved
/// alongside the executed price and quantity.
#[derive(Debug, Clone)]
pub struct Execution {
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Decimal,
    pub qty: u64,
    pub timestamp: DateTime<Utc>,
}

/// Errors from position accounting.
#[derive(Error, Debug, Clone)]
pub enum AccountingError {
    #[error(
        "Close of {qty} exceeds available {bucket} volume {available} for {symbol} {direction}"
    )]
    InsufficientVolume {
        symbol: String,
        direction: Direction,
        bucket: &'static str,
        qty: u64,
        available: u64,
    },

    #[error("Cannot freeze {qty}: only {available} unfrozen {bucket} volume for {symbol} {direction}")]
    InsufficientUnfrozen {
        symbol: String,
        direction: Direction,
        bucket: &'static str,
        qty: u64,
        available: u64,
    },

    #[error("Fill application halted for symbol {0} after an accounting invariant violation")]
    SymbolHalted(String),
}

/// One direction's book for a symbol.
#[derive(Debug, Default)]
struct PositionBook {
    lots: VecDeque<PositionLot>,
    td: u64,
    yd: u64,
    frozen_td: u64,
    frozen_yd: u64,
    trading_date: Option<NaiveDate>,
}

impl PositionBook {
    fn qty(&self) -> u64 {
        self.td + self.yd
    }

    fn lot_volume(&self) -> u64 {
        self.lots.iter().map(|l| l.remaining_volume).sum()
    }

    fn avg_price(&self) -> Decimal {
        let qty = self.lot_volume();
        if qty == 0 {
            return Decimal::ZERO;
        }
        let cost: Decimal = self
            .lots
            .iter()
            .map(|l| l.price * Decimal::from(l.remaining_volume))
            .sum();
        cost / Decimal::from(qty)
    }

    /// Fold today's volume into yesterday's when the trading date advances.
    fn roll_to(&mut self, date: NaiveDate) -> bool {
        match self.trading_date {
            Some(last) if date > last => {
                self.yd += self.td;
                self.td = 0;
                self.frozen_yd += self.frozen_td;
                self.frozen_td = 0;
                self.trading_date = Some(date);
                true
            }
            Some(_) => false,
            None => {
                self.trading_date = Some(date);
                false
            }
        }
    }

    /// Consume `qty` from the lot queue, oldest first. Whole lots are
    /// dequeued while they fit; a partially consumed lot shrinks in place.
    /// Caller has already verified availability.
    fn consume_lots(&mut self, qty: u64) -> (Decimal, u64) {
        let mut remaining = qty;
        let mut cost = Decimal::ZERO;
        let mut closed = 0u64;

        while remaining > 0 {
            let Some(front) = self.lots.front_mut() else {
                break;
            };
            if front.remaining_volume <= remaining {
                cost += front.price * Decimal::from(front.remaining_volume);
                remaining -= front.remaining_volume;
                closed += front.remaining_volume;
                self.lots.pop_front();
            } else {
                cost += front.price * Decimal::from(remaining);
                front.remaining_volume -= remaining;
                closed += remaining;
                remaining = 0;
            }
        }
        (cost, closed)
    }
}

type PositionKey = (String, Direction);

/// Thread-safe FIFO position engine.
///
/// All mutations serialize through one `RwLock`; summary reads clone a
/// consistent snapshot under the same lock.
#[derive(Clone)]
pub struct PositionAccountingEngine {
    books: Arc<RwLock<HashMap<PositionKey, PositionBook>>>,
    halted: Arc<RwLock<HashSet<String>>>,
    calendar: Arc<dyn TradingCalendar>,
}

impl PositionAccountingEngine {
    pub fn new(calendar: Arc<dyn TradingCalendar>) -> Self {
        Self {
            books: Arc::new(RwLock::new(HashMap::new())),
            halted: Arc::new(RwLock::new(HashSet::new())),
            calendar,
        }
    }

    /// Apply one fill to the books.
    ///
    /// Open fills enqueue a lot on the trade direction's book. Close fills
    /// drain the opposite direction's book FIFO and return the realized
    /// PnL record for the closed volume.
    pub async fn apply_fill(
        &self,
        exec: &Execution,
    ) -> Result<Option<RealizedPnlRecord>, AccountingError> {
        {
            let halted = self.halted.read().await;
            if halted.contains(&exec.symbol) {
                return Err(AccountingError::SymbolHalted(exec.symbol.clone()));
            }
        }

        let trading_date = self.calendar.trading_date(&exec.symbol, exec.timestamp);

        match exec.offset {
            Offset::Open => {
                self.apply_open(exec, trading_date).await;
                Ok(None)
            }
            Offset::Close | Offset::CloseToday | Offset::CloseYesterday => {
                match self.apply_close(exec, trading_date).await {
                    Ok(record) => Ok(Some(record)),
                    Err(e) => {
                        // Books and venue have diverged; stop digging.
                        error!(
                            symbol = %exec.symbol,
                            direction = %exec.direction,
                            offset = %exec.offset,
                            qty = exec.qty,
                            error = %e,
                            "Accounting invariant violated - halting fill application for symbol"
                        );
                        let mut halted = self.halted.write().await;
                        halted.insert(exec.symbol.clone());
                        Err(e)
                    }
                }
            }
        }
    }

    async fn apply_open(&self, exec: &Execution, trading_date: NaiveDate) {
        let mut books = self.books.write().await;
        let book = books
            .entry((exec.symbol.clone(), exec.direction))
            .or_default();
        if book.roll_to(trading_date) {
            info!(
                symbol = %exec.symbol,
                direction = %exec.direction,
                trading_date = %trading_date,
                "Trading session rollover applied"
            );
        }

        book.lots.push_back(PositionLot {
            open_time: exec.timestamp,
            price: exec.price,
            remaining_volume: exec.qty,
        });
        book.td += exec.qty;
        debug!(
            symbol = %exec.symbol,
            direction = %exec.direction,
            qty = exec.qty,
            price = %exec.price,
            td = book.td,
            yd = book.yd,
            "Opened lot"
        );
    }

    async fn apply_close(
        &self,
        exec: &Execution,
        trading_date: NaiveDate,
    ) -> Result<RealizedPnlRecord, AccountingError> {
        // A Long close buys back the Short book and vice versa.
        let closed_direction = exec.direction.opposite();
        let mut books = self.books.write().await;
        let book = books
            .entry((exec.symbol.clone(), closed_direction))
            .or_default();
        if book.roll_to(trading_date) {
            info!(
                symbol = %exec.symbol,
                direction = %closed_direction,
                trading_date = %trading_date,
                "Trading session rollover applied"
            );
        }

        Self::check_close(book, exec, closed_direction)?;

        // Debit the settlement sub-counters. Generic closes drain today's
        // volume first and spill into yesterday's.
        let (from_td, from_yd) = match exec.offset {
            Offset::CloseToday => (exec.qty, 0),
            Offset::CloseYesterday => (0, exec.qty),
            Offset::Close | Offset::Open => {
                let from_td = exec.qty.min(book.td);
                (from_td, exec.qty - from_td)
            }
        };
        book.td -= from_td;
        book.yd -= from_yd;
        book.frozen_td = book.frozen_td.saturating_sub(from_td);
        book.frozen_yd = book.frozen_yd.saturating_sub(from_yd);

        let (cost, closed) = book.consume_lots(exec.qty);
        debug_assert_eq!(closed, exec.qty);
        let avg_open = cost / Decimal::from(closed);

        // Gain when price moves in the position holder's favor: a closed
        // long gains as price rises, a closed short gains as price falls.
        let pnl = match closed_direction {
            Direction::Long => Decimal::from(closed) * (exec.price - avg_open),
            Direction::Short => Decimal::from(closed) * (avg_open - exec.price),
        };

        info!(
            symbol = %exec.symbol,
            closed_direction = %closed_direction,
            offset = %exec.offset,
            qty = closed,
            avg_open = %avg_open,
            close_price = %exec.price,
            pnl = %pnl,
            td = book.td,
            yd = book.yd,
            "Closed volume"
        );

        Ok(RealizedPnlRecord {
            symbol: exec.symbol.clone(),
            close_time: exec.timestamp,
            avg_open_price: avg_open,
            close_price: exec.price,
            qty: closed,
            pnl,
        })
    }

    /// Validate a close against the books without mutating anything, so a
    /// violating fill cannot corrupt remaining lots.
    fn check_close(
        book: &PositionBook,
        exec: &Execution,
        closed_direction: Direction,
    ) -> Result<(), AccountingError> {
        let insufficient = |bucket: &'static str, available: u64| {
            AccountingError::InsufficientVolume {
                symbol: exec.symbol.clone(),
                direction: closed_direction,
                bucket,
                qty: exec.qty,
                available,
            }
        };

        match exec.offset {
            Offset::CloseToday if exec.qty > book.td => Err(insufficient("today", book.td)),
            Offset::CloseYesterday if exec.qty > book.yd => Err(insufficient("yesterday", book.yd)),
            _ if exec.qty > book.qty() => Err(insufficient("total", book.qty())),
            _ if exec.qty > book.lot_volume() => Err(insufficient("lot", book.lot_volume())),
            _ => Ok(()),
        }
    }

    /// Reserve volume for an in-flight closing order.
    ///
    /// Called on submission; rejected if the unfrozen volume cannot cover
    /// the order, so two in-flight closes cannot promise the same lots.
    pub async fn freeze_for_close(
        &self,
        symbol: &str,
        trade_direction: Direction,
        offset: Offset,
        qty: u64,
    ) -> Result<(), AccountingError> {
        let closed_direction = trade_direction.opposite();
        let mut books = self.books.write().await;
        let book = books
            .entry((symbol.to_string(), closed_direction))
            .or_default();

        let insufficient = |bucket: &'static str, available: u64| {
            AccountingError::InsufficientUnfrozen {
                symbol: symbol.to_string(),
                direction: closed_direction,
                bucket,
                qty,
                available,
            }
        };

        match offset {
            Offset::CloseToday => {
                let free = book.td - book.frozen_td;
                if qty > free {
                    return Err(insufficient("today", free));
                }
                book.frozen_td += qty;
            }
            Offset::CloseYesterday => {
                let free = book.yd - book.frozen_yd;
                if qty > free {
                    return Err(insufficient("yesterday", free));
                }
                book.frozen_yd += qty;
            }
            Offset::Close | Offset::Open => {
                let free_td = book.td - book.frozen_td;
                let free_yd = book.yd - book.frozen_yd;
                if qty > free_td + free_yd {
                    return Err(insufficient("total", free_td + free_yd));
                }
                let td_part = qty.min(free_td);
                book.frozen_td += td_part;
                book.frozen_yd += qty - td_part;
            }
        }
        debug!(
            symbol = symbol,
            direction = %closed_direction,
            offset = %offset,
            qty = qty,
            frozen_td = book.frozen_td,
            frozen_yd = book.frozen_yd,
            "Volume frozen for in-flight close"
        );
        Ok(())
    }

    /// Release reserved volume for the unfilled remainder of a cancelled or
    /// rejected closing order. Saturating: a release can race a fill that
    /// already consumed the frozen volume.
    pub async fn release_frozen(
        &self,
        symbol: &str,
        trade_direction: Direction,
        offset: Offset,
        qty: u64,
    ) {
        let closed_direction = trade_direction.opposite();
        let mut books = self.books.write().await;
        let Some(book) = books.get_mut(&(symbol.to_string(), closed_direction)) else {
            warn!(symbol = symbol, direction = %closed_direction, "Release for unknown book");
            return;
        };

        match offset {
            Offset::CloseToday => book.frozen_td = book.frozen_td.saturating_sub(qty),
            Offset::CloseYesterday => book.frozen_yd = book.frozen_yd.saturating_sub(qty),
            Offset::Close | Offset::Open => {
                let td_part = qty.min(book.frozen_td);
                book.frozen_td -= td_part;
                book.frozen_yd = book.frozen_yd.saturating_sub(qty - td_part);
            }
        }
        debug!(
            symbol = symbol,
            direction = %closed_direction,
            qty = qty,
            frozen_td = book.frozen_td,
            frozen_yd = book.frozen_yd,
            "Frozen volume released"
        );
    }

    /// Snapshot of one (symbol, direction) position, if any volume is open.
    pub async fn summary(&self, symbol: &str, direction: Direction) -> Option<PositionSummary> {
        let books = self.books.read().await;
        books
            .get(&(symbol.to_string(), direction))
            .filter(|book| book.qty() > 0)
            .map(|book| Self::summarize(symbol, direction, book))
    }

    /// Snapshot of all open positions on a symbol.
    pub async fn summaries_for_symbol(&self, symbol: &str) -> Vec<PositionSummary> {
        let books = self.books.read().await;
        books
            .iter()
            .filter(|((sym, _), book)| sym == symbol && book.qty() > 0)
            .map(|((sym, dir), book)| Self::summarize(sym, *dir, book))
            .collect()
    }

    /// Snapshot of every open position (the queryable position table).
    pub async fn summaries(&self) -> Vec<PositionSummary> {
        let books = self.books.read().await;
        books
            .iter()
            .filter(|(_, book)| book.qty() > 0)
            .map(|((sym, dir), book)| Self::summarize(sym, *dir, book))
            .collect()
    }

    /// Snapshot of the raw lot queue, oldest first.
    pub async fn lots(&self, symbol: &str, direction: Direction) -> Vec<PositionLot> {
        let books = self.books.read().await;
        books
            .get(&(symbol.to_string(), direction))
            .map(|book| book.lots.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether fill application is halted for a symbol.
    pub async fn is_halted(&self, symbol: &str) -> bool {
        let halted = self.halted.read().await;
        halted.contains(symbol)
    }

    /// Clear a halt after external reconciliation fixed the divergence.
    pub async fn clear_halt(&self, symbol: &str) {
        let mut halted = self.halted.write().await;
        if halted.remove(symbol) {
            info!(symbol = symbol, "Accounting halt cleared");
        }
    }

    fn summarize(symbol: &str, direction: Direction, book: &PositionBook) -> PositionSummary {
        PositionSummary {
            symbol: symbol.to_string(),
            direction,
            qty: book.qty(),
            avg_price: book.avg_price(),
            td: book.td,
            yd: book.yd,
            frozen_td: book.frozen_td,
            frozen_yd: book.frozen_yd,
            trading_date: book.trading_date.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FixedCalendar;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn engine_with_calendar() -> (PositionAccountingEngine, Arc<FixedCalendar>) {
        let calendar = Arc::new(FixedCalendar::new());
        (PositionAccountingEngine::new(calendar.clone()), calendar)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn exec(
        symbol: &str,
        direction: Direction,
        offset: Offset,
        price: Decimal,
        qty: u64,
        ts: DateTime<Utc>,
    ) -> Execution {
        Execution {
            symbol: symbol.to_string(),
            direction,
            offset,
            price,
            qty,
            timestamp: ts,
        }
    }

    async fn assert_books_consistent(
        engine: &PositionAccountingEngine,
        symbol: &str,
        direction: Direction,
    ) {
        if let Some(summary) = engine.summary(symbol, direction).await {
            let lot_sum: u64 = engine
                .lots(symbol, direction)
                .await
                .iter()
                .map(|l| l.remaining_volume)
                .sum();
            assert_eq!(lot_sum, summary.qty, "lot volume must equal summary qty");
            assert_eq!(summary.td + summary.yd, summary.qty, "td + yd must equal qty");
        }
    }

    #[tokio::test]
    async fn test_fifo_close_realizes_oldest_lots_first() {
        let (engine, _) = engine_with_calendar();

        // Lots [(t=1, 5 @ 100), (t=2, 5 @ 102)] on the Long book.
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 5, at(1)))
            .await
            .unwrap();
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(102), 5, at(2)))
            .await
            .unwrap();

        // A Short close of 7 @ 105 drains the Long book FIFO.
        let record = engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::Close, dec!(105), 7, at(3)))
            .await
            .unwrap()
            .unwrap();

        // 5×(105−100) + 2×(105−102) = 31
        assert_eq!(record.pnl, dec!(31));
        assert_eq!(record.qty, 7);
        // avg_open = (5×100 + 2×102) / 7
        assert_eq!(record.avg_open_price, dec!(704) / dec!(7));

        let lots = engine.lots("IC2509", Direction::Long).await;
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_volume, 3);
        assert_eq!(lots[0].price, dec!(102));

        assert_books_consistent(&engine, "IC2509", Direction::Long).await;
    }

    #[tokio::test]
    async fn test_closing_short_gains_when_price_falls() {
        let (engine, _) = engine_with_calendar();
        engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::Open, dec!(100), 4, at(1)))
            .await
            .unwrap();

        let record = engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Close, dec!(95), 4, at(2)))
            .await
            .unwrap()
            .unwrap();
        // Short opened at 100, bought back at 95: gain 4×5.
        assert_eq!(record.pnl, dec!(20));
        assert!(engine.summary("IC2509", Direction::Short).await.is_none());
    }

    #[tokio::test]
    async fn test_over_close_halts_symbol_without_corrupting_lots() {
        let (engine, _) = engine_with_calendar();
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 5, at(1)))
            .await
            .unwrap();

        let err = engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::Close, dec!(105), 8, at(2)))
            .await;
        assert!(matches!(err, Err(AccountingError::InsufficientVolume { .. })));

        // Lots untouched.
        let lots = engine.lots("IC2509", Direction::Long).await;
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_volume, 5);
        assert_books_consistent(&engine, "IC2509", Direction::Long).await;

        // Symbol halted for further fills, including opens.
        assert!(engine.is_halted("IC2509").await);
        let err = engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 1, at(3)))
            .await;
        assert!(matches!(err, Err(AccountingError::SymbolHalted(_))));

        // Other symbols keep flowing.
        engine
            .apply_fill(&exec("IF2509", Direction::Long, Offset::Open, dec!(100), 1, at(3)))
            .await
            .unwrap();

        engine.clear_halt("IC2509").await;
        assert!(!engine.is_halted("IC2509").await);
    }

    #[tokio::test]
    async fn test_generic_close_drains_td_then_yd() {
        let (engine, calendar) = engine_with_calendar();
        calendar.set_trading_date("IC2509", NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());

        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 6, at(1)))
            .await
            .unwrap();

        // Rollover: yesterday's 6 carried, then 4 opened today.
        calendar.set_trading_date("IC2509", NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(104), 4, at(2)))
            .await
            .unwrap();

        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!((summary.td, summary.yd, summary.qty), (4, 6, 10));

        // Generic close of 7 takes all 4 td, spills 3 into yd.
        engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::Close, dec!(105), 7, at(3)))
            .await
            .unwrap();

        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!((summary.td, summary.yd, summary.qty), (0, 3, 3));
        assert_books_consistent(&engine, "IC2509", Direction::Long).await;
    }

    #[tokio::test]
    async fn test_close_today_and_yesterday_debit_their_buckets() {
        let (engine, calendar) = engine_with_calendar();
        calendar.set_trading_date("IC2509", NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 5, at(1)))
            .await
            .unwrap();
        calendar.set_trading_date("IC2509", NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(102), 5, at(2)))
            .await
            .unwrap();

        engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::CloseToday, dec!(103), 2, at(3)))
            .await
            .unwrap();
        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!((summary.td, summary.yd), (3, 5));

        engine
            .apply_fill(&exec(
                "IC2509",
                Direction::Short,
                Offset::CloseYesterday,
                dec!(103),
                4,
                at(4),
            ))
            .await
            .unwrap();
        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!((summary.td, summary.yd, summary.qty), (3, 1, 4));
        assert_books_consistent(&engine, "IC2509", Direction::Long).await;

        // CloseToday beyond td is a violation even though total volume fits.
        let err = engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::CloseToday, dec!(103), 4, at(5)))
            .await;
        assert!(matches!(err, Err(AccountingError::InsufficientVolume { .. })));
    }

    #[tokio::test]
    async fn test_rollover_preserves_qty() {
        let (engine, calendar) = engine_with_calendar();
        calendar.set_trading_date("IC2509", NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 7, at(1)))
            .await
            .unwrap();

        let before = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!((before.td, before.yd), (7, 0));

        calendar.set_trading_date("IC2509", NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(101), 1, at(2)))
            .await
            .unwrap();

        let after = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!((after.td, after.yd, after.qty), (1, 7, 8));
        assert_books_consistent(&engine, "IC2509", Direction::Long).await;
    }

    #[tokio::test]
    async fn test_freeze_and_release() {
        let (engine, _) = engine_with_calendar();
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 10, at(1)))
            .await
            .unwrap();

        // Freeze 6 for an in-flight Short close.
        engine
            .freeze_for_close("IC2509", Direction::Short, Offset::Close, 6)
            .await
            .unwrap();
        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!(summary.frozen_td + summary.frozen_yd, 6);

        // A second close cannot reserve more than the remaining 4.
        let err = engine
            .freeze_for_close("IC2509", Direction::Short, Offset::Close, 5)
            .await;
        assert!(matches!(err, Err(AccountingError::InsufficientUnfrozen { .. })));

        // Partial fill of 2 consumes frozen volume alongside td/yd.
        engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::Close, dec!(101), 2, at(2)))
            .await
            .unwrap();
        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!(summary.qty, 8);
        assert_eq!(summary.frozen_td + summary.frozen_yd, 4);

        // Cancel releases the unfilled remainder.
        engine
            .release_frozen("IC2509", Direction::Short, Offset::Close, 4)
            .await;
        let summary = engine.summary("IC2509", Direction::Long).await.unwrap();
        assert_eq!(summary.frozen_td + summary.frozen_yd, 0);
        assert!(summary.frozen_td <= summary.td);
        assert!(summary.frozen_yd <= summary.yd);
    }

    #[tokio::test]
    async fn test_summaries_for_symbol() {
        let (engine, _) = engine_with_calendar();
        engine
            .apply_fill(&exec("IC2509", Direction::Long, Offset::Open, dec!(100), 3, at(1)))
            .await
            .unwrap();
        engine
            .apply_fill(&exec("IC2509", Direction::Short, Offset::Open, dec!(101), 2, at(2)))
            .await
            .unwrap();
        engine
            .apply_fill(&exec("IF2509", Direction::Long, Offset::Open, dec!(50), 1, at(3)))
            .await
            .unwrap();

        let on_symbol = engine.summaries_for_symbol("IC2509").await;
        assert_eq!(on_symbol.len(), 2);
        assert_eq!(engine.summaries().await.len(), 3);
    }
}
