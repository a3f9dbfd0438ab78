//! Trading calendar abstraction for session-rollover detection.
//!
//! Futures-style settlement splits a position into today's and yesterday's
//! volume; the boundary is the instrument's trading date, not wall-clock
//! midnight (night sessions belong to the next trading date). The reference
//! table lives outside this crate, so the position engine consults it
//! through the [`TradingCalendar`] trait.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Source of per-symbol trading dates.
pub trait TradingCalendar: Send + Sync {
    /// The trading date a timestamp belongs to for the given symbol.
    fn trading_date(&self, symbol: &str, at: DateTime<Utc>) -> NaiveDate;
}

/// Fallback calendar that uses the UTC wall-clock date.
///
/// Known approximation: around night sessions this can misclassify the
/// today/yesterday split, because trades after midnight still belong to the
/// previous trading date on many venues. Use a venue-backed calendar in
/// production.
#[derive(Debug, Default)]
pub struct WallClockCalendar;

impl TradingCalendar for WallClockCalendar {
    fn trading_date(&self, _symbol: &str, at: DateTime<Utc>) -> NaiveDate {
        at.date_naive()
    }
}

/// Calendar backed by an in-memory per-symbol override table, falling back
/// to the wall-clock date. Used in tests and for replaying recorded
/// reference data.
#[derive(Debug, Default)]
pub struct FixedCalendar {
    overrides: RwLock<HashMap<String, NaiveDate>>,
}

impl FixedCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the trading date for a symbol.
    pub fn set_trading_date(&self, symbol: &str, date: NaiveDate) {
        let mut overrides = self
            .overrides
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        overrides.insert(symbol.to_string(), date);
    }
}

impl TradingCalendar for FixedCalendar {
    fn trading_date(&self, symbol: &str, at: DateTime<Utc>) -> NaiveDate {
        let overrides = self
            .overrides
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        overrides
            .get(symbol)
            .copied()
            .unwrap_or_else(|| at.date_naive())
    }
}
