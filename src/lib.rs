pub mod calendar;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod orders;
pub mod pnl;
pub mod positions;
pub mod reconcile;
pub mod reorder;
pub mod risk;
pub mod snapshot;
pub mod types;
