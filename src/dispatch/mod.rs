//! Work Queue Dispatch Module
//!
//! Three bounded queues, one worker task each: cancel/reorder intents,
//! gateway fill reports, and failed-submission retries. Workers poll with a
//! timeout so a quiet queue still observes the shutdown signal promptly.

mod gateway;
mod worker;

pub use gateway::{Gateway, GatewayError};
pub use worker::{DispatchHandles, WorkQueueDispatcher};
