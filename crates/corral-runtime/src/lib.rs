// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

//! Corral Runtime - Everything around a scheduling decision
//!
//! This crate provides:
//! - An HTTP client for the orchestrator API
//! - An in-memory cluster cache that feeds scheduler snapshots
//! - A message transport with an in-process channel implementation
//! - The schedule worker, backoff relay and pending-workload feeder

pub mod api_client;
pub mod cache;
pub mod error;
pub mod events;
pub mod feeder;
pub mod relay;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod test_util;

// Re-export primary types
pub use api_client::{ApiClient, ClusterLister};
pub use cache::ClusterCache;
pub use error::{Result, RuntimeError};
pub use feeder::PendingFeeder;
pub use relay::BackoffRelay;
pub use transport::{ChannelTransport, Delivery, RetryRequest, ScheduleRequest, Transport};
pub use worker::{Outcome, ScheduleWorker, WorkerConfig};
