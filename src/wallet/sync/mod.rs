//! Wallet Synchronization Module
//!
//! This module keeps the local wallet cache in step with the wallet engine. It is composed of
//! several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `orchestrator`: The serialized sync core and the two periodic tasks that drive it.
//! - `state`: Sync state, status categories and balance snapshots, with change detection.
//! - `scheduler`: The adaptive policy deciding when a tick probes the engine.
//! - `ticker`: The periodic task runner with cooperative stop.
//! - `probe`: One read of heights, synchronized flag and status from the engine.
//! - `reconciliation`: Fetching engine state and replacing the stored sets.
//! - `watcher`: Tracking locked funds until they reach the confirmation threshold.
//! - `events`: Wallet events and their delivery to the consumer.
//! - `repositories`: The storage trait with file and in-memory implementations.

/// Event types and delivery to the consumer
pub mod events;
/// Serialized sync core and its periodic tasks
pub mod orchestrator;
/// Single engine state read
pub mod probe;
/// Fetch-and-replace of the local cache
pub mod reconciliation;
/// Wallet cache persistence
pub mod repositories;
/// Adaptive probe interval
pub mod scheduler;
/// Sync state model
pub mod state;
/// Periodic task runner
pub mod ticker;
/// Locked balance watcher
pub mod watcher;

pub use orchestrator::*;
