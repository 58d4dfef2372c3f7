//! Wallet state synchronization for a Monero wallet engine.
//!
//! The crate keeps a local view of balance, transaction history and receive addresses in step
//! with an opaque, non-reentrant wallet engine. `wallet::WalletKit` is the entry point.

/// Runtime configuration
pub mod config;
/// Boundary to the native wallet engine
pub mod engine;
/// Outgoing transfers and fee estimation
pub mod transaction;
/// Formatting helpers
pub mod utils;
/// Sync core, storage and the wallet facade
pub mod wallet;

pub use config::SyncConfig;
pub use wallet::{WalletEvent, WalletEvents, WalletKit};
