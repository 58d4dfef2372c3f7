//! Wallet engine integration module
//!
//! This module defines the boundary to the native wallet engine: the `WalletEngine` trait the
//! engine binding implements, the raw data it hands back, and the `EngineHandle` adapter through
//! which every call is serialized. The engine is stateful and not reentrant, so nothing else in
//! the crate touches it directly.

/// Serializing adapter and ownership token for an engine instance
mod handle;
/// Scriptable in-process engine used by the harness binary and tests
pub mod simulated;
/// Raw engine data structures
mod types;

pub use handle::{EngineHandle, EngineNotInitialized};
pub use simulated::SimulatedEngine;
pub use types::*;

use std::path::Path;

/// Operations consumed from the native wallet engine.
///
/// Every method is a bounded, blocking call. Implementations are not required to be `Sync`;
/// `EngineHandle` guarantees that at most one call is in progress at a time.
pub trait WalletEngine: Send {
	/// Height of the chain as reported by the remote daemon, `0` when unknown.
	fn daemon_height(&mut self) -> u64;

	/// Height the wallet has scanned up to, `0` when unknown.
	fn wallet_height(&mut self) -> u64;

	/// Raw status code and optional error message.
	fn status(&mut self) -> (i32, Option<String>);

	fn is_synchronized(&mut self) -> bool;

	/// Ask the engine to refresh against the daemon.
	fn refresh(&mut self);

	/// Full transaction history known to the engine.
	fn transaction_history(&mut self) -> Vec<RawTransaction>;

	/// All subaddresses of the given account, ordered by index.
	fn subaddresses(&mut self, account: u32) -> Vec<String>;

	fn balance(&mut self, account: u32) -> u64;

	fn unlocked_balance(&mut self, account: u32) -> u64;

	fn receive_address(&mut self, account: u32, index: u32) -> String;

	fn validate_address(&mut self, address: &str) -> bool;

	/// Build a transfer without broadcasting it.
	fn create_transaction(
		&mut self,
		address: &str,
		amount: u64,
		priority: TransactionPriority,
	) -> Result<PendingTransfer, EngineError>;

	/// Broadcast a transfer previously returned by `create_transaction`.
	fn commit_transaction(&mut self, pending: PendingTransfer) -> Result<(), EngineError>;

	fn estimate_fee(
		&mut self,
		address: &str,
		amount: u64,
		priority: TransactionPriority,
	) -> Result<u64, EngineError>;

	/// Persist the engine's wallet file.
	fn store(&mut self, path: &Path) -> Result<(), EngineError>;

	/// Listener flag raised when the engine observed a new transaction.
	fn has_new_transaction(&mut self) -> bool;

	fn reset_new_transaction(&mut self);

	/// Height last reported to the engine's listener.
	fn listener_height(&mut self) -> u64;

	/// Listener flag raised when the engine wants an explicit refresh.
	fn needs_refresh(&mut self) -> bool {
		false
	}

	fn reset_needs_refresh(&mut self) {}
}
