//! Runtime configuration for the sync core and the wallet facade.

use crate::wallet::WalletSyncError;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the periodic sync tasks and reconciliation policy.
///
/// Every field has a default, so a config file only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
	/// Period of the state scheduler tick
	pub scheduler_interval_ms: u64,
	/// Period of the locked balance watcher tick
	pub watcher_interval_ms: u64,
	/// Confirmations after which funds count as unlocked
	pub confirmations_threshold: u64,
	/// Blocks scanned between intermediate reconciliations while far from tip
	pub store_blocks_count: u64,
	/// Account whose subaddresses and balance are tracked
	pub account: u32,
	/// Stop probing once the engine reports a critical status
	pub stop_on_critical: bool,
	/// Where the engine stores its wallet file after a synchronized reconciliation
	pub wallet_path: Option<PathBuf>,
	/// Directory of the file-backed wallet store
	pub data_dir: PathBuf,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			scheduler_interval_ms: 3_000,
			watcher_interval_ms: 5_000,
			confirmations_threshold: 10,
			store_blocks_count: 2_000,
			account: 0,
			stop_on_critical: true,
			wallet_path: None,
			data_dir: PathBuf::from("wallet_data"),
		}
	}
}

impl SyncConfig {
	/// Load a configuration from a JSON file.
	pub fn from_file(path: &Path) -> Result<Self, WalletSyncError> {
		let content = std::fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), WalletSyncError> {
		if self.scheduler_interval_ms == 0 || self.watcher_interval_ms == 0 {
			return Err(WalletSyncError::ConfigError(
				"tick intervals must be greater than zero".to_string(),
			));
		}
		if self.store_blocks_count == 0 {
			return Err(WalletSyncError::ConfigError(
				"store_blocks_count must be greater than zero".to_string(),
			));
		}
		Ok(())
	}

	pub fn scheduler_interval(&self) -> Duration {
		Duration::from_millis(self.scheduler_interval_ms)
	}

	pub fn watcher_interval(&self) -> Duration {
		Duration::from_millis(self.watcher_interval_ms)
	}
}
