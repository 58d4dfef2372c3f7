use crate::engine::{EngineNotInitialized, Transfer};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of records returned by a transaction query without an explicit limit
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Error types for the sync core and its storage
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("{0}")]
	EngineNotInitialized(#[from] EngineNotInitialized),

	#[error("Engine status error: {0}")]
	EngineStatusError(String),

	#[error("Engine status critical: {0}")]
	EngineStatusCritical(String),

	#[error("Storage error: {0}")]
	StorageError(String),

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),
}

/// Direction of a transaction relative to the wallet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionDirection {
	Incoming,
	Outgoing,
	/// Outgoing to one of the wallet's own subaddresses
	SentToSelf,
}

/// Transaction as cached locally and handed to consumers.
///
/// `hash` is the persistence key. `uid` is generated locally and survives refetches of the same
/// hash, so consumers can use it as a stable cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
	pub uid: Uuid,
	pub hash: String,
	pub direction: TransactionDirection,
	pub block_height: u64,
	pub amount: u64,
	pub fee: u64,
	pub is_pending: bool,
	pub is_failed: bool,
	/// Unix seconds
	pub timestamp: i64,
	pub confirmations: u64,
	pub transfers: Vec<Transfer>,
	pub note: Option<String>,
}

/// Receive address of the tracked account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubAddressRecord {
	pub address: String,
	pub index: u32,
	/// Number of known transactions with a transfer to this address
	pub transactions_count: usize,
}

/// Last heights seen by the sync core, kept so a restart does not rescan from zero
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeightsSnapshot {
	pub daemon_height: u64,
	pub wallet_height: u64,
}

/// Direction filter of a transaction query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionFilter {
	/// Incoming and sent-to-self
	Incoming,
	/// Outgoing and sent-to-self
	Outgoing,
}

impl TransactionFilter {
	pub fn matches(self, direction: TransactionDirection) -> bool {
		match (self, direction) {
			(_, TransactionDirection::SentToSelf) => true,
			(TransactionFilter::Incoming, TransactionDirection::Incoming) => true,
			(TransactionFilter::Outgoing, TransactionDirection::Outgoing) => true,
			_ => false,
		}
	}
}

/// Page request over the cached transaction history, newest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionQuery {
	/// Only return records strictly older than this one
	pub from_uid: Option<Uuid>,
	pub filter: Option<TransactionFilter>,
	pub limit: usize,
}

impl Default for TransactionQuery {
	fn default() -> Self {
		Self {
			from_uid: None,
			filter: None,
			limit: DEFAULT_QUERY_LIMIT,
		}
	}
}

impl TransactionQuery {
	pub fn filter(mut self, filter: TransactionFilter) -> Self {
		self.filter = Some(filter);
		self
	}

	pub fn from_uid(mut self, uid: Uuid) -> Self {
		self.from_uid = Some(uid);
		self
	}

	pub fn limit(mut self, limit: usize) -> Self {
		self.limit = limit;
		self
	}
}
