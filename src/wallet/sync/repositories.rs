use crate::wallet::{
	BlockHeightsSnapshot, SubAddressRecord, TransactionQuery, TransactionRecord, WalletSyncError,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Local cache of the wallet's transactions, subaddresses and last seen heights
#[async_trait::async_trait]
pub trait WalletStorage: Send + Sync {
	/// Replace the whole transaction set, keyed by hash.
	async fn replace_transactions(
		&self,
		transactions: &[TransactionRecord],
	) -> Result<(), WalletSyncError>;

	/// Replace the whole subaddress set of the tracked account.
	async fn replace_subaddresses(
		&self,
		subaddresses: &[SubAddressRecord],
	) -> Result<(), WalletSyncError>;

	async fn transactions(&self) -> Result<Vec<TransactionRecord>, WalletSyncError>;

	async fn transaction_by_uid(
		&self,
		uid: Uuid,
	) -> Result<Option<TransactionRecord>, WalletSyncError>;

	async fn subaddresses(&self) -> Result<Vec<SubAddressRecord>, WalletSyncError>;

	async fn address_exists(&self, address: &str) -> Result<bool, WalletSyncError>;

	async fn block_heights(&self) -> Result<Option<BlockHeightsSnapshot>, WalletSyncError>;

	async fn set_block_heights(
		&self,
		heights: BlockHeightsSnapshot,
	) -> Result<(), WalletSyncError>;

	/// Page through transactions, newest first.
	///
	/// An unknown `from_uid` is ignored and the page starts at the newest record.
	async fn query_transactions(
		&self,
		query: &TransactionQuery,
	) -> Result<Vec<TransactionRecord>, WalletSyncError> {
		let before = match query.from_uid {
			Some(uid) => self.transaction_by_uid(uid).await?.map(|tx| tx.timestamp),
			None => None,
		};
		Ok(select_page(self.transactions().await?, query, before))
	}
}

/// Apply a query's cursor, filter and limit to a full record set.
pub fn select_page(
	mut transactions: Vec<TransactionRecord>,
	query: &TransactionQuery,
	before: Option<i64>,
) -> Vec<TransactionRecord> {
	transactions.retain(|tx| {
		before.is_none_or(|timestamp| tx.timestamp < timestamp)
			&& query.filter.is_none_or(|filter| filter.matches(tx.direction))
	});
	transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
	transactions.truncate(query.limit);
	transactions
}

/// In-memory implementation of WalletStorage
#[derive(Default)]
pub struct MemoryWalletStorage {
	inner: RwLock<MemoryContents>,
}

#[derive(Default)]
struct MemoryContents {
	transactions: Vec<TransactionRecord>,
	subaddresses: Vec<SubAddressRecord>,
	block_heights: Option<BlockHeightsSnapshot>,
}

impl MemoryWalletStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl WalletStorage for MemoryWalletStorage {
	async fn replace_transactions(
		&self,
		transactions: &[TransactionRecord],
	) -> Result<(), WalletSyncError> {
		self.inner.write().await.transactions = transactions.to_vec();
		Ok(())
	}

	async fn replace_subaddresses(
		&self,
		subaddresses: &[SubAddressRecord],
	) -> Result<(), WalletSyncError> {
		self.inner.write().await.subaddresses = subaddresses.to_vec();
		Ok(())
	}

	async fn transactions(&self) -> Result<Vec<TransactionRecord>, WalletSyncError> {
		Ok(self.inner.read().await.transactions.clone())
	}

	async fn transaction_by_uid(
		&self,
		uid: Uuid,
	) -> Result<Option<TransactionRecord>, WalletSyncError> {
		Ok(self
			.inner
			.read()
			.await
			.transactions
			.iter()
			.find(|tx| tx.uid == uid)
			.cloned())
	}

	async fn subaddresses(&self) -> Result<Vec<SubAddressRecord>, WalletSyncError> {
		Ok(self.inner.read().await.subaddresses.clone())
	}

	async fn address_exists(&self, address: &str) -> Result<bool, WalletSyncError> {
		Ok(self
			.inner
			.read()
			.await
			.subaddresses
			.iter()
			.any(|sub| sub.address == address))
	}

	async fn block_heights(&self) -> Result<Option<BlockHeightsSnapshot>, WalletSyncError> {
		Ok(self.inner.read().await.block_heights)
	}

	async fn set_block_heights(
		&self,
		heights: BlockHeightsSnapshot,
	) -> Result<(), WalletSyncError> {
		self.inner.write().await.block_heights = Some(heights);
		Ok(())
	}
}

/// On-disk form of the block heights row
#[derive(Serialize, Deserialize)]
struct BlockHeightsFile {
	#[serde(flatten)]
	heights: BlockHeightsSnapshot,
	updated_at: String,
}

/// File-based implementation of WalletStorage.
///
/// Each set lives in its own JSON file under `data_dir`. Writes go to a temporary file that is
/// then renamed over the previous one, so readers never see a partial set.
pub struct FileWalletStorage {
	data_dir: PathBuf,
}

impl FileWalletStorage {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	fn transactions_path(&self) -> PathBuf {
		self.data_dir.join("transactions.json")
	}

	fn subaddresses_path(&self) -> PathBuf {
		self.data_dir.join("subaddresses.json")
	}

	fn block_heights_path(&self) -> PathBuf {
		self.data_dir.join("block_heights.json")
	}

	async fn write_json<T: Serialize + ?Sized>(
		&self,
		path: &Path,
		value: &T,
	) -> Result<(), WalletSyncError> {
		tokio::fs::create_dir_all(&self.data_dir)
			.await
			.map_err(|e| {
				WalletSyncError::StorageError(format!(
					"Failed to create data directory {:?}: {}",
					self.data_dir, e
				))
			})?;

		let content = serde_json::to_vec_pretty(value)?;
		let tmp_path = path.with_extension("json.tmp");
		tokio::fs::write(&tmp_path, &content).await.map_err(|e| {
			WalletSyncError::StorageError(format!("Failed to write {:?}: {}", tmp_path, e))
		})?;
		tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
			WalletSyncError::StorageError(format!("Failed to replace {:?}: {}", path, e))
		})?;

		debug!("Wrote {} bytes to {:?}", content.len(), path);
		Ok(())
	}

	async fn read_json<T: DeserializeOwned>(
		&self,
		path: &Path,
	) -> Result<Option<T>, WalletSyncError> {
		let content = match tokio::fs::read(path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(WalletSyncError::StorageError(format!(
					"Failed to read {:?}: {}",
					path, e
				)));
			}
		};
		Ok(Some(serde_json::from_slice(&content)?))
	}
}

#[async_trait::async_trait]
impl WalletStorage for FileWalletStorage {
	async fn replace_transactions(
		&self,
		transactions: &[TransactionRecord],
	) -> Result<(), WalletSyncError> {
		self.write_json(&self.transactions_path(), transactions)
			.await?;
		info!("Stored {} transactions", transactions.len());
		Ok(())
	}

	async fn replace_subaddresses(
		&self,
		subaddresses: &[SubAddressRecord],
	) -> Result<(), WalletSyncError> {
		self.write_json(&self.subaddresses_path(), subaddresses)
			.await
	}

	async fn transactions(&self) -> Result<Vec<TransactionRecord>, WalletSyncError> {
		Ok(self
			.read_json(&self.transactions_path())
			.await?
			.unwrap_or_default())
	}

	async fn transaction_by_uid(
		&self,
		uid: Uuid,
	) -> Result<Option<TransactionRecord>, WalletSyncError> {
		Ok(self
			.transactions()
			.await?
			.into_iter()
			.find(|tx| tx.uid == uid))
	}

	async fn subaddresses(&self) -> Result<Vec<SubAddressRecord>, WalletSyncError> {
		Ok(self
			.read_json(&self.subaddresses_path())
			.await?
			.unwrap_or_default())
	}

	async fn address_exists(&self, address: &str) -> Result<bool, WalletSyncError> {
		Ok(self
			.subaddresses()
			.await?
			.iter()
			.any(|sub| sub.address == address))
	}

	async fn block_heights(&self) -> Result<Option<BlockHeightsSnapshot>, WalletSyncError> {
		let file: Option<BlockHeightsFile> = self.read_json(&self.block_heights_path()).await?;
		Ok(file.map(|file| file.heights))
	}

	async fn set_block_heights(
		&self,
		heights: BlockHeightsSnapshot,
	) -> Result<(), WalletSyncError> {
		let file = BlockHeightsFile {
			heights,
			updated_at: chrono::Utc::now().to_rfc3339(),
		};
		self.write_json(&self.block_heights_path(), &file).await
	}
}

/// Memory storage whose next write of a chosen set fails once.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FailingOnceStorage {
	inner: MemoryWalletStorage,
	fail_transactions: std::sync::atomic::AtomicBool,
	fail_block_heights: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FailingOnceStorage {
	pub(crate) fn fail_next_transactions_write(&self) {
		self.fail_transactions
			.store(true, std::sync::atomic::Ordering::SeqCst);
	}

	pub(crate) fn fail_next_block_heights_write(&self) {
		self.fail_block_heights
			.store(true, std::sync::atomic::Ordering::SeqCst);
	}

	fn check(flag: &std::sync::atomic::AtomicBool, set: &str) -> Result<(), WalletSyncError> {
		if flag.swap(false, std::sync::atomic::Ordering::SeqCst) {
			return Err(WalletSyncError::StorageError(format!("Failed to write {}", set)));
		}
		Ok(())
	}
}

#[cfg(test)]
#[async_trait::async_trait]
impl WalletStorage for FailingOnceStorage {
	async fn replace_transactions(
		&self,
		transactions: &[TransactionRecord],
	) -> Result<(), WalletSyncError> {
		Self::check(&self.fail_transactions, "transactions")?;
		self.inner.replace_transactions(transactions).await
	}

	async fn replace_subaddresses(
		&self,
		subaddresses: &[SubAddressRecord],
	) -> Result<(), WalletSyncError> {
		self.inner.replace_subaddresses(subaddresses).await
	}

	async fn transactions(&self) -> Result<Vec<TransactionRecord>, WalletSyncError> {
		self.inner.transactions().await
	}

	async fn transaction_by_uid(
		&self,
		uid: Uuid,
	) -> Result<Option<TransactionRecord>, WalletSyncError> {
		self.inner.transaction_by_uid(uid).await
	}

	async fn subaddresses(&self) -> Result<Vec<SubAddressRecord>, WalletSyncError> {
		self.inner.subaddresses().await
	}

	async fn address_exists(&self, address: &str) -> Result<bool, WalletSyncError> {
		self.inner.address_exists(address).await
	}

	async fn block_heights(&self) -> Result<Option<BlockHeightsSnapshot>, WalletSyncError> {
		self.inner.block_heights().await
	}

	async fn set_block_heights(
		&self,
		heights: BlockHeightsSnapshot,
	) -> Result<(), WalletSyncError> {
		Self::check(&self.fail_block_heights, "block heights")?;
		self.inner.set_block_heights(heights).await
	}
}
