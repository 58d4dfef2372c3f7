//! Wallet facade.
//!
//! `WalletKit` ties one engine, one store and the sync orchestrator together and exposes the
//! operations a wallet UI needs: lifecycle, cached state, history queries, addresses and
//! transfers. Every change it observes is reported on the `WalletEvents` returned by `new`.

use crate::config::SyncConfig;
use crate::engine::{EngineHandle, WalletEngine};
use crate::transaction::{TransactionError, TransferRequest, TransferSender};
use crate::wallet::sync::{
	events::{NotificationDispatcher, WalletEvents},
	orchestrator::{SyncCore, SyncOrchestrator},
	repositories::WalletStorage,
	state::{BalanceSnapshot, SyncState},
};
use crate::wallet::{SubAddressRecord, TransactionQuery, TransactionRecord, WalletSyncError};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

pub struct WalletKit {
	engine: EngineHandle,
	storage: Arc<dyn WalletStorage>,
	orchestrator: SyncOrchestrator,
	sender: TransferSender,
	config: SyncConfig,
	running: AtomicBool,
}

impl WalletKit {
	/// Wrap an opened engine. The returned event receiver is the wallet's only consumer channel.
	pub fn new(
		engine: Box<dyn WalletEngine>,
		storage: Arc<dyn WalletStorage>,
		config: SyncConfig,
	) -> (Self, WalletEvents) {
		let engine = EngineHandle::new(engine);
		let (dispatcher, events) = NotificationDispatcher::channel();
		let core = SyncCore::new(engine.clone(), storage.clone(), dispatcher, config.clone());

		let kit = Self {
			sender: TransferSender::new(engine.clone()),
			orchestrator: SyncOrchestrator::new(core),
			engine,
			storage,
			config,
			running: AtomicBool::new(false),
		};
		(kit, events)
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Start syncing. Calling it while running is a no-op.
	///
	/// The first start seeds heights from storage; every start asks the engine to refresh
	/// before the periodic ticks begin.
	pub async fn start(&self) -> Result<(), WalletSyncError> {
		if self.running.swap(true, Ordering::AcqRel) {
			debug!("Wallet sync already running");
			return Ok(());
		}

		if let Err(e) = self.prepare().await {
			self.running.store(false, Ordering::Release);
			return Err(e);
		}

		self.orchestrator.start_scheduler();
		self.orchestrator.start_watcher();
		info!("Started wallet sync");
		Ok(())
	}

	async fn prepare(&self) -> Result<(), WalletSyncError> {
		self.orchestrator.core().lock().await.restore().await?;
		self.engine.call(|engine| engine.refresh()).await?;
		Ok(())
	}

	/// Stop both periodic ticks. Idempotent; an in-flight tick finishes on its own.
	pub fn stop(&self) {
		if self.running.swap(false, Ordering::AcqRel) {
			self.orchestrator.stop();
			info!("Stopped wallet sync");
		}
	}

	/// Stop syncing and release the engine. Later engine-backed calls fail with
	/// `EngineNotInitialized`.
	pub fn close(&self) {
		self.stop();
		self.engine.close();
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	/// Whether the state scheduler tick is active. It pauses once the wallet is synchronized.
	pub fn is_scheduler_running(&self) -> bool {
		self.orchestrator.is_scheduler_running()
	}

	pub async fn sync_state(&self) -> SyncState {
		self.orchestrator.core().lock().await.state().clone()
	}

	pub async fn balance(&self) -> BalanceSnapshot {
		self.orchestrator.core().lock().await.balance()
	}

	/// Cached transactions, newest first.
	pub async fn transactions(
		&self,
		query: TransactionQuery,
	) -> Result<Vec<TransactionRecord>, WalletSyncError> {
		self.storage.query_transactions(&query).await
	}

	pub async fn subaddresses(&self) -> Result<Vec<SubAddressRecord>, WalletSyncError> {
		self.storage.subaddresses().await
	}

	/// Primary address of the tracked account.
	pub async fn receive_address(&self) -> Result<String, WalletSyncError> {
		let account = self.config.account;
		Ok(self
			.engine
			.call(move |engine| engine.receive_address(account, 0))
			.await?)
	}

	pub async fn validate_address(&self, address: &str) -> Result<bool, WalletSyncError> {
		let address = address.to_string();
		Ok(self
			.engine
			.call(move |engine| engine.validate_address(&address))
			.await?)
	}

	/// Send a transfer and return its fee. Resumes state checks so the new transaction is
	/// tracked to confirmation.
	pub async fn send(&self, request: TransferRequest) -> Result<u64, TransactionError> {
		let fee = self.sender.send(request).await?;
		if self.is_running() && self.orchestrator.start_scheduler() {
			debug!("Resumed state checks after send");
		}
		Ok(fee)
	}

	pub async fn estimate_fee(&self, request: TransferRequest) -> Result<u64, TransactionError> {
		self.sender.estimate_fee(request).await
	}
}
