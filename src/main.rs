use monero_wallet_sync::engine::SimulatedEngine;
use monero_wallet_sync::transaction::{MONERO_DECIMALS, TransferBuilder};
use monero_wallet_sync::utils::format_token_amount;
use monero_wallet_sync::wallet::{
	FileWalletStorage, TransactionQuery, WalletEvent, WalletEventHandler, WalletKit,
	WalletSyncError,
};
use monero_wallet_sync::SyncConfig;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Logs every wallet event
struct LoggingEventHandler;

#[async_trait::async_trait]
impl WalletEventHandler for LoggingEventHandler {
	async fn handle(&mut self, event: &WalletEvent) -> Result<(), WalletSyncError> {
		match event {
			WalletEvent::StatusChanged(status) => info!("Status changed: {:?}", status),
			WalletEvent::SyncStateChanged(state) => info!(
				"Sync state: daemon {:?}, wallet {:?}, synchronized {}",
				state.daemon_height, state.wallet_height, state.is_synchronized
			),
			WalletEvent::BalanceChanged(balance) => info!(
				"Balance: {} XMR ({} XMR unlocked)",
				format_token_amount(balance.all, MONERO_DECIMALS),
				format_token_amount(balance.unlocked, MONERO_DECIMALS)
			),
			WalletEvent::TransactionsChanged { inserted, updated } => info!(
				"Transactions: {} inserted, {} updated",
				inserted.len(),
				updated.len()
			),
			WalletEvent::SubaddressesChanged(subaddresses) => {
				info!("Subaddresses: {}", subaddresses.len())
			}
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"LoggingEventHandler"
	}
}

fn load_config() -> Result<SyncConfig, WalletSyncError> {
	match std::env::var_os("WALLET_SYNC_CONFIG") {
		Some(path) => SyncConfig::from_file(&PathBuf::from(path)),
		None => Ok(SyncConfig::default()),
	}
}

/// A wallet a few thousand blocks behind, holding one confirmed and one fresh payment.
fn demo_engine() -> SimulatedEngine {
	let engine = SimulatedEngine::syncing(12_000, 6_000, 750);
	engine.set_transactions(vec![
		SimulatedEngine::incoming(2_500_000_000_000, 5_800, 6_200),
		SimulatedEngine::incoming(400_000_000_000, 11_998, 2),
	]);
	engine.set_balance(2_900_000_000_000, 2_500_000_000_000);
	engine
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = match load_config() {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return;
		}
	};

	info!("Starting wallet sync harness");

	let engine = demo_engine();
	let storage = Arc::new(FileWalletStorage::new(config.data_dir.clone()));
	let (kit, events) = WalletKit::new(Box::new(engine.clone()), storage, config);
	let delivery = events.deliver_to(vec![Box::new(LoggingEventHandler)]);

	if let Err(e) = kit.start().await {
		error!("Failed to start wallet sync: {}", e);
		return;
	}

	match kit.receive_address().await {
		Ok(address) => info!("Receive address: {}", address),
		Err(e) => error!("Failed to read receive address: {}", e),
	}

	let request = TransferBuilder::new()
		.with_address(engine.add_subaddress())
		.with_amount(5_000_000_000_000)
		.build();
	match request {
		Ok(request) => match kit.estimate_fee(request).await {
			Ok(fee) => info!("Estimated fee: {} XMR", format_token_amount(fee, MONERO_DECIMALS)),
			Err(e) => info!("Fee estimate rejected: {}", e),
		},
		Err(e) => error!("Invalid transfer request: {}", e),
	}

	info!("Syncing, press Ctrl-C to exit");
	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for Ctrl-C: {}", e);
	}

	match kit.transactions(TransactionQuery::default()).await {
		Ok(transactions) => info!("{} transactions cached", transactions.len()),
		Err(e) => error!("Failed to read cached transactions: {}", e),
	}

	kit.close();
	drop(kit);
	if let Err(e) = delivery.await {
		error!("Event delivery task failed: {}", e);
	}
	info!("Wallet sync harness stopped");
}
