//! Reconciliation of the local cache with the engine.
//!
//! A reconciliation fetches the engine's full history, subaddresses and balance in one serialized
//! engine call, replaces the stored sets wholesale, and reports what changed so the orchestrator
//! can notify consumers. It runs when the wallet is synchronized, after every
//! `store_blocks_count` scanned blocks while catching up, and on watcher request.

use crate::engine::{EngineDirection, EngineHandle, RawTransaction, WalletEngine};
use crate::wallet::sync::repositories::WalletStorage;
use crate::wallet::sync::state::{BalanceSnapshot, Height, SyncState};
use crate::wallet::sync::watcher::{LockedBalanceWatcher, LockedWatch};
use crate::wallet::{
    BlockHeightsSnapshot, SubAddressRecord, TransactionDirection, TransactionRecord,
    WalletSyncError,
};

use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Whether enough blocks were scanned since the last reconciliation to store an intermediate
/// result.
pub fn chunk_of_blocks_synced(last_downloaded: Height, wallet_height: Height, chunk: u64) -> bool {
    last_downloaded <= wallet_height && wallet_height - last_downloaded >= chunk
}

/// Why a reconciliation ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileReason {
    Synchronized,
    ChunkOfBlocksSynced,
    NewTransaction,
    LockedFundsMatured,
}

/// Everything a reconciliation reads from the engine
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub transactions: Vec<RawTransaction>,
    pub subaddresses: Vec<String>,
    pub balance: BalanceSnapshot,
}

/// Read history, subaddresses and balance of `account`.
pub fn fetch_snapshot(engine: &mut dyn WalletEngine, account: u32) -> EngineSnapshot {
    EngineSnapshot {
        transactions: engine.transaction_history(),
        subaddresses: engine.subaddresses(account),
        balance: BalanceSnapshot {
            all: engine.balance(account),
            unlocked: engine.unlocked_balance(account),
        },
    }
}

/// Changes produced by one reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// New balance, when it differs from the previous one
    pub balance: Option<BalanceSnapshot>,
    pub inserted: Vec<TransactionRecord>,
    pub updated: Vec<TransactionRecord>,
    /// New subaddress set, when it differs from the stored one
    pub subaddresses: Option<Vec<SubAddressRecord>>,
    pub armed_watch: Option<LockedWatch>,
}

impl ReconcileOutcome {
    pub fn transactions_changed(&self) -> bool {
        !self.inserted.is_empty() || !self.updated.is_empty()
    }

    /// Fold one cycle's transaction diff into changes not yet reported.
    ///
    /// A record inserted earlier and changed since stays an insertion.
    fn merge_transactions(
        &mut self,
        inserted: Vec<TransactionRecord>,
        updated: Vec<TransactionRecord>,
    ) {
        for record in inserted {
            upsert(&mut self.inserted, record);
        }
        for record in updated {
            match self.inserted.iter_mut().find(|tx| tx.hash == record.hash) {
                Some(slot) => *slot = record,
                None => upsert(&mut self.updated, record),
            }
        }
    }
}

fn upsert(records: &mut Vec<TransactionRecord>, record: TransactionRecord) {
    match records.iter_mut().find(|tx| tx.hash == record.hash) {
        Some(slot) => *slot = record,
        None => records.push(record),
    }
}

#[derive(Debug)]
pub struct ReconciliationCoordinator {
    last_downloaded_block_height: Height,
    balance: BalanceSnapshot,
    /// Changes written to storage by a cycle that failed before completing
    unreported: ReconcileOutcome,
    chunk: u64,
    account: u32,
}

impl ReconciliationCoordinator {
    pub fn new(chunk: u64, account: u32) -> Self {
        Self {
            last_downloaded_block_height: 0,
            balance: BalanceSnapshot::default(),
            unreported: ReconcileOutcome::default(),
            chunk,
            account,
        }
    }

    pub fn last_downloaded_block_height(&self) -> Height {
        self.last_downloaded_block_height
    }

    /// Seed the height from a previous run.
    pub fn restore_last_downloaded(&mut self, height: Height) {
        self.last_downloaded_block_height = height;
    }

    pub fn balance(&self) -> BalanceSnapshot {
        self.balance
    }

    /// Decide whether a freshly published state calls for a reconciliation.
    ///
    /// Only states with an ok status qualify. A wallet height below the last reconciled height
    /// resets the bookkeeping to the new height and drops the locked watch.
    pub fn trigger_for(
        &mut self,
        state: &SyncState,
        watcher: &mut LockedBalanceWatcher,
    ) -> Option<ReconcileReason> {
        if !state.status.is_ok() {
            return None;
        }
        let wallet_height = state.wallet_height?;

        if wallet_height < self.last_downloaded_block_height {
            warn!(
                "Wallet height regressed from {} to {}, resetting reconciliation height",
                self.last_downloaded_block_height, wallet_height
            );
            self.last_downloaded_block_height = wallet_height;
            watcher.clear();
        }

        if state.is_synchronized {
            Some(ReconcileReason::Synchronized)
        } else if chunk_of_blocks_synced(
            self.last_downloaded_block_height,
            wallet_height,
            self.chunk,
        ) {
            Some(ReconcileReason::ChunkOfBlocksSynced)
        } else {
            None
        }
    }

    /// Fetch from the engine and replace the stored sets.
    ///
    /// A storage failure aborts before the balance, watch and reconciled height are touched, so
    /// the next trigger retries the whole cycle. Changes already written by the failed cycle are
    /// reported by the next one that completes.
    pub async fn reconcile(
        &mut self,
        engine: &EngineHandle,
        storage: &dyn WalletStorage,
        state: &SyncState,
        watcher: &mut LockedBalanceWatcher,
        reason: ReconcileReason,
    ) -> Result<ReconcileOutcome, WalletSyncError> {
        let account = self.account;
        let snapshot = engine
            .call(move |engine| fetch_snapshot(engine, account))
            .await?;
        debug!(
            "Reconciling ({:?}): {} transactions, {} subaddresses",
            reason,
            snapshot.transactions.len(),
            snapshot.subaddresses.len()
        );

        let subaddresses = subaddress_records(&snapshot.subaddresses, &snapshot.transactions);
        let previous_subaddresses = storage.subaddresses().await?;
        storage.replace_subaddresses(&subaddresses).await?;
        if previous_subaddresses != subaddresses {
            self.unreported.subaddresses = Some(subaddresses);
        }

        let previous = storage.transactions().await?;
        let records = classify(snapshot.transactions, &previous, storage).await?;
        storage.replace_transactions(&records).await?;
        let (inserted, updated) = diff_transactions(&previous, &records);
        self.unreported.merge_transactions(inserted, updated);

        let wallet_height = state.wallet_height.unwrap_or(self.last_downloaded_block_height);
        storage
            .set_block_heights(BlockHeightsSnapshot {
                daemon_height: state.daemon_height.unwrap_or(wallet_height),
                wallet_height,
            })
            .await?;

        let mut outcome = std::mem::take(&mut self.unreported);
        if snapshot.balance != self.balance {
            self.balance = snapshot.balance;
            outcome.balance = Some(snapshot.balance);
        }

        outcome.armed_watch = watcher.evaluate(&records, wallet_height);
        if let Some(watch) = outcome.armed_watch {
            debug!("Watching locked funds from height {}", watch.watch_height);
        }

        self.last_downloaded_block_height = self.last_downloaded_block_height.max(wallet_height);

        info!(
            "Reconciled at height {} ({:?}): {} inserted, {} updated",
            wallet_height,
            reason,
            outcome.inserted.len(),
            outcome.updated.len()
        );
        Ok(outcome)
    }
}

fn subaddress_records(addresses: &[String], transactions: &[RawTransaction]) -> Vec<SubAddressRecord> {
    addresses
        .iter()
        .enumerate()
        .map(|(index, address)| SubAddressRecord {
            address: address.clone(),
            index: index as u32,
            transactions_count: transactions
                .iter()
                .filter(|tx| tx.transfers.iter().any(|t| &t.address == address))
                .count(),
        })
        .collect()
}

/// Map engine transactions to records, newest first.
///
/// A transaction whose first transfer goes to one of the wallet's own subaddresses is
/// sent-to-self. Uids of hashes already stored are kept.
async fn classify(
    transactions: Vec<RawTransaction>,
    previous: &[TransactionRecord],
    storage: &dyn WalletStorage,
) -> Result<Vec<TransactionRecord>, WalletSyncError> {
    let uids: HashMap<&str, Uuid> = previous
        .iter()
        .map(|tx| (tx.hash.as_str(), tx.uid))
        .collect();

    let mut records = Vec::with_capacity(transactions.len());
    for tx in transactions {
        let to_self = match tx.transfers.first() {
            Some(transfer) => storage.address_exists(&transfer.address).await?,
            None => false,
        };
        let direction = match tx.direction {
            _ if to_self => TransactionDirection::SentToSelf,
            EngineDirection::In => TransactionDirection::Incoming,
            EngineDirection::Out => TransactionDirection::Outgoing,
        };

        records.push(TransactionRecord {
            uid: uids
                .get(tx.hash.as_str())
                .copied()
                .unwrap_or_else(Uuid::new_v4),
            hash: tx.hash,
            direction,
            block_height: tx.block_height,
            amount: tx.amount,
            fee: tx.fee,
            is_pending: tx.is_pending,
            is_failed: tx.is_failed,
            timestamp: tx.timestamp,
            confirmations: tx.confirmations,
            transfers: tx.transfers,
            note: tx.note,
        });
    }

    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
}

/// Split `current` into records new since `previous` and records whose contents changed.
fn diff_transactions(
    previous: &[TransactionRecord],
    current: &[TransactionRecord],
) -> (Vec<TransactionRecord>, Vec<TransactionRecord>) {
    let known: HashMap<&str, &TransactionRecord> =
        previous.iter().map(|tx| (tx.hash.as_str(), tx)).collect();

    let mut inserted = Vec::new();
    let mut updated = Vec::new();
    for tx in current {
        match known.get(tx.hash.as_str()) {
            None => inserted.push(tx.clone()),
            Some(old) if *old != tx => updated.push(tx.clone()),
            Some(_) => {}
        }
    }
    (inserted, updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SimulatedEngine, Transfer};
    use crate::wallet::sync::repositories::{FailingOnceStorage, MemoryWalletStorage};
    use crate::wallet::sync::state::StatusCategory;

    fn ok_state(daemon: Height, wallet: Height, synchronized: bool) -> SyncState {
        SyncState {
            status: StatusCategory::Ok,
            daemon_height: Some(daemon),
            wallet_height: Some(wallet),
            is_synchronized: synchronized,
        }
    }

    #[test]
    fn chunk_threshold() {
        assert!(!chunk_of_blocks_synced(1_000, 2_999, 2_000));
        assert!(chunk_of_blocks_synced(1_000, 3_000, 2_000));
        assert!(!chunk_of_blocks_synced(5_000, 3_000, 2_000));
    }

    #[test]
    fn only_ok_states_trigger() {
        let mut coordinator = ReconciliationCoordinator::new(2_000, 0);
        let mut watcher = LockedBalanceWatcher::new(10);

        let mut state = ok_state(100, 100, true);
        state.status = StatusCategory::Error("offline".into());
        assert_eq!(coordinator.trigger_for(&state, &mut watcher), None);

        assert_eq!(
            coordinator.trigger_for(&ok_state(100, 100, true), &mut watcher),
            Some(ReconcileReason::Synchronized)
        );
        assert_eq!(
            coordinator.trigger_for(&ok_state(9_000, 1_999, false), &mut watcher),
            None
        );
        assert_eq!(
            coordinator.trigger_for(&ok_state(9_000, 2_000, false), &mut watcher),
            Some(ReconcileReason::ChunkOfBlocksSynced)
        );
    }

    #[test]
    fn height_regression_resets_bookkeeping() {
        let mut coordinator = ReconciliationCoordinator::new(2_000, 0);
        let mut watcher = LockedBalanceWatcher::new(10);
        coordinator.restore_last_downloaded(5_000);
        watcher.evaluate(&[record("locked", 2)], 5_000);
        assert!(watcher.watch().is_some());

        assert_eq!(
            coordinator.trigger_for(&ok_state(9_000, 4_000, false), &mut watcher),
            None
        );
        assert_eq!(coordinator.last_downloaded_block_height(), 4_000);
        assert_eq!(watcher.watch(), None);
    }

    #[tokio::test]
    async fn reconcile_classifies_and_diffs() {
        let engine = SimulatedEngine::new();
        let own = engine.add_subaddress();
        let external = format!("4{}", "0".repeat(94));

        let received = SimulatedEngine::incoming(5_000, 90, 3);
        let to_self = SimulatedEngine::outgoing(&own, 1_000, 80, 20);
        let spent = SimulatedEngine::outgoing(&external, 2_000, 70, 30);
        engine.set_transactions(vec![spent.clone(), to_self.clone(), received.clone()]);
        engine.set_balance(7_000, 2_000);

        let handle = EngineHandle::new(Box::new(engine.clone()));
        let storage = MemoryWalletStorage::new();
        let mut coordinator = ReconciliationCoordinator::new(2_000, 0);
        let mut watcher = LockedBalanceWatcher::new(10);
        let state = ok_state(100, 100, true);

        let outcome = coordinator
            .reconcile(&handle, &storage, &state, &mut watcher, ReconcileReason::Synchronized)
            .await
            .unwrap();

        assert_eq!(outcome.inserted.len(), 3);
        assert!(outcome.updated.is_empty());
        assert_eq!(
            outcome.balance,
            Some(BalanceSnapshot {
                all: 7_000,
                unlocked: 2_000
            })
        );
        assert_eq!(outcome.armed_watch, Some(LockedWatch { watch_height: 97 }));
        assert_eq!(coordinator.last_downloaded_block_height(), 100);

        let stored = storage.transactions().await.unwrap();
        let direction_of = |hash: &str| {
            stored
                .iter()
                .find(|tx| tx.hash == hash)
                .map(|tx| tx.direction)
        };
        assert_eq!(direction_of(&received.hash), Some(TransactionDirection::Incoming));
        assert_eq!(direction_of(&to_self.hash), Some(TransactionDirection::SentToSelf));
        assert_eq!(direction_of(&spent.hash), Some(TransactionDirection::Outgoing));

        let subaddresses = outcome.subaddresses.unwrap();
        assert_eq!(subaddresses.len(), 2);
        assert_eq!(subaddresses[0].transactions_count, 0);
        assert_eq!(subaddresses[1].address, own);
        assert_eq!(subaddresses[1].transactions_count, 1);
        assert_eq!(
            storage.block_heights().await.unwrap(),
            Some(BlockHeightsSnapshot {
                daemon_height: 100,
                wallet_height: 100
            })
        );

        // refetch: uids stay, only the changed record is reported
        engine.set_confirmations(&received.hash, 4);
        let again = coordinator
            .reconcile(&handle, &storage, &state, &mut watcher, ReconcileReason::NewTransaction)
            .await
            .unwrap();
        assert!(again.inserted.is_empty());
        assert_eq!(again.updated.len(), 1);
        assert_eq!(again.updated[0].hash, received.hash);
        assert_eq!(again.balance, None);
        assert_eq!(again.subaddresses, None);
        assert_eq!(again.armed_watch, None);

        let uid_before = stored.iter().find(|tx| tx.hash == received.hash).map(|tx| tx.uid);
        assert_eq!(Some(again.updated[0].uid), uid_before);
    }

    #[tokio::test]
    async fn receipt_on_own_subaddress_is_sent_to_self() {
        let engine = SimulatedEngine::new();
        let own = engine.add_subaddress();
        let churn = RawTransaction {
            transfers: vec![Transfer {
                address: own,
                amount: 1_000,
            }],
            ..SimulatedEngine::incoming(1_000, 90, 20)
        };
        let plain = SimulatedEngine::incoming(2_000, 91, 20);
        engine.set_transactions(vec![churn.clone(), plain.clone()]);

        let handle = EngineHandle::new(Box::new(engine));
        let storage = MemoryWalletStorage::new();
        let mut coordinator = ReconciliationCoordinator::new(2_000, 0);
        let mut watcher = LockedBalanceWatcher::new(10);
        coordinator
            .reconcile(
                &handle,
                &storage,
                &ok_state(100, 100, true),
                &mut watcher,
                ReconcileReason::Synchronized,
            )
            .await
            .unwrap();

        let stored = storage.transactions().await.unwrap();
        let direction_of = |hash: &str| {
            stored
                .iter()
                .find(|tx| tx.hash == hash)
                .map(|tx| tx.direction)
        };
        assert_eq!(direction_of(&churn.hash), Some(TransactionDirection::SentToSelf));
        assert_eq!(direction_of(&plain.hash), Some(TransactionDirection::Incoming));
    }

    #[tokio::test]
    async fn failed_cycle_is_reported_by_the_next_one() {
        let engine = SimulatedEngine::new();
        engine.add_subaddress();
        let received = SimulatedEngine::incoming(5_000, 98, 2);
        engine.set_transactions(vec![received.clone()]);
        engine.set_balance(5_000, 0);

        let handle = EngineHandle::new(Box::new(engine.clone()));
        let storage = FailingOnceStorage::default();
        let mut coordinator = ReconciliationCoordinator::new(2_000, 0);
        let mut watcher = LockedBalanceWatcher::new(10);
        let state = ok_state(100, 100, true);

        storage.fail_next_block_heights_write();
        let failed = coordinator
            .reconcile(&handle, &storage, &state, &mut watcher, ReconcileReason::Synchronized)
            .await;
        assert!(matches!(failed, Err(WalletSyncError::StorageError(_))));
        assert_eq!(coordinator.balance(), BalanceSnapshot::default());
        assert_eq!(coordinator.last_downloaded_block_height(), 0);
        assert_eq!(watcher.watch(), None);
        // the sets were written before the failure
        assert_eq!(storage.transactions().await.unwrap().len(), 1);

        // a record changed between the attempts is still reported as new
        engine.set_confirmations(&received.hash, 3);
        let outcome = coordinator
            .reconcile(&handle, &storage, &state, &mut watcher, ReconcileReason::Synchronized)
            .await
            .unwrap();
        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(outcome.inserted[0].confirmations, 3);
        assert!(outcome.updated.is_empty());
        assert_eq!(outcome.subaddresses.map(|subs| subs.len()), Some(2));
        assert_eq!(
            outcome.balance,
            Some(BalanceSnapshot {
                all: 5_000,
                unlocked: 0
            })
        );
        assert_eq!(outcome.armed_watch, Some(LockedWatch { watch_height: 97 }));
        assert_eq!(coordinator.last_downloaded_block_height(), 100);

        let settled = coordinator
            .reconcile(&handle, &storage, &state, &mut watcher, ReconcileReason::Synchronized)
            .await
            .unwrap();
        assert!(!settled.transactions_changed());
        assert_eq!(settled.subaddresses, None);
        assert_eq!(settled.balance, None);
    }

    fn record(hash: &str, confirmations: u64) -> TransactionRecord {
        TransactionRecord {
            uid: Uuid::new_v4(),
            hash: hash.into(),
            direction: TransactionDirection::Outgoing,
            block_height: 1,
            amount: 1,
            fee: 1,
            is_pending: false,
            is_failed: false,
            timestamp: 1,
            confirmations,
            transfers: vec![Transfer {
                address: "x".into(),
                amount: 1,
            }],
            note: None,
        }
    }

    #[test]
    fn unchanged_history_reports_nothing() {
        let tx = record("a", 50);
        let (inserted, updated) = diff_transactions(&[tx.clone()], &[tx]);
        assert!(inserted.is_empty());
        assert!(updated.is_empty());
    }
}
