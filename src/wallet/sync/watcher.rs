//! Locked balance watcher.
//!
//! Funds received with fewer confirmations than the unlock threshold stay locked. After each
//! reconciliation the watcher remembers the height at which the youngest such transaction was
//! mined; once the listener height has moved far enough past it, the funds have matured and the
//! watcher asks for another reconciliation so the unlocked balance is picked up.

use crate::engine::ListenerSignals;
use crate::wallet::TransactionRecord;
use crate::wallet::sync::state::Height;

use serde::{Deserialize, Serialize};

/// Height the watcher counts confirmations from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedWatch {
    pub watch_height: Height,
}

/// What a watcher tick asks of the sync core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchDecision {
    /// The engine listener saw a new transaction
    pub new_transaction: bool,
    /// The watched funds reached the confirmation threshold
    pub matured: bool,
}

impl WatchDecision {
    /// Both triggers coalesce into one reconciliation.
    pub fn reconcile(&self) -> bool {
        self.new_transaction || self.matured
    }
}

#[derive(Debug, Clone)]
pub struct LockedBalanceWatcher {
    threshold: u64,
    watch: Option<LockedWatch>,
}

impl LockedBalanceWatcher {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            watch: None,
        }
    }

    pub fn watch(&self) -> Option<LockedWatch> {
        self.watch
    }

    pub fn clear(&mut self) {
        self.watch = None;
    }

    /// Remove the watch, handing it to the reconciliation it triggered.
    pub fn take(&mut self) -> Option<LockedWatch> {
        self.watch.take()
    }

    /// Put back a watch whose reconciliation failed. A watch armed since is kept.
    pub fn rearm(&mut self, watch: LockedWatch) {
        self.watch.get_or_insert(watch);
    }

    /// Evaluate one tick's listener signals. The watch stays set until taken.
    pub fn on_tick(&mut self, signals: ListenerSignals) -> WatchDecision {
        let matured = match self.watch {
            Some(watch) => {
                signals.height > watch.watch_height
                    && signals.height - watch.watch_height >= self.threshold
            }
            None => false,
        };

        WatchDecision {
            new_transaction: signals.new_transaction,
            matured,
        }
    }

    /// Arm the watch from freshly reconciled transactions.
    ///
    /// Uses the most-confirmed non-failed transaction that is still below the threshold. A watch
    /// already set is kept. Returns the newly armed watch.
    pub fn evaluate(
        &mut self,
        transactions: &[TransactionRecord],
        wallet_height: Height,
    ) -> Option<LockedWatch> {
        if self.watch.is_some() {
            return None;
        }

        let confirmations = transactions
            .iter()
            .filter(|tx| !tx.is_failed && tx.confirmations < self.threshold)
            .map(|tx| tx.confirmations)
            .max()?;

        let watch = LockedWatch {
            watch_height: wallet_height.saturating_sub(confirmations),
        };
        self.watch = Some(watch);
        Some(watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::TransactionDirection;
    use uuid::Uuid;

    fn record(confirmations: u64, is_failed: bool) -> TransactionRecord {
        TransactionRecord {
            uid: Uuid::new_v4(),
            hash: Uuid::new_v4().simple().to_string(),
            direction: TransactionDirection::Incoming,
            block_height: 0,
            amount: 1,
            fee: 0,
            is_pending: false,
            is_failed,
            timestamp: 0,
            confirmations,
            transfers: Vec::new(),
            note: None,
        }
    }

    fn signals(height: Height) -> ListenerSignals {
        ListenerSignals {
            new_transaction: false,
            height,
        }
    }

    #[test]
    fn arms_from_highest_locked_confirmation() {
        let mut watcher = LockedBalanceWatcher::new(10);
        let txs = [record(1, false), record(3, false), record(9, true), record(40, false)];

        assert_eq!(
            watcher.evaluate(&txs, 1_000),
            Some(LockedWatch { watch_height: 997 })
        );
        // an armed watch is not pre-empted
        assert_eq!(watcher.evaluate(&[record(0, false)], 1_005), None);
        assert_eq!(watcher.watch(), Some(LockedWatch { watch_height: 997 }));
    }

    #[test]
    fn nothing_locked_leaves_watch_unset() {
        let mut watcher = LockedBalanceWatcher::new(10);
        assert_eq!(watcher.evaluate(&[record(10, false), record(2, true)], 500), None);
        assert_eq!(watcher.watch(), None);
    }

    #[test]
    fn fires_once_at_threshold() {
        let mut watcher = LockedBalanceWatcher::new(10);
        watcher.evaluate(&[record(3, false)], 1_000);

        assert!(!watcher.on_tick(signals(1_000)).reconcile());
        assert!(!watcher.on_tick(signals(1_006)).reconcile());
        assert!(watcher.on_tick(signals(1_007)).matured);
        assert_eq!(watcher.take(), Some(LockedWatch { watch_height: 997 }));
        assert!(!watcher.on_tick(signals(1_008)).reconcile());
    }

    #[test]
    fn rearmed_watch_fires_again() {
        let mut watcher = LockedBalanceWatcher::new(10);
        watcher.evaluate(&[record(3, false)], 1_000);
        assert!(watcher.on_tick(signals(1_007)).matured);
        let watch = watcher.take().unwrap();

        watcher.rearm(watch);
        assert!(watcher.on_tick(signals(1_010)).matured);

        // a newer watch is not replaced
        watcher.take();
        watcher.evaluate(&[record(1, false)], 1_010);
        watcher.rearm(watch);
        assert_eq!(watcher.watch(), Some(LockedWatch { watch_height: 1_009 }));
    }

    #[test]
    fn new_transaction_signal_requests_reconciliation() {
        let mut watcher = LockedBalanceWatcher::new(10);
        let decision = watcher.on_tick(ListenerSignals {
            new_transaction: true,
            height: 0,
        });
        assert!(decision.new_transaction);
        assert!(!decision.matured);
        assert!(decision.reconcile());
    }
}
