//! Wallet sync orchestrator and integration point for all sync services.
//!
//! `SyncCore` holds the mutable sync state (published `SyncState`, probe clock, status tracker,
//! reconciliation bookkeeping and the locked watch) and turns ticks into engine probes,
//! reconciliations and events. Its tick methods take the current instant and return a
//! `TickFlow`, so tests drive them directly without timers.
//!
//! `SyncOrchestrator` owns the core behind one async mutex and runs two `PeriodicTicker`s over it:
//! - the scheduler tick probes the engine when the adaptive interval says so and reconciles once
//!   the wallet is synchronized or has scanned another chunk of blocks;
//! - the watcher tick reads the engine listener and reconciles on new transactions or matured
//!   locked funds.
//!
//! A tick that finds the core busy is dropped, so the two tasks never run engine work
//! concurrently and neither ever queues behind a slow probe.

use crate::config::SyncConfig;
use crate::engine::{EngineHandle, ListenerSignals, WalletEngine};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::{
    events::{NotificationDispatcher, WalletEvent},
    probe::{ProbeOutcome, probe_state},
    reconciliation::{ReconcileReason, ReconciliationCoordinator},
    repositories::WalletStorage,
    scheduler::ProbeClock,
    state::{BalanceSnapshot, Height, StatusTracker, SyncState},
    ticker::{PeriodicTicker, TickFlow},
    watcher::{LockedBalanceWatcher, LockedWatch},
};

use futures::FutureExt;
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Mutable state of the sync process, driven one tick at a time.
pub struct SyncCore {
    engine: EngineHandle,
    storage: Arc<dyn WalletStorage>,
    dispatcher: NotificationDispatcher,
    config: SyncConfig,

    state: SyncState,
    clock: ProbeClock,
    status: StatusTracker,
    coordinator: ReconciliationCoordinator,
    watcher: LockedBalanceWatcher,
    restored: bool,
}

impl SyncCore {
    pub fn new(
        engine: EngineHandle,
        storage: Arc<dyn WalletStorage>,
        dispatcher: NotificationDispatcher,
        config: SyncConfig,
    ) -> Self {
        Self {
            coordinator: ReconciliationCoordinator::new(config.store_blocks_count, config.account),
            watcher: LockedBalanceWatcher::new(config.confirmations_threshold),
            engine,
            storage,
            dispatcher,
            config,
            state: SyncState::default(),
            clock: ProbeClock::default(),
            status: StatusTracker::default(),
            restored: false,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn balance(&self) -> BalanceSnapshot {
        self.coordinator.balance()
    }

    pub fn locked_watch(&self) -> Option<LockedWatch> {
        self.watcher.watch()
    }

    pub fn last_downloaded_block_height(&self) -> Height {
        self.coordinator.last_downloaded_block_height()
    }

    /// Seed heights from the block heights stored by a previous run. Only the first call reads
    /// storage.
    pub async fn restore(&mut self) -> Result<(), WalletSyncError> {
        if self.restored {
            return Ok(());
        }
        if let Some(heights) = self.storage.block_heights().await? {
            info!(
                "Restored block heights: daemon {}, wallet {}",
                heights.daemon_height, heights.wallet_height
            );
            self.coordinator
                .restore_last_downloaded(heights.wallet_height);
            self.state.daemon_height = Some(heights.daemon_height);
            self.state.wallet_height = Some(heights.wallet_height);
        }
        self.restored = true;
        Ok(())
    }

    /// One scheduler tick: probe if due, then reconcile if the new state calls for it.
    ///
    /// Returns `TickFlow::Stop` after a synchronized reconciliation succeeds, on a critical status
    /// when `stop_on_critical` is set, and once the engine is closed.
    pub async fn on_scheduler_tick(&mut self, now: Instant) -> TickFlow {
        if !self.clock.is_due(&self.state, now) {
            return TickFlow::Continue;
        }

        let state = match self.probe(now).await {
            Ok(Some(state)) => state,
            Ok(None) => return TickFlow::Continue,
            Err(e) => {
                debug!("Stopping scheduler: {}", e);
                return TickFlow::Stop;
            }
        };

        if state.status.is_critical() && self.config.stop_on_critical {
            warn!("Engine reported a critical status, stopping state checks");
            return TickFlow::Stop;
        }

        let Some(reason) = self.coordinator.trigger_for(&state, &mut self.watcher) else {
            return TickFlow::Continue;
        };

        match self.reconcile(reason).await {
            Ok(()) if reason == ReconcileReason::Synchronized => {
                info!("Wallet synchronized at height {:?}", state.wallet_height);
                TickFlow::Stop
            }
            Ok(()) => TickFlow::Continue,
            Err(WalletSyncError::EngineNotInitialized(_)) => TickFlow::Stop,
            Err(e) => {
                warn!("Reconciliation failed, retrying next tick: {}", e);
                TickFlow::Continue
            }
        }
    }

    /// One watcher tick: read the listener and reconcile on a new transaction or matured funds.
    pub async fn on_watcher_tick(&mut self, now: Instant) -> TickFlow {
        let signals = match self.engine.call(read_listener).await {
            Ok(signals) => signals,
            Err(e) => {
                debug!("Stopping watcher: {}", e);
                return TickFlow::Stop;
            }
        };

        let decision = self.watcher.on_tick(signals);
        if !decision.reconcile() {
            return TickFlow::Continue;
        }

        // work on current heights, whatever the adaptive interval says
        if let Err(e) = self.probe(now).await {
            debug!("Stopping watcher: {}", e);
            return TickFlow::Stop;
        }

        let reason = if decision.new_transaction {
            ReconcileReason::NewTransaction
        } else {
            ReconcileReason::LockedFundsMatured
        };
        let matured = if decision.matured {
            self.watcher.take()
        } else {
            None
        };

        match self.reconcile(reason).await {
            Ok(()) => {
                if decision.new_transaction
                    && self
                        .engine
                        .call(|engine| engine.reset_new_transaction())
                        .await
                        .is_err()
                {
                    return TickFlow::Stop;
                }
                TickFlow::Continue
            }
            Err(WalletSyncError::EngineNotInitialized(_)) => TickFlow::Stop,
            Err(e) => {
                if let Some(watch) = matured {
                    self.watcher.rearm(watch);
                }
                warn!("Reconciliation failed, retrying next tick: {}", e);
                TickFlow::Continue
            }
        }
    }

    /// Probe the engine and publish a conclusive result.
    async fn probe(&mut self, now: Instant) -> Result<Option<SyncState>, WalletSyncError> {
        let outcome = self.engine.call(probe_state).await;
        self.clock.mark_checked(now);

        match outcome? {
            ProbeOutcome::Inconclusive { .. } => Ok(None),
            ProbeOutcome::Published(state) => {
                self.publish(state.clone());
                Ok(Some(state))
            }
        }
    }

    fn publish(&mut self, state: SyncState) {
        if let Some(status) = self.status.observe(&state.status) {
            if let Some(e) = status.as_error() {
                warn!("{}", e);
            }
            self.dispatcher.dispatch(WalletEvent::StatusChanged(status));
        }
        if state != self.state {
            debug!(
                "Sync state: daemon {:?}, wallet {:?}, synchronized {}",
                state.daemon_height, state.wallet_height, state.is_synchronized
            );
            self.dispatcher
                .dispatch(WalletEvent::SyncStateChanged(state.clone()));
        }
        self.state = state;
    }

    async fn reconcile(&mut self, reason: ReconcileReason) -> Result<(), WalletSyncError> {
        let outcome = self
            .coordinator
            .reconcile(
                &self.engine,
                self.storage.as_ref(),
                &self.state,
                &mut self.watcher,
                reason,
            )
            .await?;

        if let Some(balance) = outcome.balance {
            self.dispatcher.dispatch(WalletEvent::BalanceChanged(balance));
        }
        if outcome.transactions_changed() {
            self.dispatcher.dispatch(WalletEvent::TransactionsChanged {
                inserted: outcome.inserted,
                updated: outcome.updated,
            });
        }
        if let Some(subaddresses) = outcome.subaddresses {
            self.dispatcher
                .dispatch(WalletEvent::SubaddressesChanged(subaddresses));
        }

        if reason == ReconcileReason::Synchronized {
            self.store_wallet().await?;
        }
        Ok(())
    }

    async fn store_wallet(&self) -> Result<(), WalletSyncError> {
        let Some(path) = self.config.wallet_path.clone() else {
            return Ok(());
        };
        match self.engine.call(move |engine| engine.store(&path)).await? {
            Ok(()) => debug!("Stored wallet file"),
            Err(e) => warn!("Failed to store wallet file: {}", e),
        }
        Ok(())
    }
}

/// Read the listener flags, refreshing first if the engine asked for it.
fn read_listener(engine: &mut dyn WalletEngine) -> ListenerSignals {
    if engine.needs_refresh() {
        engine.refresh();
        engine.reset_needs_refresh();
    }
    ListenerSignals {
        new_transaction: engine.has_new_transaction(),
        height: engine.listener_height(),
    }
}

/// Runs the scheduler and watcher ticks over a shared `SyncCore`.
pub struct SyncOrchestrator {
    core: Arc<Mutex<SyncCore>>,
    scheduler: std::sync::Mutex<PeriodicTicker>,
    watcher: std::sync::Mutex<PeriodicTicker>,
}

impl SyncOrchestrator {
    pub fn new(core: SyncCore) -> Self {
        let scheduler = PeriodicTicker::new("scheduler", core.config.scheduler_interval());
        let watcher = PeriodicTicker::new("watcher", core.config.watcher_interval());
        Self {
            core: Arc::new(Mutex::new(core)),
            scheduler: std::sync::Mutex::new(scheduler),
            watcher: std::sync::Mutex::new(watcher),
        }
    }

    pub fn core(&self) -> &Arc<Mutex<SyncCore>> {
        &self.core
    }

    fn lock(ticker: &std::sync::Mutex<PeriodicTicker>) -> MutexGuard<'_, PeriodicTicker> {
        ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the scheduler tick. A no-op returning `false` while it runs.
    pub fn start_scheduler(&self) -> bool {
        let core = self.core.clone();
        Self::lock(&self.scheduler).start(move |signal| {
            let core = core.clone();
            async move {
                let Ok(mut core) = core.try_lock() else {
                    debug!("Sync core busy, skipping scheduler tick");
                    return TickFlow::Continue;
                };
                if signal.is_stopped() {
                    return TickFlow::Stop;
                }
                core.on_scheduler_tick(Instant::now()).await
            }
            .boxed()
        })
    }

    /// Start the watcher tick. A no-op returning `false` while it runs.
    pub fn start_watcher(&self) -> bool {
        let core = self.core.clone();
        Self::lock(&self.watcher).start(move |signal| {
            let core = core.clone();
            async move {
                let Ok(mut core) = core.try_lock() else {
                    debug!("Sync core busy, skipping watcher tick");
                    return TickFlow::Continue;
                };
                if signal.is_stopped() {
                    return TickFlow::Stop;
                }
                core.on_watcher_tick(Instant::now()).await
            }
            .boxed()
        })
    }

    /// Stop both ticks. Returns `false` if neither was running.
    pub fn stop(&self) -> bool {
        let scheduler = Self::lock(&self.scheduler).stop();
        let watcher = Self::lock(&self.watcher).stop();
        scheduler || watcher
    }

    pub fn is_scheduler_running(&self) -> bool {
        Self::lock(&self.scheduler).is_running()
    }

    pub fn is_watcher_running(&self) -> bool {
        Self::lock(&self.watcher).is_running()
    }
}
