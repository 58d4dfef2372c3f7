//! In-process wallet engine.
//!
//! `SimulatedEngine` implements `WalletEngine` over plain in-memory state. It backs the harness
//! binary and the test suites: clones share state, so a test can keep one clone to script heights,
//! balances and listener flags while the sync core drives another through an `EngineHandle`.
//! Every trait call is counted by name.

use super::{
    EngineDirection, EngineError, PendingTransfer, RawTransaction, TransactionPriority, Transfer,
    WalletEngine,
};
use crate::transaction::MONERO_DECIMALS;
use crate::utils::format_token_amount;

use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Base fee in atomic units before the priority multiplier.
const BASE_FEE: u64 = 30_000_000;

#[derive(Debug, Default)]
struct SimulatedState {
    daemon_height: u64,
    wallet_height: u64,
    synchronized: bool,
    sync_step: u64,
    status_code: i32,
    status_message: Option<String>,
    transactions: Vec<RawTransaction>,
    primary_address: String,
    subaddresses: Vec<String>,
    balance: u64,
    unlocked: u64,
    new_transaction: bool,
    needs_refresh: bool,
    listener_height: u64,
    probe_delay: Option<Duration>,
    next_pending_id: u64,
    stored_paths: Vec<PathBuf>,
    calls: HashMap<&'static str, usize>,
}

/// Scriptable engine whose clones share one state.
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimulatedState>>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        let primary = random_address('4');
        let state = SimulatedState {
            subaddresses: vec![primary.clone()],
            primary_address: primary,
            ..SimulatedState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// An engine that starts at `wallet_height` and scans `step` blocks per height query until
    /// it reaches `daemon_height`.
    pub fn syncing(daemon_height: u64, wallet_height: u64, step: u64) -> Self {
        let engine = Self::new();
        {
            let mut state = engine.lock();
            state.daemon_height = daemon_height;
            state.wallet_height = wallet_height;
            state.listener_height = wallet_height;
            state.sync_step = step;
        }
        engine
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: &'static str) -> MutexGuard<'_, SimulatedState> {
        let mut state = self.lock();
        *state.calls.entry(call).or_default() += 1;
        state
    }

    /// Number of times the named trait method has been called.
    pub fn calls(&self, call: &str) -> usize {
        self.lock().calls.get(call).copied().unwrap_or(0)
    }

    /// Total number of trait calls across all methods.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn set_heights(&self, daemon_height: u64, wallet_height: u64) {
        let mut state = self.lock();
        state.daemon_height = daemon_height;
        state.wallet_height = wallet_height;
    }

    pub fn set_synchronized(&self, synchronized: bool) {
        self.lock().synchronized = synchronized;
    }

    pub fn set_status(&self, code: i32, message: Option<&str>) {
        let mut state = self.lock();
        state.status_code = code;
        state.status_message = message.map(str::to_string);
    }

    pub fn set_balance(&self, all: u64, unlocked: u64) {
        let mut state = self.lock();
        state.balance = all;
        state.unlocked = unlocked;
    }

    pub fn set_transactions(&self, transactions: Vec<RawTransaction>) {
        self.lock().transactions = transactions;
    }

    /// Update the confirmation count of every transaction with the given hash.
    pub fn set_confirmations(&self, hash: &str, confirmations: u64) {
        let mut state = self.lock();
        for tx in state.transactions.iter_mut().filter(|tx| tx.hash == hash) {
            tx.confirmations = confirmations;
        }
    }

    pub fn primary_address(&self) -> String {
        self.lock().primary_address.clone()
    }

    /// Derive a new subaddress and return it.
    pub fn add_subaddress(&self) -> String {
        let address = random_address('8');
        self.lock().subaddresses.push(address.clone());
        address
    }

    /// Raise the listener's new-transaction flag.
    pub fn signal_new_transaction(&self) {
        self.lock().new_transaction = true;
    }

    pub fn set_listener_height(&self, height: u64) {
        self.lock().listener_height = height;
    }

    pub fn request_refresh(&self) {
        self.lock().needs_refresh = true;
    }

    /// Make every daemon height query block for `delay`.
    pub fn set_probe_delay(&self, delay: Duration) {
        self.lock().probe_delay = Some(delay);
    }

    pub fn stored_paths(&self) -> Vec<PathBuf> {
        self.lock().stored_paths.clone()
    }

    /// Build a received transaction of `amount`. Like the native engine, incoming entries carry
    /// no transfer list.
    pub fn incoming(amount: u64, block_height: u64, confirmations: u64) -> RawTransaction {
        RawTransaction {
            hash: random_hash(),
            direction: EngineDirection::In,
            is_pending: false,
            is_failed: false,
            amount,
            fee: 0,
            block_height,
            confirmations,
            timestamp: chrono::Utc::now().timestamp(),
            transfers: Vec::new(),
            note: None,
        }
    }

    /// Build a confirmed outgoing transaction paying `amount` to `address`.
    pub fn outgoing(address: &str, amount: u64, block_height: u64, confirmations: u64) -> RawTransaction {
        RawTransaction {
            direction: EngineDirection::Out,
            fee: BASE_FEE,
            transfers: vec![Transfer {
                address: address.to_string(),
                amount,
            }],
            ..Self::incoming(amount, block_height, confirmations)
        }
    }
}

impl WalletEngine for SimulatedEngine {
    fn daemon_height(&mut self) -> u64 {
        let (height, delay) = {
            let state = self.record("daemon_height");
            (state.daemon_height, state.probe_delay)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        height
    }

    fn wallet_height(&mut self) -> u64 {
        let mut state = self.record("wallet_height");
        if state.sync_step > 0 {
            state.wallet_height = (state.wallet_height + state.sync_step).min(state.daemon_height);
            state.synchronized = state.wallet_height >= state.daemon_height;
            state.listener_height = state.wallet_height;
        }
        state.wallet_height
    }

    fn status(&mut self) -> (i32, Option<String>) {
        let state = self.record("status");
        (state.status_code, state.status_message.clone())
    }

    fn is_synchronized(&mut self) -> bool {
        self.record("is_synchronized").synchronized
    }

    fn refresh(&mut self) {
        let mut state = self.record("refresh");
        state.listener_height = state.listener_height.max(state.wallet_height);
    }

    fn transaction_history(&mut self) -> Vec<RawTransaction> {
        self.record("transaction_history").transactions.clone()
    }

    fn subaddresses(&mut self, _account: u32) -> Vec<String> {
        self.record("subaddresses").subaddresses.clone()
    }

    fn balance(&mut self, _account: u32) -> u64 {
        self.record("balance").balance
    }

    fn unlocked_balance(&mut self, _account: u32) -> u64 {
        self.record("unlocked_balance").unlocked
    }

    fn receive_address(&mut self, _account: u32, index: u32) -> String {
        let state = self.record("receive_address");
        state
            .subaddresses
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn validate_address(&mut self, address: &str) -> bool {
        drop(self.record("validate_address"));
        is_valid_address(address)
    }

    fn create_transaction(
        &mut self,
        address: &str,
        amount: u64,
        priority: TransactionPriority,
    ) -> Result<PendingTransfer, EngineError> {
        let mut state = self.record("create_transaction");
        if !is_valid_address(address) {
            return Err(EngineError::new("Invalid destination address"));
        }
        let fee = BASE_FEE * priority.multiplier();
        if amount.saturating_add(fee) > state.unlocked {
            return Err(EngineError::new(format!(
                "not enough money to transfer, overall balance only {}, sent amount {}",
                format_token_amount(state.unlocked, MONERO_DECIMALS),
                format_token_amount(amount, MONERO_DECIMALS),
            )));
        }
        state.next_pending_id += 1;
        Ok(PendingTransfer {
            id: state.next_pending_id,
            address: address.to_string(),
            amount,
            fee,
        })
    }

    fn commit_transaction(&mut self, pending: PendingTransfer) -> Result<(), EngineError> {
        let mut state = self.record("commit_transaction");
        let total = pending.amount + pending.fee;
        if total > state.unlocked {
            return Err(EngineError::new("Outputs were spent by another transfer"));
        }
        state.balance -= total;
        state.unlocked -= total;
        state.new_transaction = true;
        state.transactions.push(RawTransaction {
            hash: random_hash(),
            direction: EngineDirection::Out,
            is_pending: true,
            is_failed: false,
            amount: pending.amount,
            fee: pending.fee,
            block_height: 0,
            confirmations: 0,
            timestamp: chrono::Utc::now().timestamp(),
            transfers: vec![Transfer {
                address: pending.address,
                amount: pending.amount,
            }],
            note: None,
        });
        Ok(())
    }

    fn estimate_fee(
        &mut self,
        address: &str,
        amount: u64,
        priority: TransactionPriority,
    ) -> Result<u64, EngineError> {
        drop(self.record("estimate_fee"));
        let pending = self.create_transaction(address, amount, priority)?;
        Ok(pending.fee)
    }

    fn store(&mut self, path: &Path) -> Result<(), EngineError> {
        self.record("store").stored_paths.push(path.to_path_buf());
        Ok(())
    }

    fn has_new_transaction(&mut self) -> bool {
        self.record("has_new_transaction").new_transaction
    }

    fn reset_new_transaction(&mut self) {
        self.record("reset_new_transaction").new_transaction = false;
    }

    fn listener_height(&mut self) -> u64 {
        self.record("listener_height").listener_height
    }

    fn needs_refresh(&mut self) -> bool {
        self.record("needs_refresh").needs_refresh
    }

    fn reset_needs_refresh(&mut self) {
        self.record("reset_needs_refresh").needs_refresh = false;
    }
}

fn random_hash() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn random_address(network_byte: char) -> String {
    let mut bytes = [0u8; 47];
    rand::rng().fill(&mut bytes[..]);
    format!("{}{}", network_byte, hex::encode(bytes))
}

fn is_valid_address(address: &str) -> bool {
    address.len() == 95 && (address.starts_with('4') || address.starts_with('8'))
}
