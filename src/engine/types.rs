//! Types exchanged with the wallet engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a transaction as reported by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineDirection {
    In,
    Out,
}

/// A single destination of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub address: String,
    pub amount: u64,
}

/// Transaction as enumerated from the engine's history.
///
/// Amounts are in atomic units, `timestamp` is unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTransaction {
    pub hash: String,
    pub direction: EngineDirection,
    pub is_pending: bool,
    pub is_failed: bool,
    pub amount: u64,
    pub fee: u64,
    pub block_height: u64,
    pub confirmations: u64,
    pub timestamp: i64,
    pub transfers: Vec<Transfer>,
    pub note: Option<String>,
}

/// Fee priority understood by the engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionPriority {
    #[default]
    Default,
    Low,
    Medium,
    High,
    Highest,
}

impl TransactionPriority {
    /// Fee multiplier applied by the engine for this priority.
    pub fn multiplier(self) -> u64 {
        match self {
            TransactionPriority::Default | TransactionPriority::Low => 1,
            TransactionPriority::Medium => 5,
            TransactionPriority::High => 25,
            TransactionPriority::Highest => 1000,
        }
    }
}

/// A transfer built by the engine but not yet broadcast.
///
/// Deliberately neither `Clone` nor `Copy`: it must be handed back to the engine exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingTransfer {
    pub id: u64,
    pub address: String,
    pub amount: u64,
    pub fee: u64,
}

/// Error string reported by the engine for a failed call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Snapshot of the engine listener flags read by the locked balance watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerSignals {
    pub new_transaction: bool,
    pub height: u64,
}
