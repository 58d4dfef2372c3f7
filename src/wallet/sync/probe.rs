//! One read of the engine's sync state.

use crate::engine::WalletEngine;
use crate::wallet::sync::state::{StatusCategory, SyncState};

use tracing::{debug, error};

/// Result of a state probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The engine reported a zero height; nothing is published.
    Inconclusive {
        daemon_height: u64,
        wallet_height: u64,
    },
    /// A complete state read from the engine.
    Published(SyncState),
}

/// Read heights, the synchronized flag and the status from the engine.
///
/// Heights are read first; if either is zero the remaining calls are skipped.
pub fn probe_state(engine: &mut dyn WalletEngine) -> ProbeOutcome {
    let daemon_height = engine.daemon_height();
    let wallet_height = engine.wallet_height();

    if daemon_height == 0 || wallet_height == 0 {
        debug!(
            "Inconclusive probe: daemon height {}, wallet height {}",
            daemon_height, wallet_height
        );
        return ProbeOutcome::Inconclusive {
            daemon_height,
            wallet_height,
        };
    }

    let is_synchronized = engine.is_synchronized();
    let (code, message) = engine.status();
    if code != 0 {
        error!(
            "Wallet is in error state ({}): {}",
            code,
            message.as_deref().unwrap_or("Unknown wallet error")
        );
    }

    ProbeOutcome::Published(SyncState {
        status: StatusCategory::from_code(code, message),
        daemon_height: Some(daemon_height),
        wallet_height: Some(wallet_height),
        is_synchronized,
    })
}
