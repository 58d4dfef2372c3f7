//! Sync state model and change detection.
//!
//! `SyncState` is replaced wholesale on every conclusive probe. Consumers are notified through
//! explicit compare steps: `SyncState` equality ignores status messages, and `StatusTracker`
//! reports a status change only when the status category moves.

use crate::wallet::WalletSyncError;

use serde::{Deserialize, Serialize};

/// Block height
pub type Height = u64;

/// Engine status as reported by the last conclusive probe
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusCategory {
    #[default]
    Unknown,
    Ok,
    Error(String),
    Critical(String),
}

/// Status category without its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Unknown,
    Ok,
    Error,
    Critical,
}

impl StatusCategory {
    /// Map an engine status code: 0 ok, 1 error, 2 critical, anything else unknown.
    pub fn from_code(code: i32, message: Option<String>) -> Self {
        match code {
            0 => StatusCategory::Ok,
            1 => StatusCategory::Error(message.unwrap_or_default()),
            2 => StatusCategory::Critical(message.unwrap_or_default()),
            _ => StatusCategory::Unknown,
        }
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            StatusCategory::Unknown => StatusKind::Unknown,
            StatusCategory::Ok => StatusKind::Ok,
            StatusCategory::Error(_) => StatusKind::Error,
            StatusCategory::Critical(_) => StatusKind::Critical,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCategory::Ok)
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, StatusCategory::Critical(_))
    }

    /// The error carried by an error or critical status.
    pub fn as_error(&self) -> Option<WalletSyncError> {
        match self {
            StatusCategory::Error(msg) => Some(WalletSyncError::EngineStatusError(msg.clone())),
            StatusCategory::Critical(msg) => {
                Some(WalletSyncError::EngineStatusCritical(msg.clone()))
            }
            _ => None,
        }
    }
}

/// Snapshot of the engine's sync progress.
///
/// Two states are equal when their status categories match and all heights and the synchronized
/// flag are identical. Status messages are not compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub status: StatusCategory,
    pub daemon_height: Option<Height>,
    pub wallet_height: Option<Height>,
    pub is_synchronized: bool,
}

impl PartialEq for SyncState {
    fn eq(&self, other: &Self) -> bool {
        self.status.kind() == other.status.kind()
            && self.daemon_height == other.daemon_height
            && self.wallet_height == other.wallet_height
            && self.is_synchronized == other.is_synchronized
    }
}

impl Eq for SyncState {}

impl SyncState {
    /// Blocks left to scan, when both heights are known.
    pub fn remaining_blocks(&self) -> Option<Height> {
        match (self.daemon_height, self.wallet_height) {
            (Some(daemon), Some(wallet)) => Some(daemon.saturating_sub(wallet)),
            _ => None,
        }
    }
}

/// Wallet balance in atomic units
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub all: u64,
    pub unlocked: u64,
}

impl BalanceSnapshot {
    pub fn locked(&self) -> u64 {
        self.all.saturating_sub(self.unlocked)
    }
}

/// Coalesces status observations into category transitions.
///
/// The first observation only sets the baseline.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: Option<StatusKind>,
}

impl StatusTracker {
    /// Record `status`; returns it when its category differs from the previous observation.
    ///
    /// The first observation is a baseline unless it already reports an error.
    pub fn observe(&mut self, status: &StatusCategory) -> Option<StatusCategory> {
        let kind = status.kind();
        let changed = match self.last.replace(kind) {
            Some(previous) => previous != kind,
            None => matches!(kind, StatusKind::Error | StatusKind::Critical),
        };
        changed.then(|| status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: StatusCategory) -> SyncState {
        SyncState {
            status,
            daemon_height: Some(100),
            wallet_height: Some(90),
            is_synchronized: false,
        }
    }

    #[test]
    fn equality_ignores_status_message() {
        assert_eq!(
            state(StatusCategory::Error("a".into())),
            state(StatusCategory::Error("b".into()))
        );
        assert_ne!(
            state(StatusCategory::Error("a".into())),
            state(StatusCategory::Critical("a".into()))
        );

        let mut advanced = state(StatusCategory::Ok);
        advanced.wallet_height = Some(91);
        assert_ne!(state(StatusCategory::Ok), advanced);
    }

    #[test]
    fn status_codes_map_to_categories() {
        assert_eq!(StatusCategory::from_code(0, None), StatusCategory::Ok);
        assert_eq!(
            StatusCategory::from_code(1, Some("no connection".into())),
            StatusCategory::Error("no connection".into())
        );
        assert_eq!(
            StatusCategory::from_code(2, None),
            StatusCategory::Critical(String::new())
        );
        assert_eq!(StatusCategory::from_code(7, None), StatusCategory::Unknown);
    }

    #[test]
    fn tracker_reports_category_transitions_only() {
        let mut tracker = StatusTracker::default();
        let observed = [
            StatusCategory::Ok,
            StatusCategory::Ok,
            StatusCategory::Error("a".into()),
            StatusCategory::Error("b".into()),
            StatusCategory::Ok,
        ];
        let changes: Vec<_> = observed.iter().filter_map(|s| tracker.observe(s)).collect();
        assert_eq!(
            changes,
            vec![StatusCategory::Error("a".into()), StatusCategory::Ok]
        );
    }

    #[test]
    fn failing_first_observation_is_reported() {
        let mut tracker = StatusTracker::default();
        let critical = StatusCategory::Critical("corrupted".into());
        assert_eq!(tracker.observe(&critical), Some(critical.clone()));
        assert_eq!(tracker.observe(&critical), None);

        let mut tracker = StatusTracker::default();
        assert_eq!(tracker.observe(&StatusCategory::Unknown), None);
        assert_eq!(
            tracker.observe(&StatusCategory::Error("offline".into())),
            Some(StatusCategory::Error("offline".into()))
        );
    }
}
