//! Adaptive probe interval.
//!
//! The scheduler ticks on a fixed period, but each tick only probes the engine when
//! `state_checking_needed` says so: every tick while close to tip, progressively less often the
//! further the wallet lags behind the daemon.

use crate::wallet::sync::state::{Height, SyncState};

use std::time::Duration;
use tokio::time::Instant;

/// Remaining-block bands and the minimum time between probes inside each band.
const PROBE_BANDS: [(Height, Duration); 3] = [
    (1_000, Duration::from_secs(10)),
    (2_000, Duration::from_secs(15)),
    (5_000, Duration::from_secs(20)),
];

/// Remaining blocks under which every tick probes.
const ALWAYS_PROBE_BELOW: Height = 100;

/// Longest time between two probes, however far behind the wallet is.
const MAX_PROBE_GAP: Duration = Duration::from_secs(35);

/// Whether a tick should probe the engine.
///
/// `elapsed` is the time since the last probe attempt, `None` if there never was one.
pub fn state_checking_needed(
    daemon_height: Option<Height>,
    wallet_height: Option<Height>,
    elapsed: Option<Duration>,
) -> bool {
    let (Some(daemon), Some(wallet)) = (daemon_height, wallet_height) else {
        return true;
    };

    let remaining = daemon.saturating_sub(wallet);
    if remaining < ALWAYS_PROBE_BELOW {
        return true;
    }

    let Some(elapsed) = elapsed else {
        return true;
    };

    for (band, gap) in PROBE_BANDS {
        if remaining < band && elapsed > gap {
            return true;
        }
    }

    elapsed > MAX_PROBE_GAP
}

/// Remembers when the engine was last probed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeClock {
    last_checked_at: Option<Instant>,
}

impl ProbeClock {
    pub fn last_checked_at(&self) -> Option<Instant> {
        self.last_checked_at
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_checked_at
            .map(|at| now.saturating_duration_since(at))
    }

    /// Whether a tick at `now` should probe, given the last published state.
    pub fn is_due(&self, state: &SyncState, now: Instant) -> bool {
        state_checking_needed(state.daemon_height, state.wallet_height, self.elapsed(now))
    }

    /// Record a probe attempt, conclusive or not.
    pub fn mark_checked(&mut self, now: Instant) {
        self.last_checked_at = Some(now);
    }
}
