//! Periodic task runner for the scheduler and watcher ticks.
//!
//! A `PeriodicTicker` owns one spawned loop at a time. The loop awaits its handler inline, so a
//! slow tick never overlaps the next one, and ticks missed meanwhile are skipped. Stopping is
//! cooperative: the loop and the handler both observe the run's `StopSignal`, and an in-flight
//! handler is allowed to finish rather than being cancelled between storage writes.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// What the loop does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Stop flag shared between a ticker and one of its runs.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Request a stop and wake the loop. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.notify.notify_waiters();
        first
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

type TickHandler = Box<dyn FnMut(StopSignal) -> BoxFuture<'static, TickFlow> + Send>;

/// Runs a handler on a fixed period until stopped.
pub struct PeriodicTicker {
    name: &'static str,
    period: Duration,
    run: Option<(StopSignal, JoinHandle<()>)>,
}

impl PeriodicTicker {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            run: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        match &self.run {
            Some((signal, handle)) => !signal.is_stopped() && !handle.is_finished(),
            None => false,
        }
    }

    /// Spawn the tick loop. A no-op returning `false` while a run is active.
    ///
    /// The first tick fires one period after start.
    pub fn start<F>(&mut self, handler: F) -> bool
    where
        F: FnMut(StopSignal) -> BoxFuture<'static, TickFlow> + Send + 'static,
    {
        if self.is_running() {
            return false;
        }
        self.stop();

        let signal = StopSignal::new();
        let handle = tokio::spawn(run_loop(
            self.name,
            self.period,
            signal.clone(),
            Box::new(handler),
        ));
        debug!("Started {} ticker every {:?}", self.name, self.period);
        self.run = Some((signal, handle));
        true
    }

    /// Signal the current run to stop. Returns `false` if nothing was running.
    ///
    /// An in-flight handler completes; no new handler starts afterwards.
    pub fn stop(&mut self) -> bool {
        match self.run.take() {
            Some((signal, _handle)) => signal.stop(),
            None => false,
        }
    }
}

impl Drop for PeriodicTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    name: &'static str,
    period: Duration,
    signal: StopSignal,
    mut handler: TickHandler,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = signal.stopped() => break,
            _ = interval.tick() => {}
        }
        if signal.is_stopped() {
            break;
        }
        if handler(signal.clone()).await == TickFlow::Stop {
            signal.stop();
            break;
        }
    }

    debug!("{} ticker stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn counting(count: Arc<AtomicUsize>, stop_at: Option<usize>) -> impl FnMut(StopSignal) -> BoxFuture<'static, TickFlow> + Send + 'static {
        move |_signal| {
            let count = count.clone();
            async move {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                if Some(n) == stop_at {
                    TickFlow::Stop
                } else {
                    TickFlow::Continue
                }
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut ticker = PeriodicTicker::new("test", Duration::from_secs(1));

        assert!(ticker.start(counting(count.clone(), None)));
        assert!(!ticker.start(counting(count.clone(), None)));
        assert!(ticker.is_running());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(ticker.stop());
        assert!(!ticker.stop());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_can_end_the_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut ticker = PeriodicTicker::new("test", Duration::from_secs(1));

        ticker.start(counting(count.clone(), Some(2)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!ticker.is_running());

        assert!(ticker.start(counting(count.clone(), None)));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_does_not_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let mut ticker = PeriodicTicker::new("test", Duration::from_secs(1));

        let (a, o) = (active.clone(), overlaps.clone());
        ticker.start(move |_signal| {
            let (a, o) = (a.clone(), o.clone());
            async move {
                if a.fetch_add(1, Ordering::SeqCst) > 0 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(3_500)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                TickFlow::Continue
            }
            .boxed()
        });

        tokio::time::sleep(Duration::from_secs(20)).await;
        ticker.stop();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stopped_resolves_after_stop() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.stopped().await })
        };
        assert!(signal.stop());
        waiter.await.unwrap();
        signal.stopped().await;
    }
}
