//! Event system for wallet synchronization.
//!
//! The sync core reports every observable change as a `WalletEvent`. Events are pushed onto an
//! unbounded channel, so emitting never blocks the core, and are consumed by exactly one party:
//! either polled directly from `WalletEvents` (it is also a `Stream`), or handed to a set of
//! `WalletEventHandler`s running on a single delivery task.
//!
//! Within one sync cycle events are emitted in a fixed order: status and sync state, balance,
//! transactions, subaddresses.

use crate::wallet::WalletSyncError;
use crate::wallet::sync::state::{BalanceSnapshot, StatusCategory, SyncState};
use crate::wallet::{SubAddressRecord, TransactionRecord};

use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Changes observable by the consumer of a wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WalletEvent {
    /// The status category moved. A first ok status is not reported; a first error is.
    StatusChanged(StatusCategory),
    /// Heights, synchronized flag or status category changed
    SyncStateChanged(SyncState),
    BalanceChanged(BalanceSnapshot),
    TransactionsChanged {
        inserted: Vec<TransactionRecord>,
        updated: Vec<TransactionRecord>,
    },
    /// The full subaddress set after a change
    SubaddressesChanged(Vec<SubAddressRecord>),
}

/// Trait for handling wallet events.
///
/// Implementors receive every event in emission order.
#[async_trait::async_trait]
pub trait WalletEventHandler: Send + Sync {
    async fn handle(&mut self, event: &WalletEvent) -> Result<(), WalletSyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Sending half used by the sync core.
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<WalletEvent>,
}

impl NotificationDispatcher {
    /// Create a dispatcher and the receiving half handed to the consumer.
    pub fn channel() -> (Self, WalletEvents) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, WalletEvents { receiver })
    }

    pub fn dispatch(&self, event: WalletEvent) {
        if self.sender.send(event).is_err() {
            debug!("Wallet event dropped, consumer is gone");
        }
    }
}

/// Receiving half of the wallet event channel.
pub struct WalletEvents {
    receiver: mpsc::UnboundedReceiver<WalletEvent>,
}

impl WalletEvents {
    /// Wait for the next event. `None` once the wallet and all its tasks are gone.
    pub async fn recv(&mut self) -> Option<WalletEvent> {
        self.receiver.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<WalletEvent> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything queued right now.
    pub fn drain(&mut self) -> Vec<WalletEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Deliver all events to `handlers` on a dedicated task.
    ///
    /// Handlers are called in order for each event. Errors from a handler are logged, but do not
    /// stop other handlers from running.
    pub fn deliver_to(mut self, mut handlers: Vec<Box<dyn WalletEventHandler>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = self.receiver.recv().await {
                for handler in &mut handlers {
                    if let Err(e) = handler.handle(&event).await {
                        error!("Handler {} failed to process event: {}", handler.name(), e);
                    }
                }
            }
            debug!("Wallet event delivery finished");
        })
    }
}

impl Stream for WalletEvents {
    type Item = WalletEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    struct Recording {
        seen: Arc<Mutex<Vec<WalletEvent>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl WalletEventHandler for Recording {
        async fn handle(&mut self, event: &WalletEvent) -> Result<(), WalletSyncError> {
            self.seen.lock().unwrap().push(event.clone());
            if self.fail {
                return Err(WalletSyncError::StorageError("handler failure".into()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn handlers_see_every_event_despite_failures() {
        let (dispatcher, events) = NotificationDispatcher::channel();
        let failing = Arc::new(Mutex::new(Vec::new()));
        let healthy = Arc::new(Mutex::new(Vec::new()));

        let delivery = events.deliver_to(vec![
            Box::new(Recording {
                seen: failing.clone(),
                fail: true,
            }),
            Box::new(Recording {
                seen: healthy.clone(),
                fail: false,
            }),
        ]);

        dispatcher.dispatch(WalletEvent::StatusChanged(StatusCategory::Ok));
        dispatcher.dispatch(WalletEvent::BalanceChanged(BalanceSnapshot {
            all: 5,
            unlocked: 1,
        }));
        drop(dispatcher);
        delivery.await.unwrap();

        assert_eq!(failing.lock().unwrap().len(), 2);
        assert_eq!(
            *healthy.lock().unwrap(),
            vec![
                WalletEvent::StatusChanged(StatusCategory::Ok),
                WalletEvent::BalanceChanged(BalanceSnapshot {
                    all: 5,
                    unlocked: 1
                }),
            ]
        );
    }

    #[tokio::test]
    async fn events_are_a_stream() {
        let (dispatcher, events) = NotificationDispatcher::channel();
        dispatcher.dispatch(WalletEvent::SubaddressesChanged(Vec::new()));
        drop(dispatcher);

        let collected: Vec<_> = events.collect().await;
        assert_eq!(collected, vec![WalletEvent::SubaddressesChanged(Vec::new())]);
    }
}
