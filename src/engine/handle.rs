//!
//! Serializing adapter around a wallet engine instance.
//!
//! `EngineHandle` owns the engine for its whole lifetime. All access goes through `call` (async,
//! runs on the blocking pool) or `with` (blocking), both of which take the same lock, so the two
//! periodic sync tasks and the facade can never enter the engine concurrently. `close` drops the
//! engine; every later call reports `EngineNotInitialized` instead of touching freed state.

use super::WalletEngine;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Raised when the engine has been closed or was never opened.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Wallet engine is not initialized")]
pub struct EngineNotInitialized;

type EngineSlot = Option<Box<dyn WalletEngine>>;

/// Shared, serialized access to one engine instance.
#[derive(Clone)]
pub struct EngineHandle {
	slot: Arc<Mutex<EngineSlot>>,
}

impl EngineHandle {
	/// Take ownership of an opened engine.
	pub fn new(engine: Box<dyn WalletEngine>) -> Self {
		Self {
			slot: Arc::new(Mutex::new(Some(engine))),
		}
	}

	/// A handle with no engine behind it.
	pub fn closed() -> Self {
		Self {
			slot: Arc::new(Mutex::new(None)),
		}
	}

	/// Lock the slot, recovering it from a panicked engine call.
	fn lock(slot: &Mutex<EngineSlot>) -> MutexGuard<'_, EngineSlot> {
		slot.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn is_open(&self) -> bool {
		Self::lock(&self.slot).is_some()
	}

	/// Run `f` against the engine on the calling thread.
	pub fn with<R>(
		&self,
		f: impl FnOnce(&mut dyn WalletEngine) -> R,
	) -> Result<R, EngineNotInitialized> {
		let mut guard = Self::lock(&self.slot);
		match guard.as_deref_mut() {
			Some(engine) => Ok(f(engine)),
			None => Err(EngineNotInitialized),
		}
	}

	/// Run `f` against the engine on tokio's blocking pool.
	pub async fn call<R, F>(&self, f: F) -> Result<R, EngineNotInitialized>
	where
		F: FnOnce(&mut dyn WalletEngine) -> R + Send + 'static,
		R: Send + 'static,
	{
		let slot = self.slot.clone();
		let joined = tokio::task::spawn_blocking(move || {
			let mut guard = Self::lock(&slot);
			match guard.as_deref_mut() {
				Some(engine) => Ok(f(engine)),
				None => Err(EngineNotInitialized),
			}
		})
		.await;

		match joined {
			Ok(result) => result,
			Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
			Err(e) => {
				debug!("Engine call cancelled: {}", e);
				Err(EngineNotInitialized)
			}
		}
	}

	/// Drop the engine. Returns `false` if it was already closed.
	pub fn close(&self) -> bool {
		let engine = Self::lock(&self.slot).take();
		match engine {
			Some(engine) => {
				drop(engine);
				info!("Closed wallet engine");
				true
			}
			None => false,
		}
	}
}
