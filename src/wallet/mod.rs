pub mod kit;
pub mod sync;
pub mod types;

pub use kit::WalletKit;
pub use sync::events::{WalletEvent, WalletEventHandler, WalletEvents};
pub use sync::repositories::{FileWalletStorage, MemoryWalletStorage, WalletStorage};
pub use sync::state::{BalanceSnapshot, StatusCategory, SyncState};
pub use types::*;
