/// Transfer request construction and engine error mapping
pub mod builder;
/// Create, commit and fee-estimate flows against the engine
pub mod sender;

pub use builder::{TransactionError, TransferBuilder, TransferRequest};
pub use sender::TransferSender;

/// Number of decimal places of the Monero atomic unit (piconero).
pub const MONERO_DECIMALS: u32 = 12;
