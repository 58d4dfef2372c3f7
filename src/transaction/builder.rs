//! Transfer request builder
//!
//! Validates the caller's input before anything reaches the engine, and maps engine error
//! strings onto typed `TransactionError`s.

use crate::engine::{EngineError, EngineNotInitialized, TransactionPriority};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const INSUFFICIENT_FUNDS_PREFIX: &str = "not enough money to transfer, overall balance only ";
const INSUFFICIENT_FUNDS_SENT: &str = ", sent amount ";

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionError {
	#[error("Transaction validation error: {0}")]
	ValidationError(String),

	#[error("Wallet engine is not initialized")]
	EngineNotInitialized,

	#[error("Transaction creation failed: {0}")]
	TransactionCreationFailed(String),

	#[error("Transaction commit failed: {0}")]
	TransactionCommitFailed(String),

	#[error("Fee estimation failed: {0}")]
	FeeEstimationFailed(String),

	/// Carries the available balance as reported by the engine
	#[error("Insufficient funds, available balance {0}")]
	InsufficientFunds(String),
}

impl From<EngineNotInitialized> for TransactionError {
	fn from(_: EngineNotInitialized) -> Self {
		TransactionError::EngineNotInitialized
	}
}

impl TransactionError {
	/// Map a failed `create_transaction`.
	pub fn from_creation(error: EngineError) -> Self {
		Self::from_engine_message(error.message, TransactionError::TransactionCreationFailed)
	}

	/// Map a failed fee estimate.
	pub fn from_estimation(error: EngineError) -> Self {
		Self::from_engine_message(error.message, TransactionError::FeeEstimationFailed)
	}

	/// `InsufficientFunds` when the message is the engine's "not enough money" error, otherwise
	/// `fallback`.
	pub fn from_engine_message(message: String, fallback: fn(String) -> Self) -> Self {
		match parse_insufficient_funds(&message) {
			Some(balance) => TransactionError::InsufficientFunds(balance),
			None => fallback(message),
		}
	}
}

/// Extract the balance from
/// `not enough money to transfer, overall balance only <d.d>, sent amount <d.d>`.
fn parse_insufficient_funds(message: &str) -> Option<String> {
	let rest = message.strip_prefix(INSUFFICIENT_FUNDS_PREFIX)?;
	let (balance, sent) = rest.split_once(INSUFFICIENT_FUNDS_SENT)?;
	(is_decimal(balance) && is_decimal(sent)).then(|| balance.to_string())
}

fn is_decimal(value: &str) -> bool {
	let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
	match value.split_once('.') {
		Some((whole, fraction)) => all_digits(whole) && all_digits(fraction),
		None => false,
	}
}

/// A validated outgoing transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
	pub address: String,
	/// Atomic units
	pub amount: u64,
	pub priority: TransactionPriority,
}

/// Builder for transfer requests
#[derive(Debug, Default)]
pub struct TransferBuilder {
	address: Option<String>,
	amount: Option<u64>,
	priority: TransactionPriority,
}

impl TransferBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the destination address
	pub fn with_address(mut self, address: impl Into<String>) -> Self {
		self.address = Some(address.into());
		self
	}

	/// Sets the amount in atomic units
	pub fn with_amount(mut self, amount: u64) -> Self {
		self.amount = Some(amount);
		self
	}

	pub fn with_priority(mut self, priority: TransactionPriority) -> Self {
		self.priority = priority;
		self
	}

	/// Builds the request
	pub fn build(self) -> Result<TransferRequest, TransactionError> {
		let address = self
			.address
			.map(|a| a.trim().to_string())
			.filter(|a| !a.is_empty())
			.ok_or_else(|| {
				TransactionError::ValidationError("destination address is required".to_string())
			})?;

		let amount = match self.amount {
			Some(amount) if amount > 0 => amount,
			_ => {
				return Err(TransactionError::ValidationError(
					"amount must be greater than zero".to_string(),
				));
			}
		};

		Ok(TransferRequest {
			address,
			amount,
			priority: self.priority,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_insufficient_funds() {
		let error = TransactionError::from_creation(EngineError::new(
			"not enough money to transfer, overall balance only 0.500000000000, sent amount 1.000000000000",
		));
		assert_eq!(
			error,
			TransactionError::InsufficientFunds("0.500000000000".to_string())
		);
	}

	#[test]
	fn other_messages_fall_through() {
		let cases = [
			"not enough money to transfer, overall balance only 0.5, sent amount 1",
			"not enough money to transfer, overall balance only .5, sent amount 1.0",
			"not enough money to transfer, overall balance only 0.5, sent amount 1.0 extra",
			"daemon is busy",
		];
		for message in cases {
			assert_eq!(
				TransactionError::from_estimation(EngineError::new(message)),
				TransactionError::FeeEstimationFailed(message.to_string()),
				"{message}"
			);
		}
	}

	#[test]
	fn builder_validates_input() {
		assert!(matches!(
			TransferBuilder::new().with_amount(5).build(),
			Err(TransactionError::ValidationError(_))
		));
		assert!(matches!(
			TransferBuilder::new().with_address("  ").with_amount(5).build(),
			Err(TransactionError::ValidationError(_))
		));
		assert!(matches!(
			TransferBuilder::new().with_address("4abc").with_amount(0).build(),
			Err(TransactionError::ValidationError(_))
		));

		let request = TransferBuilder::new()
			.with_address(" 4abc ")
			.with_amount(5)
			.with_priority(TransactionPriority::High)
			.build()
			.unwrap();
		assert_eq!(request.address, "4abc");
		assert_eq!(request.priority, TransactionPriority::High);
	}
}
