//!
//! Transfer submission through the wallet engine.
//!
//! Create and commit run inside one engine call, so no sync tick can observe the engine between
//! building a transfer and broadcasting it.

use crate::engine::EngineHandle;
use crate::transaction::builder::{TransactionError, TransferRequest};
use crate::transaction::MONERO_DECIMALS;
use crate::utils::format_token_amount;

use tracing::{error, info};

/// Sends transfers and estimates their fees
#[derive(Clone)]
pub struct TransferSender {
    engine: EngineHandle,
}

impl TransferSender {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Create and broadcast a transfer. Returns the fee paid.
    pub async fn send(&self, request: TransferRequest) -> Result<u64, TransactionError> {
        let TransferRequest {
            address,
            amount,
            priority,
        } = request;
        let destination = address.clone();

        let result = self
            .engine
            .call(move |engine| {
                if !engine.validate_address(&address) {
                    return Err(TransactionError::ValidationError(format!(
                        "invalid destination address {}",
                        address
                    )));
                }
                let pending = engine
                    .create_transaction(&address, amount, priority)
                    .map_err(TransactionError::from_creation)?;
                let fee = pending.fee;
                engine
                    .commit_transaction(pending)
                    .map_err(|e| TransactionError::TransactionCommitFailed(e.message))?;
                Ok(fee)
            })
            .await?;

        match &result {
            Ok(fee) => info!(
                "Sent {} XMR to {} (fee {})",
                format_token_amount(amount, MONERO_DECIMALS),
                destination,
                format_token_amount(*fee, MONERO_DECIMALS)
            ),
            Err(e) => error!("Transfer to {} failed: {}", destination, e),
        }
        result
    }

    /// Estimate the fee of a transfer without broadcasting anything.
    pub async fn estimate_fee(&self, request: TransferRequest) -> Result<u64, TransactionError> {
        let TransferRequest {
            address,
            amount,
            priority,
        } = request;

        self.engine
            .call(move |engine| {
                engine
                    .estimate_fee(&address, amount, priority)
                    .map_err(TransactionError::from_estimation)
            })
            .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;
    use crate::transaction::TransferBuilder;

    #[tokio::test]
    async fn send_commits_and_returns_fee() {
        let engine = SimulatedEngine::new();
        engine.set_balance(10_000_000_000_000, 10_000_000_000_000);
        let destination = engine.add_subaddress();
        let sender = TransferSender::new(EngineHandle::new(Box::new(engine.clone())));

        let request = TransferBuilder::new()
            .with_address(destination)
            .with_amount(1_000_000_000_000)
            .build()
            .unwrap();
        let estimate = sender.estimate_fee(request.clone()).await.unwrap();
        let fee = sender.send(request).await.unwrap();

        assert_eq!(fee, estimate);
        assert_eq!(engine.calls("commit_transaction"), 1);
    }

    #[tokio::test]
    async fn insufficient_funds_is_typed() {
        let engine = SimulatedEngine::new();
        engine.set_balance(500_000_000_000, 500_000_000_000);
        let sender = TransferSender::new(EngineHandle::new(Box::new(engine.clone())));

        let request = TransferBuilder::new()
            .with_address(engine.primary_address())
            .with_amount(1_000_000_000_000)
            .build()
            .unwrap();
        assert_eq!(
            sender.send(request).await,
            Err(TransactionError::InsufficientFunds("0.500000000000".to_string()))
        );
        assert_eq!(engine.calls("commit_transaction"), 0);
    }

    #[tokio::test]
    async fn invalid_address_is_rejected_before_creation() {
        let engine = SimulatedEngine::new();
        let sender = TransferSender::new(EngineHandle::new(Box::new(engine.clone())));

        let request = TransferBuilder::new()
            .with_address("not-an-address")
            .with_amount(1)
            .build()
            .unwrap();
        assert!(matches!(
            sender.send(request).await,
            Err(TransactionError::ValidationError(_))
        ));
        assert_eq!(engine.calls("create_transaction"), 0);
    }

    #[tokio::test]
    async fn closed_engine_is_reported() {
        let handle = EngineHandle::closed();
        let sender = TransferSender::new(handle);
        let request = TransferBuilder::new()
            .with_address("4abc")
            .with_amount(1)
            .build()
            .unwrap();
        assert_eq!(
            sender.estimate_fee(request).await,
            Err(TransactionError::EngineNotInitialized)
        );
    }
}
