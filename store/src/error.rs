use thiserror::Error;

use lumo_types::EngineError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("exchange not found: {0}")]
    ExchangeNotFound(String),

    #[error("nonce {nonce} already consumed by transaction {holder}")]
    NonceConsumed { nonce: u64, holder: String },

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: String, available: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => EngineError::AccountNotFound(id),
            StoreError::NonceConsumed { nonce, holder } => EngineError::StaleComposition(format!(
                "nonce {nonce} already consumed by transaction {holder}"
            )),
            other => EngineError::Unknown(other.to_string()),
        }
    }
}
