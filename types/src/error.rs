//! Caller-visible error taxonomy shared across crates.
//!
//! Every error surfaces to the host as a stable `(type, code, message)`
//! triple so bridges can branch on machine-readable codes rather than
//! message text.

use thiserror::Error;

use crate::amount::Amount;

/// Common error type for the Lumo wallet engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("operation requires session state {required}, current state is {actual}")]
    SessionNotReady { required: String, actual: String },

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("wallet vault is locked")]
    VaultLocked,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("invalid destination address: {0}")]
    InvalidDestinationAddress(String),

    #[error("no current fee rate snapshot for {0}")]
    FeeRateUnavailable(String),

    #[error("quote {0} has expired")]
    QuoteExpired(String),

    #[error("stale composition: account {0} changed since the transaction was composed")]
    StaleComposition(String),

    #[error("transport rejected submission: {0}")]
    TransportRejected(String),

    #[error("transport timed out; transaction outcome unknown, poll for status")]
    TransportTimeout,

    #[error("partial exchange failure: exchange {0} requires manual reconciliation")]
    PartialExchangeFailure(String),

    #[error("{0}")]
    Unknown(String),
}

impl EngineError {
    /// Coarse error category, e.g. `wallet_error` or `transport_error`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::SessionNotReady { .. } => "session_error",
            Self::InvalidPassword | Self::InvalidMnemonic(_) | Self::VaultLocked => "wallet_error",
            Self::AccountNotFound(_)
            | Self::InsufficientFunds { .. }
            | Self::InvalidDestinationAddress(_)
            | Self::FeeRateUnavailable(_)
            | Self::QuoteExpired(_) => "compose_error",
            Self::StaleComposition(_)
            | Self::TransportRejected(_)
            | Self::TransportTimeout
            | Self::PartialExchangeFailure(_) => "submit_error",
            Self::Unknown(_) => "engine_error",
        }
    }

    /// Stable machine-readable code, unique per variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotReady { .. } => "session_not_ready",
            Self::InvalidPassword => "invalid_password",
            Self::InvalidMnemonic(_) => "invalid_mnemonic",
            Self::VaultLocked => "vault_locked",
            Self::AccountNotFound(_) => "account_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InvalidDestinationAddress(_) => "invalid_destination_address",
            Self::FeeRateUnavailable(_) => "fee_rate_unavailable",
            Self::QuoteExpired(_) => "quote_expired",
            Self::StaleComposition(_) => "stale_composition",
            Self::TransportRejected(_) => "transport_rejected",
            Self::TransportTimeout => "transport_timeout",
            Self::PartialExchangeFailure(_) => "partial_exchange_failure",
            Self::Unknown(_) => "unknown_error",
        }
    }

    /// The `(type, code, message)` triple handed to host bridges.
    pub fn triple(&self) -> (&'static str, &'static str, String) {
        (self.error_type(), self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let errors = [
            EngineError::SessionNotReady {
                required: "WalletUnlocked".into(),
                actual: "SignedOut".into(),
            },
            EngineError::InvalidPassword,
            EngineError::InvalidMnemonic("checksum".into()),
            EngineError::VaultLocked,
            EngineError::AccountNotFound("acc".into()),
            EngineError::InsufficientFunds {
                needed: Amount::parse("2").unwrap(),
                available: Amount::parse("1").unwrap(),
            },
            EngineError::InvalidDestinationAddress("xyz".into()),
            EngineError::FeeRateUnavailable("BTC".into()),
            EngineError::QuoteExpired("q-1".into()),
            EngineError::StaleComposition("acc".into()),
            EngineError::TransportRejected("underpriced".into()),
            EngineError::TransportTimeout,
            EngineError::PartialExchangeFailure("ex-1".into()),
            EngineError::Unknown("boom".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn triple_carries_message() {
        let err = EngineError::QuoteExpired("q-9".into());
        let (ty, code, msg) = err.triple();
        assert_eq!(ty, "compose_error");
        assert_eq!(code, "quote_expired");
        assert!(msg.contains("q-9"));
    }
}
