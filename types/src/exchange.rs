//! Exchange and quote models.
//!
//! An exchange converts funds between two of the user's accounts through two
//! correlated transaction legs (debit and credit) priced by a TTL-bound
//! quote. Earlier rate schemes without a validity window are deprecated and
//! not represented here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::AccountId;
use crate::amount::Amount;
use crate::currency::CurrencyCode;
use crate::time::Timestamp;
use crate::transaction::TransactionId;

/// Stable exchange identifier.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(String);

impl QuoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A short-lived exchange price locked for `ttl_secs`.
///
/// An expired quote always fails composition and submission; the engine
/// never silently reuses a stale price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    /// Units of `to_currency` per one unit of `from_currency`.
    pub rate: Amount,
    /// Fee rate applied to the debit amount, as a fraction (0.01 = 1%).
    pub fee_rate: Amount,
    pub ttl_secs: u64,
    pub expires_at: Timestamp,
}

impl Quote {
    pub fn has_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Exchange status. Mirrors the transaction status machine, with one extra
/// state for the case where only one leg reached the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeStatus {
    Pending,
    Deposited,
    Confirmed,
    Failed,
    Resubmitted,
    Cancelled,
    Paused,
    Rejected,
    /// One leg was broadcast and the other rejected; requires manual
    /// reconciliation, automatic rollback is not possible.
    PartialFailure,
}

impl ExchangeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed
                | Self::Failed
                | Self::Cancelled
                | Self::Rejected
                | Self::PartialFailure
        )
    }
}

/// Record containing exchange details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub status: ExchangeStatus,
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    /// The quote this exchange was priced with.
    pub quote: Quote,
    pub debit_transaction_id: Option<TransactionId>,
    pub credit_transaction_id: Option<TransactionId>,
    /// Amount in debit-account currency.
    pub amount: Amount,
    /// Amount credited, in credit-account currency.
    pub return_amount: Amount,
    pub exchange_fee: Amount,
    pub submitted_at: Option<Timestamp>,
    pub confirmed_at: Option<Timestamp>,
    pub timestamp: Timestamp,
}
