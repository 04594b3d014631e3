//! Transaction model and its monotonic status state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::account::{AccountFiatProperties, AccountId};
use crate::amount::Amount;
use crate::currency::{CurrencyCode, Network};
use crate::exchange::ExchangeId;
use crate::time::Timestamp;

/// Stable transaction identifier.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Crypto,
    Fiat,
    Exchange,
}

/// Direction of a transaction relative to the signed-in user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDirection {
    Incoming,
    Outgoing,
    Internal,
}

/// Transaction status.
///
/// Statuses form a monotonic state machine: once a transaction reaches a
/// terminal status it never transitions again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Resubmitted,
    Paused,
    Confirmed,
    Failed,
    Cancelled,
    Rejected,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        if self.is_terminal() {
            *self == next
        } else {
            true
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Resubmitted => "RESUBMITTED",
            Self::Paused => "PAUSED",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// One participant entry in a transaction's sender or recipient list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAmount {
    pub direction: TransactionDirection,
    /// Integrator user id, or `None` for an external party.
    pub user_id: Option<String>,
    /// Account id, or `None` for an external party.
    pub account_id: Option<AccountId>,
    pub amount: Amount,
    /// Amount expressed in each fiat currency at time of entry.
    pub fiat_amount: BTreeMap<CurrencyCode, Amount>,
    /// Chain address or bank reference of the party.
    pub address: Option<String>,
}

/// Properties present only on crypto transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCryptoProperties {
    /// On-chain hash once broadcast, `None` before.
    pub tx_hash: Option<String>,
    /// Chain-level nonce, where the network family has one.
    pub nonce: Option<u64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub data: Option<String>,
    pub gas_price: Option<Amount>,
    pub gas_limit: Option<u64>,
    pub fiat_fee: BTreeMap<CurrencyCode, Amount>,
    pub fiat_amount: BTreeMap<CurrencyCode, Amount>,
}

/// Properties present only on fiat transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFiatProperties {
    pub from_fiat_account: Option<AccountFiatProperties>,
    pub to_fiat_account: Option<AccountFiatProperties>,
}

/// Currency-type-specific transaction detail, exactly one variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionProperties {
    Crypto(TransactionCryptoProperties),
    Fiat(TransactionFiatProperties),
}

/// Record containing transaction details.
///
/// Transactions are created by the submitter (optimistic, pending) or by
/// inbound server events; they are mutated only through status transitions
/// and are never deleted once broadcast, only superseded by a status update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub tx_type: TransactionType,
    pub currency_code: CurrencyCode,
    pub direction: TransactionDirection,
    pub network: Network,
    pub status: TransactionStatus,
    pub senders: Vec<TransactionAmount>,
    pub recipients: Vec<TransactionAmount>,
    pub amount: Amount,
    pub fee: Amount,
    pub nonce: Option<u64>,
    pub metadata: Option<String>,
    pub submitted_at: Option<Timestamp>,
    pub confirmed_at: Option<Timestamp>,
    /// Minimum non-null of `submitted_at` and `confirmed_at`, or the time the
    /// engine first learned of the transaction.
    pub timestamp: Timestamp,
    pub properties: TransactionProperties,
    /// Set when this transaction is one leg of a currency exchange.
    pub exchange_id: Option<ExchangeId>,
}

impl Transaction {
    /// Source account of an outgoing transaction, if it is one of ours.
    pub fn source_account(&self) -> Option<&AccountId> {
        self.senders.iter().find_map(|s| s.account_id.as_ref())
    }

    pub fn crypto_properties(&self) -> Option<&TransactionCryptoProperties> {
        match &self.properties {
            TransactionProperties::Crypto(props) => Some(props),
            TransactionProperties::Fiat(_) => None,
        }
    }

    /// Total spend for the source account: amount plus fee.
    pub fn total_outgoing(&self) -> Amount {
        self.amount + self.fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_do_not_regress() {
        for terminal in [
            TransactionStatus::Confirmed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
            TransactionStatus::Rejected,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(TransactionStatus::Pending));
            assert!(terminal.can_transition_to(terminal));
        }
    }

    #[test]
    fn pending_may_transition_anywhere() {
        for next in [
            TransactionStatus::Resubmitted,
            TransactionStatus::Paused,
            TransactionStatus::Confirmed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
            TransactionStatus::Rejected,
        ] {
            assert!(TransactionStatus::Pending.can_transition_to(next));
        }
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&TransactionStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }
}
