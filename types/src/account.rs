//! Account model — the engine's view of one currency account.
//!
//! Accounts are owned exclusively by the account store; every read hands out
//! an immutable clone, never a shared mutable reference.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::currency::{CurrencyCode, CurrencyType, Network};

/// Stable engine-assigned account identifier.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Standard,
    Nominated,
    Custody,
}

/// Properties present only on crypto accounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCryptoProperties {
    /// Key derivation path for this account's signing key.
    pub path: String,
    /// Receive address.
    pub address: String,
    /// Exchange-deposit address, where supported.
    pub direct_deposit_address: Option<String>,
    /// Next transaction nonce. Monotonically non-decreasing; equals one more
    /// than the highest nonce of any submitted, non-failed transaction.
    pub nonce: u64,
}

/// Properties present only on fiat accounts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFiatProperties {
    pub provider_id: Option<String>,
    pub account_number: Option<String>,
    pub sort_code: Option<String>,
    pub bic: Option<String>,
    pub iban: Option<String>,
    pub customer_name: Option<String>,
}

/// Currency-type-specific account detail, exactly one variant per account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountProperties {
    Crypto(AccountCryptoProperties),
    Fiat(AccountFiatProperties),
}

/// Record containing account details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub currency_type: CurrencyType,
    pub currency_code: CurrencyCode,
    pub network: Network,
    pub account_type: AccountType,
    /// Current balance as displayed to the user.
    pub balance: Amount,
    /// Balance confirmed by the upstream ledger.
    pub ledger_balance: Amount,
    /// Balance spendable right now (ledger balance minus pending holds).
    pub available_balance: Amount,
    /// How far below zero the available balance may go.
    pub overdraft_limit: Amount,
    pub has_nominated_account: bool,
    pub properties: AccountProperties,
}

impl Account {
    pub fn crypto_properties(&self) -> Option<&AccountCryptoProperties> {
        match &self.properties {
            AccountProperties::Crypto(props) => Some(props),
            AccountProperties::Fiat(_) => None,
        }
    }

    pub fn fiat_properties(&self) -> Option<&AccountFiatProperties> {
        match &self.properties {
            AccountProperties::Fiat(props) => Some(props),
            AccountProperties::Crypto(_) => None,
        }
    }

    /// Current nonce for crypto accounts, `None` for fiat accounts.
    pub fn nonce(&self) -> Option<u64> {
        self.crypto_properties().map(|p| p.nonce)
    }

    /// Whether the account can cover `total` (amount plus fee) from its
    /// available balance, honoring the overdraft limit.
    pub fn can_spend(&self, total: Amount) -> bool {
        match self.available_balance.checked_sub(total) {
            Some(remaining) => remaining >= self.overdraft_limit.neg(),
            None => false,
        }
    }
}
