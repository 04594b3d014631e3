//! Currency, network and network-family enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a currency is a crypto asset or fiat money.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrencyType {
    Crypto,
    Fiat,
}

/// Supported currency codes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    Btc,
    Eth,
    Usd,
    Gbp,
    Eur,
}

impl CurrencyCode {
    pub fn currency_type(&self) -> CurrencyType {
        match self {
            Self::Btc | Self::Eth => CurrencyType::Crypto,
            Self::Usd | Self::Gbp | Self::Eur => CurrencyType::Fiat,
        }
    }

    /// The network family whose adapter handles this currency.
    pub fn network_family(&self) -> NetworkFamily {
        match self {
            Self::Btc => NetworkFamily::Utxo,
            Self::Eth => NetworkFamily::AccountNonce,
            Self::Usd | Self::Gbp | Self::Eur => NetworkFamily::InternalLedger,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
            Self::Eur => "EUR",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            "USD" => Ok(Self::Usd),
            "GBP" => Ok(Self::Gbp),
            "EUR" => Ok(Self::Eur),
            other => Err(format!("unknown currency code: {other}")),
        }
    }
}

/// Network a crypto account lives on. Fiat accounts use `Mainnet`/`Testnet`
/// to distinguish live from sandbox provider environments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    Mainnet,
    Testnet,
    Rinkeby,
    Ropsten,
    Goerli,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mainnet => "MAINNET",
            Self::Testnet => "TESTNET",
            Self::Rinkeby => "RINKEBY",
            Self::Ropsten => "ROPSTEN",
            Self::Goerli => "GOERLI",
        };
        f.write_str(s)
    }
}

/// Network families, each served by one `CurrencyAdapter`.
///
/// The family determines how fees are estimated, how nonces behave and how
/// unsigned payloads are built; individual chains within a family differ
/// only in mechanical encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFamily {
    /// Chains with a per-account transaction counter (Ethereum-like).
    AccountNonce,
    /// Chains spending discrete unspent outputs (Bitcoin-like).
    Utxo,
    /// Provider-side fiat ledger.
    InternalLedger,
}

impl fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AccountNonce => "account_nonce",
            Self::Utxo => "utxo",
            Self::InternalLedger => "internal_ledger",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_type_matches_family() {
        for code in [
            CurrencyCode::Btc,
            CurrencyCode::Eth,
            CurrencyCode::Usd,
            CurrencyCode::Gbp,
            CurrencyCode::Eur,
        ] {
            match code.currency_type() {
                CurrencyType::Crypto => {
                    assert_ne!(code.network_family(), NetworkFamily::InternalLedger)
                }
                CurrencyType::Fiat => {
                    assert_eq!(code.network_family(), NetworkFamily::InternalLedger)
                }
            }
        }
    }

    #[test]
    fn currency_code_roundtrip() {
        let code: CurrencyCode = "GBP".parse().unwrap();
        assert_eq!(code, CurrencyCode::Gbp);
        assert_eq!(code.as_str(), "GBP");
    }

    #[test]
    fn serde_uses_uppercase() {
        let json = serde_json::to_string(&CurrencyCode::Btc).unwrap();
        assert_eq!(json, "\"BTC\"");
    }
}
