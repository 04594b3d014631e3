//! Adapter for UTXO chains (Bitcoin-like).
//!
//! Holds an indexer view of unspent outputs per address, seeded by the host.
//! When no view has been seeded for an address the adapter prices against a
//! single synthetic input covering the account's available balance, which
//! matches the common hosted-wallet case where the backend consolidates
//! outputs.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use lumo_types::{Amount, EngineError, NetworkFamily};

use crate::adapter::{CurrencyAdapter, FeeEstimate, FeeParams};
use crate::composer::ComposedTransaction;

/// Virtual size overhead of a transaction shell.
const TX_OVERHEAD_VBYTES: u64 = 10;

/// Virtual size of one input.
const INPUT_VBYTES: u64 = 148;

/// Virtual size of one output; two outputs assumed (destination + change).
const OUTPUT_VBYTES: u64 = 34;

/// Satoshi per whole coin.
const SAT_PER_COIN: u64 = 100_000_000;

/// One unspent output as reported by the indexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    /// `txid:vout` reference.
    pub outpoint: String,
    pub value: Amount,
}

pub struct UtxoAdapter {
    /// Indexer view: address → unspent outputs.
    utxos: Mutex<HashMap<String, Vec<Utxo>>>,
}

impl UtxoAdapter {
    pub fn new() -> Self {
        Self {
            utxos: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the unspent-output view for an address.
    pub fn seed_utxos(&self, address: impl Into<String>, utxos: Vec<Utxo>) {
        let address = address.into();
        debug!(%address, count = utxos.len(), "utxo view seeded");
        self.utxos
            .lock()
            .expect("utxo view lock poisoned")
            .insert(address, utxos);
    }

    fn view_for(&self, address: &str) -> Option<Vec<Utxo>> {
        self.utxos
            .lock()
            .expect("utxo view lock poisoned")
            .get(address)
            .cloned()
    }

    fn fee_for_inputs(rate: Amount, inputs: u64) -> Option<Amount> {
        let vbytes = TX_OVERHEAD_VBYTES + INPUT_VBYTES * inputs + 2 * OUTPUT_VBYTES;
        rate.checked_mul(Amount::from_u64(vbytes))?
            .checked_div(Amount::from_u64(SAT_PER_COIN))
    }
}

impl Default for UtxoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrencyAdapter for UtxoAdapter {
    fn family(&self) -> NetworkFamily {
        NetworkFamily::Utxo
    }

    fn validate_address(&self, address: &str) -> bool {
        let prefixed = address.starts_with("bc1")
            || address.starts_with("tb1")
            || address.starts_with('1')
            || address.starts_with('3')
            || address.starts_with('m')
            || address.starts_with('n')
            || address.starts_with('2');
        prefixed
            && (26..=90).contains(&address.len())
            && address.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Select inputs covering `amount + fee` at the requested sat/vbyte
    /// rate, largest first; the fee grows with each selected input.
    fn estimate_fee(&self, params: &FeeParams<'_>) -> Result<FeeEstimate, EngineError> {
        let rate = match params.fee_rate {
            Some(rate) => rate,
            None => {
                let rates = params.fee_rates.ok_or_else(|| {
                    EngineError::FeeRateUnavailable(params.account.currency_code.to_string())
                })?;
                params.level.pick(rates)
            }
        };

        let address = params
            .account
            .crypto_properties()
            .map(|p| p.address.as_str())
            .unwrap_or_default();
        let mut view = match self.view_for(address) {
            Some(view) if !view.is_empty() => view,
            // Unseeded view: one synthetic input holding the whole balance
            _ => vec![Utxo {
                outpoint: "synthetic:0".to_string(),
                value: params.account.available_balance,
            }],
        };
        view.sort_by(|a, b| b.value.cmp(&a.value));

        let overflow = || EngineError::Unknown("fee overflow".to_string());
        match params.amount {
            // Send-max spends every output
            None => {
                let fee = Self::fee_for_inputs(rate, view.len() as u64).ok_or_else(overflow)?;
                Ok(FeeEstimate {
                    fee,
                    gas_price: None,
                    gas_limit: None,
                })
            }
            Some(amount) => {
                let mut selected = 0u64;
                let mut covered = Amount::ZERO;
                for utxo in &view {
                    selected += 1;
                    covered = covered.checked_add(utxo.value).ok_or_else(overflow)?;
                    let fee = Self::fee_for_inputs(rate, selected).ok_or_else(overflow)?;
                    let needed = amount.checked_add(fee).ok_or_else(overflow)?;
                    if covered >= needed {
                        return Ok(FeeEstimate {
                            fee,
                            gas_price: None,
                            gas_limit: None,
                        });
                    }
                }
                let fee = Self::fee_for_inputs(rate, selected.max(1)).ok_or_else(overflow)?;
                Err(EngineError::InsufficientFunds {
                    needed: amount.checked_add(fee).ok_or_else(overflow)?,
                    available: covered,
                })
            }
        }
    }

    fn build_unsigned_payload(
        &self,
        composed: &ComposedTransaction,
    ) -> Result<Vec<u8>, EngineError> {
        let address = composed
            .account
            .crypto_properties()
            .map(|p| p.address.clone())
            .ok_or_else(|| EngineError::Unknown("account has no chain address".to_string()))?;
        let inputs: Vec<String> = self
            .view_for(&address)
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.outpoint)
            .collect();
        let payload = json!({
            "from": address,
            "inputs": inputs,
            "to": composed.destination,
            "value": composed.amount,
            "fee": composed.fee,
        });
        serde_json::to_vec(&payload).map_err(|e| EngineError::Unknown(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_types::{
        Account, AccountCryptoProperties, AccountId, AccountProperties, AccountType,
        CurrencyCode, CurrencyType, Network,
    };

    const ADDR: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

    fn account(available: &str) -> Account {
        Account {
            id: AccountId::new("acc-btc"),
            currency_type: CurrencyType::Crypto,
            currency_code: CurrencyCode::Btc,
            network: Network::Mainnet,
            account_type: AccountType::Standard,
            balance: Amount::parse(available).unwrap(),
            ledger_balance: Amount::parse(available).unwrap(),
            available_balance: Amount::parse(available).unwrap(),
            overdraft_limit: Amount::ZERO,
            has_nominated_account: false,
            properties: AccountProperties::Crypto(AccountCryptoProperties {
                path: "m/44'/0'/0'/0/0".into(),
                address: ADDR.into(),
                direct_deposit_address: None,
                nonce: 0,
            }),
        }
    }

    fn params<'a>(account: &'a Account, amount: Option<Amount>, rate: &str) -> FeeParams<'a> {
        FeeParams {
            account,
            amount,
            fee_rates: None,
            level: Default::default(),
            gas_price: None,
            gas_limit: None,
            fee_rate: Some(Amount::parse(rate).unwrap()),
            has_data: false,
        }
    }

    #[test]
    fn address_validation() {
        let adapter = UtxoAdapter::new();
        assert!(adapter.validate_address(ADDR));
        assert!(adapter.validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(!adapter.validate_address("0x00000000000000000000000000000000000000aa"));
        assert!(!adapter.validate_address("bc1"));
    }

    #[test]
    fn single_input_fee() {
        let adapter = UtxoAdapter::new();
        let account = account("1.0");
        adapter.seed_utxos(
            ADDR,
            vec![Utxo {
                outpoint: "aa:0".into(),
                value: Amount::parse("1.0").unwrap(),
            }],
        );

        let estimate = adapter
            .estimate_fee(&params(&account, Some(Amount::parse("0.5").unwrap()), "10"))
            .unwrap();
        // (10 + 148 + 68) vbytes * 10 sat/vbyte = 2260 sat
        assert_eq!(estimate.fee, Amount::parse("0.0000226").unwrap());
    }

    #[test]
    fn selection_adds_inputs_until_covered() {
        let adapter = UtxoAdapter::new();
        let account = account("0.3");
        adapter.seed_utxos(
            ADDR,
            vec![
                Utxo {
                    outpoint: "aa:0".into(),
                    value: Amount::parse("0.1").unwrap(),
                },
                Utxo {
                    outpoint: "bb:1".into(),
                    value: Amount::parse("0.1").unwrap(),
                },
                Utxo {
                    outpoint: "cc:0".into(),
                    value: Amount::parse("0.1").unwrap(),
                },
            ],
        );

        let estimate = adapter
            .estimate_fee(&params(&account, Some(Amount::parse("0.15").unwrap()), "10"))
            .unwrap();
        // Two inputs needed: (10 + 296 + 68) * 10 sat = 3740 sat
        assert_eq!(estimate.fee, Amount::parse("0.0000374").unwrap());
    }

    #[test]
    fn exhausted_view_reports_insufficient_funds() {
        let adapter = UtxoAdapter::new();
        let account = account("0.1");
        adapter.seed_utxos(
            ADDR,
            vec![Utxo {
                outpoint: "aa:0".into(),
                value: Amount::parse("0.1").unwrap(),
            }],
        );

        let result =
            adapter.estimate_fee(&params(&account, Some(Amount::parse("0.2").unwrap()), "10"));
        assert!(matches!(result, Err(EngineError::InsufficientFunds { .. })));
    }

    #[test]
    fn unseeded_view_falls_back_to_balance() {
        let adapter = UtxoAdapter::new();
        let account = account("2.0");

        let estimate = adapter
            .estimate_fee(&params(&account, Some(Amount::parse("1.0").unwrap()), "10"))
            .unwrap();
        assert_eq!(estimate.fee, Amount::parse("0.0000226").unwrap());
    }
}
