//! Adapter for the provider-side fiat ledger.
//!
//! Internal transfers settle inside the provider's own books: no network
//! fee, no nonce, and the destination is the counterparty account id or
//! bank reference.

use serde_json::json;

use lumo_types::{Amount, EngineError, NetworkFamily};

use crate::adapter::{CurrencyAdapter, FeeEstimate, FeeParams};
use crate::composer::ComposedTransaction;

pub struct InternalLedgerAdapter;

impl InternalLedgerAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InternalLedgerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrencyAdapter for InternalLedgerAdapter {
    fn family(&self) -> NetworkFamily {
        NetworkFamily::InternalLedger
    }

    fn validate_address(&self, address: &str) -> bool {
        !address.is_empty() && address.len() <= 64
    }

    fn estimate_fee(&self, _params: &FeeParams<'_>) -> Result<FeeEstimate, EngineError> {
        Ok(FeeEstimate {
            fee: Amount::ZERO,
            gas_price: None,
            gas_limit: None,
        })
    }

    fn build_unsigned_payload(
        &self,
        composed: &ComposedTransaction,
    ) -> Result<Vec<u8>, EngineError> {
        let payload = json!({
            "from_account": composed.account.id,
            "to": composed.destination,
            "currency": composed.account.currency_code,
            "value": composed.amount,
        });
        serde_json::to_vec(&payload).map_err(|e| EngineError::Unknown(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_types::{
        Account, AccountFiatProperties, AccountId, AccountProperties, AccountType,
        CurrencyCode, CurrencyType, Network,
    };

    fn fiat_account() -> Account {
        Account {
            id: AccountId::new("acc-gbp"),
            currency_type: CurrencyType::Fiat,
            currency_code: CurrencyCode::Gbp,
            network: Network::Mainnet,
            account_type: AccountType::Standard,
            balance: Amount::parse("100").unwrap(),
            ledger_balance: Amount::parse("100").unwrap(),
            available_balance: Amount::parse("100").unwrap(),
            overdraft_limit: Amount::ZERO,
            has_nominated_account: true,
            properties: AccountProperties::Fiat(AccountFiatProperties::default()),
        }
    }

    #[test]
    fn fee_is_always_zero() {
        let adapter = InternalLedgerAdapter::new();
        let account = fiat_account();
        let estimate = adapter
            .estimate_fee(&FeeParams {
                account: &account,
                amount: Some(Amount::parse("10").unwrap()),
                fee_rates: None,
                level: Default::default(),
                gas_price: None,
                gas_limit: None,
                fee_rate: None,
                has_data: false,
            })
            .unwrap();
        assert_eq!(estimate.fee, Amount::ZERO);
    }

    #[test]
    fn destination_is_any_short_reference() {
        let adapter = InternalLedgerAdapter::new();
        assert_eq!(adapter.family(), NetworkFamily::InternalLedger);
        assert!(adapter.validate_address("acc-gbp-2"));
        assert!(adapter.validate_address("GB33BUKB20201555555555"));
        assert!(!adapter.validate_address(""));
    }
}
