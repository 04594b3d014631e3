//! Adapter for account-nonce chains (Ethereum-like).

use serde_json::json;

use lumo_types::{Amount, EngineError, NetworkFamily};

use crate::adapter::{CurrencyAdapter, FeeEstimate, FeeParams};
use crate::composer::ComposedTransaction;

/// Gas limit of a plain value transfer.
const DEFAULT_GAS_LIMIT: u64 = 21_000;

/// Gas limit used when the transaction carries a data payload.
const DATA_GAS_LIMIT: u64 = 65_000;

/// Gwei per whole coin.
const GWEI_PER_COIN: u64 = 1_000_000_000;

pub struct AccountNonceAdapter;

impl AccountNonceAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AccountNonceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrencyAdapter for AccountNonceAdapter {
    fn family(&self) -> NetworkFamily {
        NetworkFamily::AccountNonce
    }

    fn validate_address(&self, address: &str) -> bool {
        let Some(hex_part) = address.strip_prefix("0x") else {
            return false;
        };
        hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Fee is `gas_price (gwei) × gas_limit`, converted to whole coins.
    /// The gas price comes from the caller's override or the current
    /// fee-rate snapshot at the requested level.
    fn estimate_fee(&self, params: &FeeParams<'_>) -> Result<FeeEstimate, EngineError> {
        let gas_price = match params.gas_price {
            Some(price) => price,
            None => {
                let rates = params.fee_rates.ok_or_else(|| {
                    EngineError::FeeRateUnavailable(params.account.currency_code.to_string())
                })?;
                params.level.pick(rates)
            }
        };
        let gas_limit = params.gas_limit.unwrap_or(if params.has_data {
            DATA_GAS_LIMIT
        } else {
            DEFAULT_GAS_LIMIT
        });

        let fee = gas_price
            .checked_mul(Amount::from_u64(gas_limit))
            .and_then(|gwei| gwei.checked_div(Amount::from_u64(GWEI_PER_COIN)))
            .ok_or_else(|| EngineError::Unknown("fee overflow".to_string()))?;

        Ok(FeeEstimate {
            fee,
            gas_price: Some(gas_price),
            gas_limit: Some(gas_limit),
        })
    }

    fn build_unsigned_payload(
        &self,
        composed: &ComposedTransaction,
    ) -> Result<Vec<u8>, EngineError> {
        let from = composed
            .account
            .crypto_properties()
            .map(|p| p.address.clone())
            .ok_or_else(|| EngineError::Unknown("account has no chain address".to_string()))?;
        let payload = json!({
            "from": from,
            "to": composed.destination,
            "value": composed.amount,
            "data": composed.data,
            "gas_price": composed.gas_price,
            "gas_limit": composed.gas_limit,
            "nonce": composed.nonce,
        });
        serde_json::to_vec(&payload).map_err(|e| EngineError::Unknown(e.to_string()))
    }
}
