//! Per-network-family currency adapter seam.
//!
//! One adapter per `NetworkFamily` supplies the family-specific pieces of
//! composition and submission: address validation, fee estimation and
//! unsigned payload encoding. Everything chain-agnostic stays in the
//! composer and submitter.

use std::collections::HashMap;
use std::sync::Arc;

use lumo_types::{Account, Amount, EngineError, FeeRates, NetworkFamily};

use crate::adapters::{AccountNonceAdapter, InternalLedgerAdapter, UtxoAdapter};
use crate::composer::ComposedTransaction;

/// Which fee-rate tier to price a transaction at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FeeLevel {
    Slow,
    #[default]
    Average,
    Fast,
}

impl FeeLevel {
    pub fn pick(&self, rates: &FeeRates) -> Amount {
        match self {
            Self::Slow => rates.slow,
            Self::Average => rates.average,
            Self::Fast => rates.fast,
        }
    }
}

/// Inputs to a fee estimate.
pub struct FeeParams<'a> {
    pub account: &'a Account,
    /// `None` means send-max: fee is estimated against the full balance.
    pub amount: Option<Amount>,
    /// Current fee-rate snapshot for the account's currency, if any.
    pub fee_rates: Option<&'a FeeRates>,
    pub level: FeeLevel,
    /// Explicit gas price in gwei (account-nonce chains only).
    pub gas_price: Option<Amount>,
    /// Explicit gas limit (account-nonce chains only).
    pub gas_limit: Option<u64>,
    /// Explicit fee rate in sat/vbyte (UTXO chains only).
    pub fee_rate: Option<Amount>,
    /// Whether the transaction carries a data payload.
    pub has_data: bool,
}

/// The priced result of a fee estimate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeEstimate {
    /// Total fee in the account's own currency unit.
    pub fee: Amount,
    pub gas_price: Option<Amount>,
    pub gas_limit: Option<u64>,
}

/// Family-specific composition and encoding behavior.
pub trait CurrencyAdapter: Send + Sync {
    fn family(&self) -> NetworkFamily;

    fn validate_address(&self, address: &str) -> bool;

    fn estimate_fee(&self, params: &FeeParams<'_>) -> Result<FeeEstimate, EngineError>;

    /// Encode the descriptor into the bytes the vault signs and the
    /// transport broadcasts.
    fn build_unsigned_payload(
        &self,
        composed: &ComposedTransaction,
    ) -> Result<Vec<u8>, EngineError>;
}

/// Lookup table from network family to its adapter.
pub struct AdapterRegistry {
    adapters: HashMap<NetworkFamily, Arc<dyn CurrencyAdapter>>,
}

impl AdapterRegistry {
    /// Registry with the three built-in family adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            adapters: HashMap::new(),
        };
        registry.register(Arc::new(AccountNonceAdapter::new()));
        registry.register(Arc::new(UtxoAdapter::new()));
        registry.register(Arc::new(InternalLedgerAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn CurrencyAdapter>) {
        self.adapters.insert(adapter.family(), adapter);
    }

    pub fn for_family(&self, family: NetworkFamily) -> Result<&Arc<dyn CurrencyAdapter>, EngineError> {
        self.adapters
            .get(&family)
            .ok_or_else(|| EngineError::Unknown(format!("no adapter for family {family:?}")))
    }
}
