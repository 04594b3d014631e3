//! Transaction and exchange composition.
//!
//! Composers are stateless: they read a fresh store snapshot, price the
//! transaction through the matching currency adapter and return an unsigned
//! descriptor carrying the exact account snapshot, fee and nonce used, so
//! the submitter can detect staleness later. Composition never mutates the
//! store.

use std::sync::Arc;
use tracing::debug;

use lumo_rates::RateCache;
use lumo_store::AccountStore;
use lumo_types::{
    Account, AccountId, Amount, EngineError, Quote, Timestamp, TransactionType,
};

use crate::adapter::{AdapterRegistry, FeeLevel, FeeParams};

/// Caller inputs for composing a transaction.
#[derive(Clone, Debug)]
pub struct ComposeRequest {
    pub account_id: AccountId,
    /// `None` makes this a pure fee-estimation call.
    pub destination: Option<String>,
    /// `None` means send-max: spend everything available after the fee.
    pub amount: Option<Amount>,
    pub data: Option<String>,
    pub fee_level: FeeLevel,
    /// Explicit gas price in gwei (account-nonce chains).
    pub gas_price: Option<Amount>,
    /// Explicit gas limit (account-nonce chains).
    pub gas_limit: Option<u64>,
    /// Explicit fee rate in sat/vbyte (UTXO chains).
    pub fee_rate: Option<Amount>,
    /// Explicit nonce override, enabling replacement/cancellation flows.
    /// Bypasses the store's counter.
    pub nonce: Option<u64>,
}

impl ComposeRequest {
    /// A plain send of `amount` to `destination` with default pricing.
    pub fn send(
        account_id: AccountId,
        destination: impl Into<String>,
        amount: Option<Amount>,
    ) -> Self {
        Self {
            account_id,
            destination: Some(destination.into()),
            amount,
            data: None,
            fee_level: FeeLevel::default(),
            gas_price: None,
            gas_limit: None,
            fee_rate: None,
            nonce: None,
        }
    }
}

/// Ephemeral unsigned transaction descriptor.
///
/// Produced by the composer, consumed exactly once by the submitter and
/// discarded; never cached or reused. The embedded account snapshot and
/// `account_revision` let the submitter reject replays composed against an
/// outdated balance or nonce.
#[derive(Clone, Debug)]
pub struct ComposedTransaction {
    pub tx_type: TransactionType,
    /// Source account exactly as seen at compose time.
    pub account: Account,
    pub destination: Option<String>,
    /// Resolved amount (send-max already computed).
    pub amount: Amount,
    pub data: Option<String>,
    pub fee: Amount,
    pub gas_price: Option<Amount>,
    pub gas_limit: Option<u64>,
    pub nonce: Option<u64>,
    /// Whether the nonce was caller-supplied rather than store-assigned.
    pub explicit_nonce: bool,
    /// Store server revision of the source account at compose time.
    pub account_revision: u64,
    /// Present once the vault has signed the payload.
    pub signed_payload: Option<Vec<u8>>,
}

/// Ephemeral exchange descriptor: one debit leg and one credit leg priced
/// by a TTL-bound quote.
#[derive(Clone, Debug)]
pub struct ComposedExchange {
    pub quote: Quote,
    pub debit_account: Account,
    pub credit_account: Account,
    /// Amount in debit-account currency.
    pub amount: Amount,
    /// Amount credited after fees, in credit-account currency.
    pub return_amount: Amount,
    /// Quote fee, in debit-account currency.
    pub exchange_fee: Amount,
    /// Network fee of the debit leg.
    pub debit_fee: Amount,
    pub debit_nonce: Option<u64>,
    pub debit_revision: u64,
    pub credit_revision: u64,
}

/// Builds unsigned transaction descriptors against a fresh store snapshot.
pub struct TransactionComposer {
    store: Arc<AccountStore>,
    rates: Arc<RateCache>,
    adapters: Arc<AdapterRegistry>,
}

impl TransactionComposer {
    pub fn new(
        store: Arc<AccountStore>,
        rates: Arc<RateCache>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            store,
            rates,
            adapters,
        }
    }

    pub fn compose(&self, req: &ComposeRequest) -> Result<ComposedTransaction, EngineError> {
        let account = self.store.get_account_by_id(&req.account_id)?;
        let account_revision = self.store.account_server_revision(&req.account_id);
        let family = account.currency_code.network_family();
        let adapter = self.adapters.for_family(family)?;

        if let Some(destination) = &req.destination {
            if !adapter.validate_address(destination) {
                return Err(EngineError::InvalidDestinationAddress(destination.clone()));
            }
        }

        let fee_rates = self.rates.fee_rates(account.currency_code);
        let estimate = adapter.estimate_fee(&FeeParams {
            account: &account,
            amount: req.amount,
            fee_rates: fee_rates.as_ref(),
            level: req.fee_level,
            gas_price: req.gas_price,
            gas_limit: req.gas_limit,
            fee_rate: req.fee_rate,
            has_data: req.data.is_some(),
        })?;

        let amount = match req.amount {
            Some(amount) => {
                let total = amount
                    .checked_add(estimate.fee)
                    .ok_or_else(|| EngineError::Unknown("amount overflow".to_string()))?;
                if !account.can_spend(total) {
                    return Err(EngineError::InsufficientFunds {
                        needed: total,
                        available: account.available_balance,
                    });
                }
                amount
            }
            // Send-max: everything available after the fee
            None => {
                if account.available_balance < estimate.fee {
                    return Err(EngineError::InsufficientFunds {
                        needed: estimate.fee,
                        available: account.available_balance,
                    });
                }
                account.available_balance.saturating_sub(estimate.fee)
            }
        };

        let (nonce, explicit_nonce) = match req.nonce {
            Some(n) => (Some(n), true),
            None => (account.nonce(), false),
        };

        debug!(
            account_id = %account.id,
            %amount,
            fee = %estimate.fee,
            ?nonce,
            "transaction composed"
        );

        Ok(ComposedTransaction {
            tx_type: match family {
                lumo_types::NetworkFamily::InternalLedger => TransactionType::Fiat,
                _ => TransactionType::Crypto,
            },
            account,
            destination: req.destination.clone(),
            amount,
            data: req.data.clone(),
            fee: estimate.fee,
            gas_price: estimate.gas_price,
            gas_limit: estimate.gas_limit,
            nonce,
            explicit_nonce,
            account_revision,
            signed_payload: None,
        })
    }
}

/// Builds exchange descriptors priced by a quote.
pub struct ExchangeComposer {
    store: Arc<AccountStore>,
    rates: Arc<RateCache>,
    adapters: Arc<AdapterRegistry>,
}

impl ExchangeComposer {
    pub fn new(
        store: Arc<AccountStore>,
        rates: Arc<RateCache>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            store,
            rates,
            adapters,
        }
    }

    /// Compose an exchange of `amount` (debit currency) under `quote`.
    ///
    /// Fails with `QuoteExpired` when the quote's validity window has
    /// already elapsed at `now`; a stale price is never silently used.
    pub fn compose(
        &self,
        debit_account_id: &AccountId,
        credit_account_id: &AccountId,
        quote: Quote,
        amount: Amount,
        now: Timestamp,
    ) -> Result<ComposedExchange, EngineError> {
        if quote.has_expired(now) {
            return Err(EngineError::QuoteExpired(quote.id.to_string()));
        }

        let debit_account = self.store.get_account_by_id(debit_account_id)?;
        let credit_account = self.store.get_account_by_id(credit_account_id)?;

        if debit_account.currency_code != quote.from_currency
            || credit_account.currency_code != quote.to_currency
        {
            return Err(EngineError::Unknown(format!(
                "quote {} prices {}->{}, accounts are {}->{}",
                quote.id,
                quote.from_currency,
                quote.to_currency,
                debit_account.currency_code,
                credit_account.currency_code
            )));
        }

        let exchange_fee = amount
            .checked_mul(quote.fee_rate)
            .ok_or_else(|| EngineError::Unknown("exchange fee overflow".to_string()))?;
        let return_amount = amount
            .saturating_sub(exchange_fee)
            .checked_mul(quote.rate)
            .ok_or_else(|| EngineError::Unknown("return amount overflow".to_string()))?;

        let family = debit_account.currency_code.network_family();
        let adapter = self.adapters.for_family(family)?;
        let fee_rates = self.rates.fee_rates(debit_account.currency_code);
        let estimate = adapter.estimate_fee(&FeeParams {
            account: &debit_account,
            amount: Some(amount),
            fee_rates: fee_rates.as_ref(),
            level: FeeLevel::default(),
            gas_price: None,
            gas_limit: None,
            fee_rate: None,
            has_data: false,
        })?;

        let total = amount
            .checked_add(estimate.fee)
            .ok_or_else(|| EngineError::Unknown("amount overflow".to_string()))?;
        if !debit_account.can_spend(total) {
            return Err(EngineError::InsufficientFunds {
                needed: total,
                available: debit_account.available_balance,
            });
        }

        let debit_revision = self.store.account_server_revision(debit_account_id);
        let credit_revision = self.store.account_server_revision(credit_account_id);
        let debit_nonce = debit_account.nonce();

        debug!(
            quote_id = %quote.id,
            %amount,
            %return_amount,
            "exchange composed"
        );

        Ok(ComposedExchange {
            quote,
            debit_account,
            credit_account,
            amount,
            return_amount,
            exchange_fee,
            debit_fee: estimate.fee,
            debit_nonce,
            debit_revision,
            credit_revision,
        })
    }
}
