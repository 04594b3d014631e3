//! Fundamental types for the Lumo wallet engine.
//!
//! This crate defines the model types shared across every other crate in the
//! workspace: amounts, timestamps, currency and network enums, accounts,
//! transactions, exchanges, pricing objects, and the caller-visible error
//! taxonomy.

pub mod account;
pub mod amount;
pub mod currency;
pub mod error;
pub mod exchange;
pub mod rates;
pub mod time;
pub mod transaction;

pub use account::{
    Account, AccountCryptoProperties, AccountFiatProperties, AccountId, AccountProperties,
    AccountType,
};
pub use amount::Amount;
pub use currency::{CurrencyCode, CurrencyType, Network, NetworkFamily};
pub use error::EngineError;
pub use exchange::{Exchange, ExchangeId, ExchangeStatus, Quote, QuoteId};
pub use rates::{ExchangeRate, FeeRates, HistoricalRates, TimeInterval};
pub use time::Timestamp;
pub use transaction::{
    Transaction, TransactionAmount, TransactionCryptoProperties, TransactionDirection,
    TransactionFiatProperties, TransactionId, TransactionProperties, TransactionStatus,
    TransactionType,
};
