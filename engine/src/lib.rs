//! The Lumo wallet engine.
//!
//! `WalletEngine` is the host-facing facade: it owns the key vault, the
//! account store, the rate cache and the change notifier, gates every
//! operation on the session state machine, and drives transaction and
//! exchange composition, signing, submission and reconciliation through
//! per-network-family currency adapters.

pub mod adapter;
pub mod adapters;
pub mod composer;
pub mod engine;
pub mod session;
pub mod submitter;

pub use adapter::{AdapterRegistry, CurrencyAdapter, FeeEstimate, FeeLevel, FeeParams};
pub use composer::{
    ComposeRequest, ComposedExchange, ComposedTransaction, ExchangeComposer, TransactionComposer,
};
pub use engine::{EngineConfig, WalletEngine};
pub use session::SessionState;
pub use submitter::{BroadcastReceipt, Submitter, Transport, TransportError};
