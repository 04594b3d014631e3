//! Built-in adapters, one per network family.

mod account_nonce;
mod internal;
mod utxo;

pub use account_nonce::AccountNonceAdapter;
pub use internal::InternalLedgerAdapter;
pub use utxo::{Utxo, UtxoAdapter};
