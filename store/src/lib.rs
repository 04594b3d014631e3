//! Reactive account/transaction state for the Lumo wallet engine.
//!
//! `AccountStore` is the single source of truth for the signed-in user's
//! accounts, transactions and exchanges; `ChangeNotifier` fans mutations out
//! to registered observers. Writers are serialized through one mutex, reads
//! clone an `Arc`-held immutable state and never block writers.

pub mod error;
pub mod notifier;
pub mod store;

pub use error::StoreError;
pub use notifier::{ChangeNotifier, ListenerId, StateListener, TransactionListener};
pub use store::{AccountStore, ReconcileFields, ServerDelta, StoreSnapshot};
