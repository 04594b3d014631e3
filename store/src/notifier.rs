//! Observer fan-out for store and rate mutations.
//!
//! Two registries: state listeners receive every snapshot after a mutation,
//! per-transaction listeners receive updates for one transaction id and are
//! removed automatically once that transaction reaches a terminal status.
//! Fan-out is synchronous and in registration order; listeners must not
//! block the calling thread for long.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use lumo_types::{Transaction, TransactionId};

use crate::store::StoreSnapshot;

/// Handle returned on registration, used for explicit removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback receiving the full post-mutation snapshot.
pub type StateListener = Arc<dyn Fn(&StoreSnapshot) + Send + Sync>;

/// Callback receiving updates for a single transaction.
pub type TransactionListener = Arc<dyn Fn(&Transaction) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    state_listeners: Vec<(ListenerId, StateListener)>,
    transaction_listeners: HashMap<TransactionId, Vec<(ListenerId, TransactionListener)>>,
}

/// Fan-out hub informing observers whenever the store or rate cache mutates.
#[derive(Default)]
pub struct ChangeNotifier {
    registry: Mutex<Registry>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state_listener(&self, listener: StateListener) -> ListenerId {
        let mut reg = self.registry.lock().expect("notifier lock poisoned");
        reg.next_id += 1;
        let id = ListenerId(reg.next_id);
        reg.state_listeners.push((id, listener));
        id
    }

    /// Remove a state listener. Removing an unknown id is a no-op.
    pub fn remove_state_listener(&self, id: ListenerId) {
        let mut reg = self.registry.lock().expect("notifier lock poisoned");
        reg.state_listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn add_transaction_listener(
        &self,
        tx_id: TransactionId,
        listener: TransactionListener,
    ) -> ListenerId {
        let mut reg = self.registry.lock().expect("notifier lock poisoned");
        reg.next_id += 1;
        let id = ListenerId(reg.next_id);
        reg.transaction_listeners
            .entry(tx_id)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a per-transaction listener. Unknown ids are a no-op.
    pub fn remove_transaction_listener(&self, tx_id: &TransactionId, id: ListenerId) {
        let mut reg = self.registry.lock().expect("notifier lock poisoned");
        if let Some(listeners) = reg.transaction_listeners.get_mut(tx_id) {
            listeners.retain(|(lid, _)| *lid != id);
            if listeners.is_empty() {
                reg.transaction_listeners.remove(tx_id);
            }
        }
    }

    /// Drop every registered listener. Called on sign-out.
    pub fn clear(&self) {
        let mut reg = self.registry.lock().expect("notifier lock poisoned");
        reg.state_listeners.clear();
        reg.transaction_listeners.clear();
    }

    /// Fan a post-mutation snapshot out to all state listeners.
    ///
    /// Listeners are cloned out of the registry first so a callback can
    /// re-enter the notifier (e.g. to remove itself) without deadlocking.
    pub fn notify_state_changed(&self, snapshot: &StoreSnapshot) {
        let listeners: Vec<StateListener> = {
            let reg = self.registry.lock().expect("notifier lock poisoned");
            reg.state_listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in listeners {
            listener(snapshot);
        }
    }

    /// Fan a transaction update out to its listeners. Listeners for a
    /// transaction that reached a terminal status are removed afterwards.
    pub fn notify_transaction(&self, tx: &Transaction) {
        let listeners: Vec<TransactionListener> = {
            let reg = self.registry.lock().expect("notifier lock poisoned");
            match reg.transaction_listeners.get(&tx.id) {
                Some(listeners) => listeners.iter().map(|(_, l)| l.clone()).collect(),
                None => Vec::new(),
            }
        };
        for listener in &listeners {
            listener(tx);
        }
        if tx.status.is_terminal() && !listeners.is_empty() {
            let mut reg = self.registry.lock().expect("notifier lock poisoned");
            reg.transaction_listeners.remove(&tx.id);
            debug!(tx_id = %tx.id, status = %tx.status, "transaction listeners detached");
        }
    }

    #[cfg(test)]
    fn transaction_listener_count(&self, tx_id: &TransactionId) -> usize {
        let reg = self.registry.lock().expect("notifier lock poisoned");
        reg.transaction_listeners
            .get(tx_id)
            .map_or(0, |l| l.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_types::{
        Amount, CurrencyCode, Network, Timestamp, TransactionCryptoProperties,
        TransactionDirection, TransactionProperties, TransactionStatus, TransactionType,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tx(id: &str, status: TransactionStatus) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            tx_type: TransactionType::Crypto,
            currency_code: CurrencyCode::Eth,
            direction: TransactionDirection::Outgoing,
            network: Network::Mainnet,
            status,
            senders: vec![],
            recipients: vec![],
            amount: Amount::ZERO,
            fee: Amount::ZERO,
            nonce: None,
            metadata: None,
            submitted_at: None,
            confirmed_at: None,
            timestamp: Timestamp::new(0),
            properties: TransactionProperties::Crypto(TransactionCryptoProperties::default()),
            exchange_id: None,
        }
    }

    #[test]
    fn state_listeners_fire_in_registration_order() {
        let notifier = ChangeNotifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = order.clone();
            notifier.add_state_listener(Arc::new(move |_| {
                order.lock().unwrap().push(tag);
            }));
        }

        notifier.notify_state_changed(&StoreSnapshot::default());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn removed_listener_no_longer_fires() {
        let notifier = ChangeNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let id = notifier.add_state_listener(Arc::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));

        notifier.notify_state_changed(&StoreSnapshot::default());
        notifier.remove_state_listener(id);
        notifier.notify_state_changed(&StoreSnapshot::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_unknown_listener_is_noop() {
        let notifier = ChangeNotifier::new();
        let id = notifier.add_state_listener(Arc::new(|_| {}));
        notifier.remove_state_listener(id);
        // Second removal of the same id must not panic or error
        notifier.remove_state_listener(id);
        notifier.remove_transaction_listener(&TransactionId::new("missing"), id);
    }

    #[test]
    fn transaction_listener_detached_on_terminal_status() {
        let notifier = ChangeNotifier::new();
        let tx_id = TransactionId::new("tx-1");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        notifier.add_transaction_listener(
            tx_id.clone(),
            Arc::new(move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        notifier.notify_transaction(&tx("tx-1", TransactionStatus::Pending));
        assert_eq!(notifier.transaction_listener_count(&tx_id), 1);

        notifier.notify_transaction(&tx("tx-1", TransactionStatus::Confirmed));
        assert_eq!(notifier.transaction_listener_count(&tx_id), 0);

        // Further notifications reach nobody
        notifier.notify_transaction(&tx("tx-1", TransactionStatus::Confirmed));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_can_remove_itself_during_callback() {
        let notifier = Arc::new(ChangeNotifier::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let notifier2 = notifier.clone();
        let slot2 = slot.clone();
        let id = notifier.add_state_listener(Arc::new(move |_| {
            if let Some(id) = *slot2.lock().unwrap() {
                notifier2.remove_state_listener(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        // Must not deadlock
        notifier.notify_state_changed(&StoreSnapshot::default());
        notifier.notify_state_changed(&StoreSnapshot::default());
    }
}
