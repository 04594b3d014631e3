//! The authoritative in-memory ledger for the signed-in user.
//!
//! State is held behind `Mutex<Arc<StoreState>>`: writers clone the state,
//! mutate the clone and swap the `Arc`, so `snapshot()` hands out immutable
//! copies without ever blocking on an in-progress write for longer than the
//! pointer swap. All mutations notify the `ChangeNotifier` after the swap,
//! outside the critical section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use lumo_types::{
    Account, AccountId, AccountProperties, AccountType, Amount, CurrencyCode, Exchange,
    ExchangeId, ExchangeStatus, Network, Timestamp, Transaction, TransactionDirection,
    TransactionId, TransactionProperties, TransactionStatus,
};

use crate::error::StoreError;
use crate::notifier::ChangeNotifier;

/// A server-pushed state delta, applied in increasing sequence order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerDelta {
    /// Server-assigned sequence number; duplicates and out-of-order deltas
    /// are dropped, making application idempotent.
    pub sequence: u64,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub exchanges: Vec<Exchange>,
}

/// Optional fields applied during reconciliation of a submitted transaction.
#[derive(Clone, Debug, Default)]
pub struct ReconcileFields {
    pub tx_hash: Option<String>,
    pub submitted_at: Option<Timestamp>,
    pub confirmed_at: Option<Timestamp>,
}

/// Point-in-time immutable copy of the store, handed to observers and hosts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Bumped on every applied mutation.
    pub revision: u64,
    /// Highest applied server sequence number.
    pub last_sequence: u64,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub exchanges: Vec<Exchange>,
}

/// Funds held against an account by an optimistic pending submission.
#[derive(Clone, Debug, PartialEq)]
struct Hold {
    account_id: AccountId,
    amount: Amount,
    prev_nonce: Option<u64>,
    nonce_bumped: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct StoreState {
    revision: u64,
    last_sequence: u64,
    accounts: BTreeMap<AccountId, Account>,
    transactions: BTreeMap<TransactionId, Transaction>,
    exchanges: BTreeMap<ExchangeId, Exchange>,
    /// Per-account count of applied server updates; compositions embed this
    /// so the submitter can detect staleness.
    server_revisions: BTreeMap<AccountId, u64>,
    /// Last server-reported available balance per account, before local holds.
    server_available: BTreeMap<AccountId, Amount>,
    /// Active holds keyed by the pending transaction that created them.
    holds: BTreeMap<TransactionId, Hold>,
}

/// Single source of truth for accounts, transactions and exchanges.
pub struct AccountStore {
    state: Mutex<Arc<StoreState>>,
    notifier: Arc<ChangeNotifier>,
}

impl AccountStore {
    pub fn new(notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            state: Mutex::new(Arc::new(StoreState::default())),
            notifier,
        }
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Rebuild the store from a full server payload on sign-in.
    pub fn load_user(&self, accounts: Vec<Account>, transactions: Vec<Transaction>) {
        let snapshot = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = StoreState {
                revision: guard.revision + 1,
                ..StoreState::default()
            };
            for account in accounts {
                next.server_available
                    .insert(account.id.clone(), account.available_balance);
                next.server_revisions.insert(account.id.clone(), 0);
                next.accounts.insert(account.id.clone(), account);
            }
            for tx in transactions {
                next.transactions.insert(tx.id.clone(), tx);
            }
            *guard = Arc::new(next);
            build_snapshot(&guard)
        };
        debug!(
            accounts = snapshot.accounts.len(),
            transactions = snapshot.transactions.len(),
            "store loaded"
        );
        self.notifier.notify_state_changed(&snapshot);
    }

    /// Discard all state. Called on sign-out.
    pub fn clear(&self) {
        let mut guard = self.state.lock().expect("store lock poisoned");
        *guard = Arc::new(StoreState::default());
    }

    /// Point-in-time immutable copy.
    pub fn snapshot(&self) -> StoreSnapshot {
        let guard = self.state.lock().expect("store lock poisoned");
        build_snapshot(&guard)
    }

    pub fn get_account_by_id(&self, id: &AccountId) -> Result<Account, StoreError> {
        let guard = self.state.lock().expect("store lock poisoned");
        guard
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    /// Look up an account by currency, network and type.
    pub fn get_account(
        &self,
        currency: CurrencyCode,
        network: Network,
        account_type: AccountType,
    ) -> Option<Account> {
        let guard = self.state.lock().expect("store lock poisoned");
        guard
            .accounts
            .values()
            .find(|a| {
                a.currency_code == currency
                    && a.network == network
                    && a.account_type == account_type
            })
            .cloned()
    }

    pub fn get_transaction(&self, id: &TransactionId) -> Option<Transaction> {
        let guard = self.state.lock().expect("store lock poisoned");
        guard.transactions.get(id).cloned()
    }

    /// All transactions touching the given account, newest first.
    pub fn transactions_for_account(&self, account_id: &AccountId) -> Vec<Transaction> {
        let guard = self.state.lock().expect("store lock poisoned");
        let mut txs: Vec<Transaction> = guard
            .transactions
            .values()
            .filter(|tx| {
                tx.senders
                    .iter()
                    .chain(tx.recipients.iter())
                    .any(|p| p.account_id.as_ref() == Some(account_id))
            })
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txs
    }

    pub fn get_exchange(&self, id: &ExchangeId) -> Option<Exchange> {
        let guard = self.state.lock().expect("store lock poisoned");
        guard.exchanges.get(id).cloned()
    }

    /// Number of server updates that have touched this account. Compositions
    /// embed the value at compose time; a mismatch at submit time means the
    /// embedded account snapshot is stale.
    pub fn account_server_revision(&self, id: &AccountId) -> u64 {
        let guard = self.state.lock().expect("store lock poisoned");
        guard.server_revisions.get(id).copied().unwrap_or(0)
    }

    /// Apply a server delta. Returns `false` when the delta was dropped as a
    /// duplicate or out-of-order replay; reapplying an applied delta is a
    /// no-op by construction.
    pub fn apply_server_update(&self, delta: ServerDelta) -> bool {
        let (snapshot, changed) = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            if delta.sequence <= guard.last_sequence {
                debug!(
                    sequence = delta.sequence,
                    last = guard.last_sequence,
                    "server delta dropped"
                );
                return false;
            }

            let mut next = (**guard).clone();
            let mut changed = Vec::new();
            let updated_accounts: std::collections::BTreeSet<AccountId> =
                delta.accounts.iter().map(|a| a.id.clone()).collect();

            // Transactions first, so hold handoff is settled before account
            // payloads are merged.
            for incoming in delta.transactions {
                match next.transactions.get(&incoming.id) {
                    Some(existing) if !existing.status.can_transition_to(incoming.status) => {
                        warn!(
                            tx_id = %incoming.id,
                            from = %existing.status,
                            to = %incoming.status,
                            "server delta would regress terminal status, entity skipped"
                        );
                        continue;
                    }
                    _ => {}
                }
                if let Some(hold) = next.holds.get(&incoming.id).cloned() {
                    if updated_accounts.contains(&hold.account_id) {
                        // This delta also carries the account's server
                        // state, which supersedes the local hold.
                        next.holds.remove(&incoming.id);
                    } else if matches!(
                        incoming.status,
                        TransactionStatus::Failed
                            | TransactionStatus::Rejected
                            | TransactionStatus::Cancelled
                    ) {
                        next.holds.remove(&incoming.id);
                        release_hold_available(&mut next, &hold);
                        restore_hold_nonce(&mut next, &hold, incoming.nonce);
                    }
                }
                changed.push(incoming.clone());
                next.transactions.insert(incoming.id.clone(), incoming);
            }

            for incoming in delta.accounts {
                let id = incoming.id.clone();
                *next.server_revisions.entry(id.clone()).or_insert(0) += 1;
                next.server_available
                    .insert(id.clone(), incoming.available_balance);

                let mut account = incoming;
                // Re-apply local holds and keep a locally-advanced nonce:
                // the server may not have seen our pending submissions yet.
                let held = active_hold_total(&next, &id);
                account.available_balance = account.available_balance - held;
                if let (Some(existing), AccountProperties::Crypto(props)) = (
                    next.accounts.get(&id),
                    &mut account.properties,
                ) {
                    if let Some(local_nonce) = existing.nonce() {
                        if local_nonce > props.nonce {
                            props.nonce = local_nonce;
                        }
                    }
                }
                next.accounts.insert(id, account);
            }

            for incoming in delta.exchanges {
                if let Some(existing) = next.exchanges.get(&incoming.id) {
                    if existing.status.is_terminal() && existing.status != incoming.status {
                        warn!(exchange_id = %incoming.id, "exchange status regression skipped");
                        continue;
                    }
                }
                next.exchanges.insert(incoming.id.clone(), incoming);
            }

            next.last_sequence = delta.sequence;
            next.revision += 1;
            *guard = Arc::new(next);
            (build_snapshot(&guard), changed)
        };

        self.notifier.notify_state_changed(&snapshot);
        for tx in &changed {
            self.notifier.notify_transaction(tx);
        }
        true
    }

    /// Insert a locally-submitted pending transaction, holding its total
    /// against the source account's available balance and consuming its
    /// nonce. This is the point after which at most one in-flight
    /// transaction exists per nonce; a second default-nonce submission for
    /// an already-consumed nonce fails with `NonceConsumed`.
    pub fn apply_optimistic_submission(
        &self,
        tx: Transaction,
        explicit_nonce: bool,
    ) -> Result<(), StoreError> {
        let snapshot = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = (**guard).clone();

            if tx.direction == TransactionDirection::Outgoing {
                let account_id = tx
                    .source_account()
                    .cloned()
                    .ok_or_else(|| StoreError::AccountNotFound("<no source>".to_string()))?;

                if let (Some(nonce), false) = (tx.nonce, explicit_nonce) {
                    if let Some(holder) = next.transactions.values().find(|t| {
                        t.source_account() == Some(&account_id)
                            && t.nonce == Some(nonce)
                            && !matches!(
                                t.status,
                                TransactionStatus::Failed
                                    | TransactionStatus::Rejected
                                    | TransactionStatus::Cancelled
                            )
                    }) {
                        return Err(StoreError::NonceConsumed {
                            nonce,
                            holder: holder.id.to_string(),
                        });
                    }
                }

                let account = next
                    .accounts
                    .get_mut(&account_id)
                    .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))?;

                let total = tx.total_outgoing();
                if !account.can_spend(total) {
                    return Err(StoreError::InsufficientFunds {
                        needed: total.to_string(),
                        available: account.available_balance.to_string(),
                    });
                }
                account.available_balance = account.available_balance - total;

                let mut hold = Hold {
                    account_id: account_id.clone(),
                    amount: total,
                    prev_nonce: None,
                    nonce_bumped: false,
                };
                if let (Some(nonce), AccountProperties::Crypto(props)) =
                    (tx.nonce, &mut account.properties)
                {
                    hold.prev_nonce = Some(props.nonce);
                    if nonce + 1 > props.nonce {
                        props.nonce = nonce + 1;
                        hold.nonce_bumped = true;
                    }
                }
                next.holds.insert(tx.id.clone(), hold);
            }

            next.transactions.insert(tx.id.clone(), tx);
            next.revision += 1;
            *guard = Arc::new(next);
            build_snapshot(&guard)
        };
        self.notifier.notify_state_changed(&snapshot);
        Ok(())
    }

    /// Undo an optimistic submission that failed before broadcast. Restores
    /// the account to exactly its pre-submission state and removes the entry
    /// (the transaction never reached the network, so there is nothing to
    /// supersede).
    pub fn revert_optimistic(&self, tx_id: &TransactionId) -> Result<(), StoreError> {
        let snapshot = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = (**guard).clone();

            let tx = next
                .transactions
                .remove(tx_id)
                .ok_or_else(|| StoreError::TransactionNotFound(tx_id.to_string()))?;

            if let Some(hold) = next.holds.remove(tx_id) {
                if let Some(account) = next.accounts.get_mut(&hold.account_id) {
                    account.available_balance =
                        account.available_balance + hold.amount;
                    if let (Some(nonce), AccountProperties::Crypto(props)) =
                        (tx.nonce, &mut account.properties)
                    {
                        if hold.nonce_bumped && props.nonce == nonce + 1 {
                            if let Some(prev) = hold.prev_nonce {
                                props.nonce = prev;
                            }
                        }
                    }
                }
            }

            next.revision += 1;
            *guard = Arc::new(next);
            build_snapshot(&guard)
        };
        self.notifier.notify_state_changed(&snapshot);
        Ok(())
    }

    /// Apply the outcome of a submitted transaction: transition its status
    /// (monotonically) and settle or release the balance hold.
    pub fn reconcile(
        &self,
        tx_id: &TransactionId,
        status: TransactionStatus,
        fields: ReconcileFields,
    ) -> Result<Transaction, StoreError> {
        let (snapshot, tx) = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = (**guard).clone();

            let tx = next
                .transactions
                .get_mut(tx_id)
                .ok_or_else(|| StoreError::TransactionNotFound(tx_id.to_string()))?;

            if !tx.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    from: tx.status.to_string(),
                    to: status.to_string(),
                });
            }

            tx.status = status;
            if let Some(hash) = fields.tx_hash {
                if let TransactionProperties::Crypto(props) = &mut tx.properties {
                    props.tx_hash = Some(hash);
                }
            }
            if fields.submitted_at.is_some() {
                tx.submitted_at = fields.submitted_at;
            }
            if fields.confirmed_at.is_some() {
                tx.confirmed_at = fields.confirmed_at;
            }
            if let Some(t) = tx.submitted_at {
                tx.timestamp = tx.timestamp.min(t);
            }
            let tx = tx.clone();

            match status {
                TransactionStatus::Failed
                | TransactionStatus::Rejected
                | TransactionStatus::Cancelled => {
                    if let Some(hold) = next.holds.remove(tx_id) {
                        release_hold_available(&mut next, &hold);
                        restore_hold_nonce(&mut next, &hold, tx.nonce);
                    }
                }
                TransactionStatus::Confirmed => {
                    if let Some(hold) = next.holds.remove(tx_id) {
                        settle_hold(&mut next, &hold);
                    }
                }
                _ => {}
            }

            next.revision += 1;
            *guard = Arc::new(next);
            (build_snapshot(&guard), tx)
        };

        self.notifier.notify_state_changed(&snapshot);
        self.notifier.notify_transaction(&tx);
        Ok(tx)
    }

    /// Insert a freshly-created exchange record.
    pub fn insert_exchange(&self, exchange: Exchange) {
        let snapshot = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = (**guard).clone();
            next.exchanges.insert(exchange.id.clone(), exchange);
            next.revision += 1;
            *guard = Arc::new(next);
            build_snapshot(&guard)
        };
        self.notifier.notify_state_changed(&snapshot);
    }

    /// Transition an exchange's status (monotonically).
    pub fn update_exchange_status(
        &self,
        id: &ExchangeId,
        status: ExchangeStatus,
    ) -> Result<Exchange, StoreError> {
        let (snapshot, exchange) = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = (**guard).clone();
            let exchange = next
                .exchanges
                .get_mut(id)
                .ok_or_else(|| StoreError::ExchangeNotFound(id.to_string()))?;
            if exchange.status.is_terminal() && exchange.status != status {
                return Err(StoreError::InvalidTransition {
                    from: format!("{:?}", exchange.status),
                    to: format!("{status:?}"),
                });
            }
            exchange.status = status;
            let exchange = exchange.clone();
            next.revision += 1;
            *guard = Arc::new(next);
            (build_snapshot(&guard), exchange)
        };
        self.notifier.notify_state_changed(&snapshot);
        Ok(exchange)
    }

    /// Remove an exchange whose submission failed before either leg reached
    /// the network.
    pub fn revert_exchange(&self, id: &ExchangeId) -> Result<(), StoreError> {
        let snapshot = {
            let mut guard = self.state.lock().expect("store lock poisoned");
            let mut next = (**guard).clone();
            next.exchanges
                .remove(id)
                .ok_or_else(|| StoreError::ExchangeNotFound(id.to_string()))?;
            next.revision += 1;
            *guard = Arc::new(next);
            build_snapshot(&guard)
        };
        self.notifier.notify_state_changed(&snapshot);
        Ok(())
    }

    /// Verify the store's invariants. Used by tests after every mutation.
    ///
    /// Checks, per account: the available balance equals the last
    /// server-reported available balance minus active holds; it never drops
    /// below the overdraft limit; and a crypto account's nonce is strictly
    /// greater than the nonce of every submitted, non-failed transaction.
    pub fn check_invariants(&self) -> Result<(), String> {
        let guard = self.state.lock().expect("store lock poisoned");
        for account in guard.accounts.values() {
            let held = active_hold_total(&guard, &account.id);
            let server = guard
                .server_available
                .get(&account.id)
                .copied()
                .unwrap_or(account.available_balance + held);
            let expected = server - held;
            if account.available_balance != expected {
                return Err(format!(
                    "account {}: available {} != server {} - holds {}",
                    account.id, account.available_balance, server, held
                ));
            }
            if account.available_balance < account.overdraft_limit.neg() {
                return Err(format!(
                    "account {}: available {} below overdraft limit {}",
                    account.id, account.available_balance, account.overdraft_limit
                ));
            }
            if let Some(nonce) = account.nonce() {
                for tx in guard.transactions.values() {
                    if tx.source_account() == Some(&account.id)
                        && !matches!(
                            tx.status,
                            TransactionStatus::Failed
                                | TransactionStatus::Rejected
                                | TransactionStatus::Cancelled
                        )
                    {
                        if let Some(tx_nonce) = tx.nonce {
                            if nonce <= tx_nonce {
                                return Err(format!(
                                    "account {}: nonce {} not past submitted nonce {}",
                                    account.id, nonce, tx_nonce
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn build_snapshot(state: &StoreState) -> StoreSnapshot {
    StoreSnapshot {
        revision: state.revision,
        last_sequence: state.last_sequence,
        accounts: state.accounts.values().cloned().collect(),
        transactions: state.transactions.values().cloned().collect(),
        exchanges: state.exchanges.values().cloned().collect(),
    }
}

/// Sum of holds currently active against an account.
fn active_hold_total(state: &StoreState, account_id: &AccountId) -> Amount {
    state
        .holds
        .values()
        .filter(|h| &h.account_id == account_id)
        .fold(Amount::ZERO, |acc, h| acc + h.amount)
}

fn release_hold_available(state: &mut StoreState, hold: &Hold) {
    if let Some(account) = state.accounts.get_mut(&hold.account_id) {
        account.available_balance = account.available_balance + hold.amount;
    }
}

fn restore_hold_nonce(state: &mut StoreState, hold: &Hold, tx_nonce: Option<u64>) {
    if let Some(account) = state.accounts.get_mut(&hold.account_id) {
        if let (Some(nonce), AccountProperties::Crypto(props)) =
            (tx_nonce, &mut account.properties)
        {
            if hold.nonce_bumped && props.nonce == nonce + 1 {
                if let Some(prev) = hold.prev_nonce {
                    props.nonce = prev;
                }
            }
        }
    }
}

/// A confirmed hold settles: the spend leaves the ledger and display
/// balances while the available balance keeps its earlier deduction.
fn settle_hold(state: &mut StoreState, hold: &Hold) {
    if let Some(account) = state.accounts.get_mut(&hold.account_id) {
        account.balance = account.balance - hold.amount;
        account.ledger_balance = account.ledger_balance - hold.amount;
    }
    if let Some(server) = state.server_available.get_mut(&hold.account_id) {
        *server = *server - hold.amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_types::{
        AccountCryptoProperties, CurrencyType, TransactionAmount,
        TransactionCryptoProperties, TransactionType,
    };
    use std::collections::BTreeMap as Map;

    fn eth_account(id: &str, balance: &str, nonce: u64) -> Account {
        Account {
            id: AccountId::new(id),
            currency_type: CurrencyType::Crypto,
            currency_code: CurrencyCode::Eth,
            network: Network::Mainnet,
            account_type: AccountType::Standard,
            balance: Amount::parse(balance).unwrap(),
            ledger_balance: Amount::parse(balance).unwrap(),
            available_balance: Amount::parse(balance).unwrap(),
            overdraft_limit: Amount::ZERO,
            has_nominated_account: false,
            properties: AccountProperties::Crypto(AccountCryptoProperties {
                path: "m/44'/60'/0'/0/0".into(),
                address: "0x00000000000000000000000000000000000000aa".into(),
                direct_deposit_address: None,
                nonce,
            }),
        }
    }

    fn outgoing_tx(id: &str, account: &str, amount: &str, fee: &str, nonce: u64) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            tx_type: TransactionType::Crypto,
            currency_code: CurrencyCode::Eth,
            direction: TransactionDirection::Outgoing,
            network: Network::Mainnet,
            status: TransactionStatus::Pending,
            senders: vec![TransactionAmount {
                direction: TransactionDirection::Outgoing,
                user_id: None,
                account_id: Some(AccountId::new(account)),
                amount: Amount::parse(amount).unwrap(),
                fiat_amount: Map::new(),
                address: None,
            }],
            recipients: vec![],
            amount: Amount::parse(amount).unwrap(),
            fee: Amount::parse(fee).unwrap(),
            nonce: Some(nonce),
            metadata: None,
            submitted_at: None,
            confirmed_at: None,
            timestamp: Timestamp::new(100),
            properties: TransactionProperties::Crypto(TransactionCryptoProperties::default()),
            exchange_id: None,
        }
    }

    fn new_store() -> AccountStore {
        AccountStore::new(Arc::new(ChangeNotifier::new()))
    }

    #[test]
    fn snapshot_is_immutable_copy() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        let before = store.snapshot();
        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "1", "0.1", 0), false)
            .unwrap();
        let after = store.snapshot();

        assert_eq!(before.transactions.len(), 0);
        assert_eq!(after.transactions.len(), 1);
        assert_ne!(before.revision, after.revision);
    }

    #[test]
    fn optimistic_submission_holds_funds_and_consumes_nonce() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 5)], vec![]);

        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 5), false)
            .unwrap();

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("7.5").unwrap());
        assert_eq!(account.nonce(), Some(6));
        store.check_invariants().unwrap();
    }

    #[test]
    fn duplicate_default_nonce_rejected() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "1", "0.1", 0), false)
            .unwrap();
        let second = store.apply_optimistic_submission(outgoing_tx("t2", "a", "1", "0.1", 0), false);
        assert!(matches!(second, Err(StoreError::NonceConsumed { .. })));
    }

    #[test]
    fn explicit_nonce_override_allowed() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "1", "0.1", 0), false)
            .unwrap();
        // Replacement transaction for the same nonce, explicitly requested
        store
            .apply_optimistic_submission(outgoing_tx("t2", "a", "1", "0.2", 0), true)
            .unwrap();

        // Counter is unaffected: next default submission gets nonce 1
        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.nonce(), Some(1));
    }

    #[test]
    fn insufficient_funds_rejected_without_mutation() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "1", 0)], vec![]);
        let before = store.snapshot();

        let result =
            store.apply_optimistic_submission(outgoing_tx("t1", "a", "5", "0.1", 0), false);
        assert!(matches!(result, Err(StoreError::InsufficientFunds { .. })));

        let after = store.snapshot();
        assert_eq!(before.accounts, after.accounts);
        assert_eq!(before.transactions, after.transactions);
    }

    #[test]
    fn revert_restores_store_exactly() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 3)], vec![]);
        let before = store.snapshot();

        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 3), false)
            .unwrap();
        store.revert_optimistic(&TransactionId::new("t1")).unwrap();

        let after = store.snapshot();
        assert_eq!(before.accounts, after.accounts);
        assert_eq!(before.transactions, after.transactions);
        store.check_invariants().unwrap();
    }

    #[test]
    fn reconcile_failure_releases_hold_and_nonce() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 0), false)
            .unwrap();
        store
            .reconcile(
                &TransactionId::new("t1"),
                TransactionStatus::Failed,
                ReconcileFields::default(),
            )
            .unwrap();

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("10").unwrap());
        assert_eq!(account.nonce(), Some(0));
        // Failed transaction stays visible
        assert!(store.get_transaction(&TransactionId::new("t1")).is_some());
        store.check_invariants().unwrap();
    }

    #[test]
    fn reconcile_confirm_settles_balances() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 0), false)
            .unwrap();
        store
            .reconcile(
                &TransactionId::new("t1"),
                TransactionStatus::Confirmed,
                ReconcileFields {
                    confirmed_at: Some(Timestamp::new(200)),
                    ..Default::default()
                },
            )
            .unwrap();

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("7.5").unwrap());
        assert_eq!(account.ledger_balance, Amount::parse("7.5").unwrap());
        assert_eq!(account.balance, Amount::parse("7.5").unwrap());
        store.check_invariants().unwrap();
    }

    #[test]
    fn terminal_status_never_regresses() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);
        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "1", "0.1", 0), false)
            .unwrap();
        store
            .reconcile(
                &TransactionId::new("t1"),
                TransactionStatus::Confirmed,
                ReconcileFields::default(),
            )
            .unwrap();

        let result = store.reconcile(
            &TransactionId::new("t1"),
            TransactionStatus::Pending,
            ReconcileFields::default(),
        );
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    #[test]
    fn server_delta_is_idempotent() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        let delta = ServerDelta {
            sequence: 1,
            accounts: vec![eth_account("a", "12", 1)],
            transactions: vec![],
            exchanges: vec![],
        };
        assert!(store.apply_server_update(delta.clone()));
        let first = store.snapshot();

        assert!(!store.apply_server_update(delta));
        let second = store.snapshot();

        assert_eq!(first.accounts, second.accounts);
        assert_eq!(first.transactions, second.transactions);
        assert_eq!(first.last_sequence, second.last_sequence);
    }

    #[test]
    fn out_of_order_delta_dropped() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);

        assert!(store.apply_server_update(ServerDelta {
            sequence: 5,
            accounts: vec![eth_account("a", "20", 2)],
            transactions: vec![],
            exchanges: vec![],
        }));
        assert!(!store.apply_server_update(ServerDelta {
            sequence: 3,
            accounts: vec![eth_account("a", "999", 9)],
            transactions: vec![],
            exchanges: vec![],
        }));

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("20").unwrap());
    }

    #[test]
    fn server_update_bumps_account_revision() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);
        let id = AccountId::new("a");
        assert_eq!(store.account_server_revision(&id), 0);

        store.apply_server_update(ServerDelta {
            sequence: 1,
            accounts: vec![eth_account("a", "11", 0)],
            transactions: vec![],
            exchanges: vec![],
        });
        assert_eq!(store.account_server_revision(&id), 1);
    }

    #[test]
    fn server_update_preserves_local_holds() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);
        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 0), false)
            .unwrap();

        // Server reports a balance that does not yet reflect our pending tx
        store.apply_server_update(ServerDelta {
            sequence: 1,
            accounts: vec![eth_account("a", "10", 0)],
            transactions: vec![],
            exchanges: vec![],
        });

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("7.5").unwrap());
        // Locally-consumed nonce survives the merge
        assert_eq!(account.nonce(), Some(1));
        store.check_invariants().unwrap();
    }

    #[test]
    fn server_delta_with_account_payload_supersedes_hold() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);
        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 0), false)
            .unwrap();

        // The server confirms the spend and reports the post-spend balance
        let mut confirmed = outgoing_tx("t1", "a", "2", "0.5", 0);
        confirmed.status = TransactionStatus::Confirmed;
        store.apply_server_update(ServerDelta {
            sequence: 1,
            accounts: vec![eth_account("a", "7.5", 1)],
            transactions: vec![confirmed],
            exchanges: vec![],
        });

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("7.5").unwrap());
        assert_eq!(account.ledger_balance, Amount::parse("7.5").unwrap());
        store.check_invariants().unwrap();
    }

    #[test]
    fn server_failure_without_account_payload_releases_hold() {
        let store = new_store();
        store.load_user(vec![eth_account("a", "10", 0)], vec![]);
        store
            .apply_optimistic_submission(outgoing_tx("t1", "a", "2", "0.5", 0), false)
            .unwrap();

        let mut failed = outgoing_tx("t1", "a", "2", "0.5", 0);
        failed.status = TransactionStatus::Failed;
        store.apply_server_update(ServerDelta {
            sequence: 1,
            accounts: vec![],
            transactions: vec![failed],
            exchanges: vec![],
        });

        let account = store.get_account_by_id(&AccountId::new("a")).unwrap();
        assert_eq!(account.available_balance, Amount::parse("10").unwrap());
        assert_eq!(account.nonce(), Some(0));
        store.check_invariants().unwrap();
    }

    #[test]
    fn transactions_for_account_filters_and_sorts() {
        let store = new_store();
        store.load_user(
            vec![eth_account("a", "10", 0), eth_account("b", "10", 0)],
            vec![
                outgoing_tx("t1", "a", "1", "0.1", 0),
                outgoing_tx("t2", "b", "1", "0.1", 0),
            ],
        );

        let txs = store.transactions_for_account(&AccountId::new("a"));
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, TransactionId::new("t1"));
    }
}
