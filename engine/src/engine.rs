//! The host-facing engine facade.
//!
//! Owns the vault, store, rate cache and notifier; gates every operation on
//! the session state machine. Any call outside its required state fails
//! with `SessionNotReady` rather than silently doing nothing.

use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use zeroize::Zeroizing;

use lumo_keyvault::{KeystoreFile, KeyVault};
use lumo_rates::{HttpRateSource, RateCache, RateSource};
use lumo_store::{
    AccountStore, ChangeNotifier, ListenerId, ServerDelta, StateListener, StoreSnapshot,
    TransactionListener,
};
use lumo_types::{
    Account, AccountId, AccountType, Amount, CurrencyCode, EngineError, Exchange, ExchangeRate,
    FeeRates, HistoricalRates, Network, Quote, TimeInterval, Timestamp, Transaction,
    TransactionId,
};

use crate::adapter::AdapterRegistry;
use crate::composer::{
    ComposeRequest, ComposedExchange, ComposedTransaction, ExchangeComposer, TransactionComposer,
};
use crate::session::SessionState;
use crate::submitter::{Submitter, Transport};

/// Host-supplied engine configuration.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Base URL of the hosted pricing feed; `None` disables rate fetching
    /// (push updates still work).
    pub rate_feed_url: Option<String>,
    pub api_key: Option<String>,
}

/// The wallet engine. One instance per host session.
pub struct WalletEngine {
    state: Mutex<SessionState>,
    vault: Mutex<Option<Arc<KeyVault>>>,
    store: Arc<AccountStore>,
    notifier: Arc<ChangeNotifier>,
    rates: Arc<RateCache>,
    adapters: Arc<AdapterRegistry>,
    transport: Arc<dyn Transport>,
    rate_source: Option<Arc<dyn RateSource>>,
}

impl WalletEngine {
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let rate_source = config.rate_feed_url.as_ref().map(|url| {
            Arc::new(HttpRateSource::new(
                url.clone(),
                config.api_key.clone().unwrap_or_default(),
            )) as Arc<dyn RateSource>
        });
        Self::with_parts(
            transport,
            Arc::new(AdapterRegistry::with_defaults()),
            rate_source,
        )
    }

    /// Constructor taking explicit adapters and rate source; used by hosts
    /// with custom network families and by tests.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        adapters: Arc<AdapterRegistry>,
        rate_source: Option<Arc<dyn RateSource>>,
    ) -> Self {
        let notifier = Arc::new(ChangeNotifier::new());
        let store = Arc::new(AccountStore::new(notifier.clone()));
        let rates = Arc::new(RateCache::new());

        // Rate pushes fan out through the same snapshot channel as store
        // mutations.
        let hook_store = store.clone();
        let hook_notifier = notifier.clone();
        rates.set_update_hook(Arc::new(move || {
            hook_notifier.notify_state_changed(&hook_store.snapshot());
        }));

        Self {
            state: Mutex::new(SessionState::SignedOut),
            vault: Mutex::new(None),
            store,
            notifier,
            rates,
            adapters,
            transport,
            rate_source,
        }
    }

    pub fn session_state(&self) -> SessionState {
        *self.state.lock().expect("session lock poisoned")
    }

    // --- session lifecycle ---

    /// Sign in with the server-provided account/transaction payload and the
    /// user's persisted keystore (if a wallet exists).
    pub fn sign_in(
        &self,
        accounts: Vec<Account>,
        transactions: Vec<Transaction>,
        keystore: Option<KeystoreFile>,
    ) -> Result<(), EngineError> {
        {
            let state = self.state.lock().expect("session lock poisoned");
            if state.is_signed_in() {
                return Err(not_ready("SignedOut", *state));
            }
        }

        self.store.load_user(accounts, transactions);
        let next = match keystore {
            Some(keystore) => {
                *self.vault.lock().expect("vault slot poisoned") =
                    Some(Arc::new(KeyVault::from_keystore(keystore)));
                SessionState::WalletLocked
            }
            None => SessionState::NoWallet,
        };
        *self.state.lock().expect("session lock poisoned") = next;
        info!(state = %next, "signed in");
        Ok(())
    }

    /// Return to `SignedOut` unconditionally: discards the vault's decrypted
    /// state, all account data and every registered listener.
    pub fn sign_out(&self) {
        if let Some(vault) = self.vault.lock().expect("vault slot poisoned").take() {
            vault.lock();
        }
        self.store.clear();
        self.rates.clear();
        self.notifier.clear();
        *self.state.lock().expect("session lock poisoned") = SessionState::SignedOut;
        info!("signed out");
    }

    /// Create a wallet from a mnemonic. The new wallet is immediately
    /// unlocked.
    pub fn create_wallet(&self, mnemonic: &str, password: &str) -> Result<(), EngineError> {
        self.require_state(SessionState::NoWallet)?;
        let vault = KeyVault::create(mnemonic, password)?;
        *self.vault.lock().expect("vault slot poisoned") = Some(Arc::new(vault));
        *self.state.lock().expect("session lock poisoned") = SessionState::WalletUnlocked;
        info!("wallet created");
        Ok(())
    }

    /// Recover a wallet from its mnemonic, re-encrypting under a new
    /// password. Ends unlocked.
    pub fn recover_wallet(&self, mnemonic: &str, password: &str) -> Result<(), EngineError> {
        {
            let state = self.state.lock().expect("session lock poisoned");
            if !matches!(*state, SessionState::NoWallet | SessionState::WalletLocked) {
                return Err(not_ready("NoWallet or WalletLocked", *state));
            }
        }
        let vault = KeyVault::recover(mnemonic, password)?;
        *self.vault.lock().expect("vault slot poisoned") = Some(Arc::new(vault));
        *self.state.lock().expect("session lock poisoned") = SessionState::WalletUnlocked;
        info!("wallet recovered");
        Ok(())
    }

    pub fn unlock_wallet(&self, password: &str) -> Result<(), EngineError> {
        self.require_state(SessionState::WalletLocked)?;
        self.vault()?.unlock(password)?;
        *self.state.lock().expect("session lock poisoned") = SessionState::WalletUnlocked;
        debug!("wallet unlocked");
        Ok(())
    }

    /// The encrypted keystore for host-side persistence.
    pub fn wallet_keystore(&self) -> Option<KeystoreFile> {
        self.vault
            .lock()
            .expect("vault slot poisoned")
            .as_ref()
            .map(|v| v.keystore().clone())
    }

    pub fn reveal_mnemonic(&self, password: &str) -> Result<Zeroizing<String>, EngineError> {
        self.require_unlocked()?;
        Ok(self.vault()?.reveal_mnemonic(password)?)
    }

    pub fn is_recovery_mnemonic(&self, mnemonic: &str) -> Result<bool, EngineError> {
        self.require_unlocked()?;
        Ok(self.vault()?.is_recovery_mnemonic(mnemonic))
    }

    // --- reads ---

    pub fn accounts(&self) -> Result<Vec<Account>, EngineError> {
        self.require_signed_in()?;
        Ok(self.store.snapshot().accounts)
    }

    pub fn get_account(
        &self,
        currency: CurrencyCode,
        network: Network,
        account_type: AccountType,
    ) -> Result<Account, EngineError> {
        self.require_signed_in()?;
        self.store
            .get_account(currency, network, account_type)
            .ok_or_else(|| {
                EngineError::AccountNotFound(format!("{currency}/{network}/{account_type:?}"))
            })
    }

    pub fn transactions(&self, account_id: &AccountId) -> Result<Vec<Transaction>, EngineError> {
        self.require_signed_in()?;
        Ok(self.store.transactions_for_account(account_id))
    }

    pub fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, EngineError> {
        self.require_signed_in()?;
        self.store
            .get_transaction(id)
            .ok_or_else(|| EngineError::Unknown(format!("transaction not found: {id}")))
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, EngineError> {
        self.require_signed_in()?;
        Ok(self.store.snapshot())
    }

    // --- composition and submission ---

    pub fn compose_transaction(
        &self,
        request: &ComposeRequest,
    ) -> Result<ComposedTransaction, EngineError> {
        self.require_unlocked()?;
        TransactionComposer::new(
            self.store.clone(),
            self.rates.clone(),
            self.adapters.clone(),
        )
        .compose(request)
    }

    pub fn compose_exchange(
        &self,
        debit_account_id: &AccountId,
        credit_account_id: &AccountId,
        quote: Quote,
        amount: Amount,
    ) -> Result<ComposedExchange, EngineError> {
        self.require_unlocked()?;
        ExchangeComposer::new(
            self.store.clone(),
            self.rates.clone(),
            self.adapters.clone(),
        )
        .compose(
            debit_account_id,
            credit_account_id,
            quote,
            amount,
            Timestamp::now(),
        )
    }

    pub async fn submit_transaction(
        &self,
        composed: ComposedTransaction,
        metadata: Option<String>,
    ) -> Result<Transaction, EngineError> {
        self.require_unlocked()?;
        self.submitter()?
            .submit_transaction(composed, metadata, Timestamp::now())
            .await
    }

    pub async fn submit_exchange(
        &self,
        composed: ComposedExchange,
    ) -> Result<Exchange, EngineError> {
        self.require_unlocked()?;
        self.submitter()?.submit_exchange(composed, Timestamp::now()).await
    }

    // --- server and rate updates ---

    /// Apply a server-pushed delta. Returns whether it was applied (`false`
    /// for duplicates and out-of-order replays).
    pub fn apply_server_update(&self, delta: ServerDelta) -> Result<bool, EngineError> {
        self.require_signed_in()?;
        Ok(self.store.apply_server_update(delta))
    }

    /// Push entry point for exchange-rate updates.
    pub fn update_exchange_rates(&self, rates: Vec<ExchangeRate>) {
        self.rates.update_exchange_rates(rates);
    }

    /// Push entry point for fee-rate updates.
    pub fn update_fee_rates(
        &self,
        fee_rates: std::collections::BTreeMap<CurrencyCode, FeeRates>,
    ) {
        self.rates.update_fee_rates(fee_rates);
    }

    pub fn exchange_rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
    ) -> Option<ExchangeRate> {
        self.rates.exchange_rate(from, to, Timestamp::now())
    }

    pub fn fee_rates(&self, currency: CurrencyCode) -> Option<FeeRates> {
        self.rates.fee_rates(currency)
    }

    /// Pull the latest exchange and fee rates from the configured source.
    pub async fn refresh_rates(&self) -> Result<(), EngineError> {
        let source = self.rate_source()?;
        let exchange_rates = source.fetch_exchange_rates().await?;
        let fee_rates = source.fetch_fee_rates().await?;
        self.rates.update_exchange_rates(exchange_rates);
        self.rates.update_fee_rates(fee_rates);
        debug!("rates refreshed");
        Ok(())
    }

    /// One-shot historical rate fetch; not part of the reactive model.
    pub async fn fetch_historical_rates(
        &self,
        interval: TimeInterval,
    ) -> Result<HistoricalRates, EngineError> {
        self.require_signed_in()?;
        let source = self.rate_source()?;
        let historical = source.fetch_historical(interval).await?;
        self.rates.update_historical(historical.clone());
        Ok(historical)
    }

    // --- listeners ---

    pub fn add_change_listener(&self, listener: StateListener) -> ListenerId {
        self.notifier.add_state_listener(listener)
    }

    pub fn remove_change_listener(&self, id: ListenerId) {
        self.notifier.remove_state_listener(id);
    }

    pub fn add_transaction_listener(
        &self,
        tx_id: TransactionId,
        listener: TransactionListener,
    ) -> ListenerId {
        self.notifier.add_transaction_listener(tx_id, listener)
    }

    pub fn remove_transaction_listener(&self, tx_id: &TransactionId, id: ListenerId) {
        self.notifier.remove_transaction_listener(tx_id, id);
    }

    // --- internals ---

    fn submitter(&self) -> Result<Submitter, EngineError> {
        Ok(Submitter::new(
            self.store.clone(),
            self.vault()?,
            self.adapters.clone(),
            self.transport.clone(),
        ))
    }

    fn vault(&self) -> Result<Arc<KeyVault>, EngineError> {
        self.vault
            .lock()
            .expect("vault slot poisoned")
            .clone()
            .ok_or(EngineError::VaultLocked)
    }

    fn rate_source(&self) -> Result<Arc<dyn RateSource>, EngineError> {
        self.rate_source
            .clone()
            .ok_or_else(|| EngineError::Unknown("no rate source configured".to_string()))
    }

    fn require_signed_in(&self) -> Result<(), EngineError> {
        let state = self.session_state();
        if state.is_signed_in() {
            Ok(())
        } else {
            Err(not_ready("SignedIn", state))
        }
    }

    fn require_unlocked(&self) -> Result<(), EngineError> {
        let state = self.session_state();
        if state.is_unlocked() {
            Ok(())
        } else {
            Err(not_ready("WalletUnlocked", state))
        }
    }

    fn require_state(&self, required: SessionState) -> Result<(), EngineError> {
        let state = self.session_state();
        if state == required {
            Ok(())
        } else {
            Err(not_ready(&required.to_string(), state))
        }
    }
}

fn not_ready(required: &str, actual: SessionState) -> EngineError {
    EngineError::SessionNotReady {
        required: required.to_string(),
        actual: actual.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submitter::{BroadcastReceipt, TransportError};
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn broadcast(
            &self,
            _network: Network,
            _payload: &[u8],
        ) -> Result<BroadcastReceipt, TransportError> {
            Ok(BroadcastReceipt { tx_hash: None })
        }
    }

    fn engine() -> WalletEngine {
        WalletEngine::new(EngineConfig::default(), Arc::new(NullTransport))
    }

    #[test]
    fn operations_gated_when_signed_out() {
        let engine = engine();
        assert_eq!(engine.session_state(), SessionState::SignedOut);

        let err = engine.accounts().unwrap_err();
        assert_eq!(err.code(), "session_not_ready");

        let err = engine
            .compose_transaction(&ComposeRequest::send(AccountId::new("a"), "0xabc", None))
            .unwrap_err();
        assert_eq!(err.code(), "session_not_ready");
    }

    #[test]
    fn sign_in_without_keystore_lands_in_no_wallet() {
        let engine = engine();
        engine.sign_in(vec![], vec![], None).unwrap();
        assert_eq!(engine.session_state(), SessionState::NoWallet);

        // Second sign-in is rejected
        let err = engine.sign_in(vec![], vec![], None).unwrap_err();
        assert_eq!(err.code(), "session_not_ready");
    }

    #[test]
    fn create_unlock_lock_cycle() {
        let engine = engine();
        engine.sign_in(vec![], vec![], None).unwrap();

        let mnemonic = lumo_keyvault::generate_mnemonic(12).unwrap();
        engine.create_wallet(&mnemonic, "hunter2").unwrap();
        assert_eq!(engine.session_state(), SessionState::WalletUnlocked);
        assert!(engine.is_recovery_mnemonic(&mnemonic).unwrap());

        let keystore = engine.wallet_keystore().unwrap();
        engine.sign_out();
        assert_eq!(engine.session_state(), SessionState::SignedOut);

        engine.sign_in(vec![], vec![], Some(keystore)).unwrap();
        assert_eq!(engine.session_state(), SessionState::WalletLocked);

        let err = engine.unlock_wallet("wrong").unwrap_err();
        assert_eq!(err.code(), "invalid_password");

        engine.unlock_wallet("hunter2").unwrap();
        assert_eq!(engine.session_state(), SessionState::WalletUnlocked);
    }

    #[test]
    fn sign_out_detaches_listeners_and_state() {
        let engine = engine();
        engine.sign_in(vec![], vec![], None).unwrap();
        engine.add_change_listener(Arc::new(|_| {}));

        engine.sign_out();
        assert_eq!(engine.session_state(), SessionState::SignedOut);
        assert!(engine.accounts().is_err());
    }
}
