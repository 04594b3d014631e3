//! Signing, broadcast and reconciliation of composed descriptors.
//!
//! The submitter re-validates staleness, signs through the vault, inserts
//! an optimistic pending transaction (the point at which the nonce is
//! consumed), hands the payload to the transport and reconciles the
//! outcome. A rejection before broadcast rolls the store back exactly; a
//! timeout leaves the entry pending because the engine can never be sure an
//! unconfirmed broadcast did not land.

use async_trait::async_trait;
use blake2::{Blake2b512, Digest};
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use lumo_keyvault::KeyVault;
use lumo_store::{AccountStore, ReconcileFields};
use lumo_types::{
    Account, Amount, EngineError, Exchange, ExchangeId, ExchangeStatus, Network, Timestamp,
    Transaction, TransactionAmount, TransactionCryptoProperties, TransactionDirection,
    TransactionFiatProperties, TransactionId, TransactionProperties, TransactionStatus,
    TransactionType,
};

use crate::adapter::AdapterRegistry;
use crate::composer::{ComposedExchange, ComposedTransaction};

/// Transport-level failure modes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The network refused the payload (double-spend, underpriced fee,
    /// node-rejected). The transaction did not enter the network.
    #[error("rejected: {0}")]
    Rejected(String),

    /// No response in time; the outcome is unknown.
    #[error("timed out")]
    Timeout,
}

/// Result of a successful broadcast.
#[derive(Clone, Debug)]
pub struct BroadcastReceipt {
    pub tx_hash: Option<String>,
}

/// Broadcasts signed payloads to a network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn broadcast(
        &self,
        network: Network,
        payload: &[u8],
    ) -> Result<BroadcastReceipt, TransportError>;
}

/// Signs and submits composed transactions and exchanges.
pub struct Submitter {
    store: Arc<AccountStore>,
    vault: Arc<KeyVault>,
    adapters: Arc<AdapterRegistry>,
    transport: Arc<dyn Transport>,
}

impl Submitter {
    pub fn new(
        store: Arc<AccountStore>,
        vault: Arc<KeyVault>,
        adapters: Arc<AdapterRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            vault,
            adapters,
            transport,
        }
    }

    /// Submit a composed transaction. Returns the pending (or hash-carrying)
    /// transaction on success; post-broadcast outcomes arrive later through
    /// the change-notification channel.
    pub async fn submit_transaction(
        &self,
        mut composed: ComposedTransaction,
        metadata: Option<String>,
        now: Timestamp,
    ) -> Result<Transaction, EngineError> {
        let account_id = composed.account.id.clone();
        let current = self.store.account_server_revision(&account_id);
        if current != composed.account_revision {
            return Err(EngineError::StaleComposition(account_id.to_string()));
        }

        if composed.signed_payload.is_none() {
            composed.signed_payload = Some(self.sign_descriptor(&composed)?);
        }
        let payload = composed
            .signed_payload
            .clone()
            .unwrap_or_default();

        let tx = build_pending_transaction(
            &composed,
            TransactionDirection::Outgoing,
            metadata,
            None,
            now,
        );
        let tx_id = tx.id.clone();
        self.store
            .apply_optimistic_submission(tx.clone(), composed.explicit_nonce)?;

        match self
            .transport
            .broadcast(composed.account.network, &payload)
            .await
        {
            Ok(receipt) => {
                info!(%tx_id, tx_hash = ?receipt.tx_hash, "transaction broadcast");
                let tx = self.store.reconcile(
                    &tx_id,
                    TransactionStatus::Pending,
                    ReconcileFields {
                        tx_hash: receipt.tx_hash,
                        submitted_at: Some(now),
                        confirmed_at: None,
                    },
                )?;
                Ok(tx)
            }
            Err(TransportError::Rejected(reason)) => {
                warn!(%tx_id, %reason, "broadcast rejected, rolling back");
                self.store.revert_optimistic(&tx_id)?;
                Err(EngineError::TransportRejected(reason))
            }
            // Outcome unknown: the entry stays pending, callers poll/observe
            Err(TransportError::Timeout) => {
                warn!(%tx_id, "broadcast timed out, leaving transaction pending");
                Ok(tx)
            }
        }
    }

    /// Submit an exchange: two correlated legs under one exchange identity.
    ///
    /// Both legs roll back if either fails before any broadcast. A credit
    /// rejection after the debit leg was broadcast cannot be rolled back
    /// and escalates to `PartialExchangeFailure`.
    pub async fn submit_exchange(
        &self,
        composed: ComposedExchange,
        now: Timestamp,
    ) -> Result<Exchange, EngineError> {
        if composed.quote.has_expired(now) {
            return Err(EngineError::QuoteExpired(composed.quote.id.to_string()));
        }

        let debit_id = composed.debit_account.id.clone();
        let credit_id = composed.credit_account.id.clone();
        if self.store.account_server_revision(&debit_id) != composed.debit_revision {
            return Err(EngineError::StaleComposition(debit_id.to_string()));
        }
        if self.store.account_server_revision(&credit_id) != composed.credit_revision {
            return Err(EngineError::StaleComposition(credit_id.to_string()));
        }

        let exchange_id = ExchangeId::new(new_id("ex"));

        let debit_descriptor = ComposedTransaction {
            tx_type: TransactionType::Exchange,
            account: composed.debit_account.clone(),
            destination: deposit_address(&composed.credit_account),
            amount: composed.amount,
            data: None,
            fee: composed.debit_fee,
            gas_price: None,
            gas_limit: None,
            nonce: composed.debit_nonce,
            explicit_nonce: false,
            account_revision: composed.debit_revision,
            signed_payload: None,
        };
        let debit_payload = self.sign_descriptor(&debit_descriptor)?;
        let mut debit_tx = build_pending_transaction(
            &debit_descriptor,
            TransactionDirection::Outgoing,
            None,
            Some(exchange_id.clone()),
            now,
        );
        debit_tx.recipients = vec![party(
            &composed.credit_account,
            composed.return_amount,
            TransactionDirection::Incoming,
        )];

        let credit_descriptor = ComposedTransaction {
            tx_type: TransactionType::Exchange,
            account: composed.credit_account.clone(),
            destination: None,
            amount: composed.return_amount,
            data: None,
            fee: Amount::ZERO,
            gas_price: None,
            gas_limit: None,
            nonce: None,
            explicit_nonce: false,
            account_revision: composed.credit_revision,
            signed_payload: None,
        };
        let adapter = self
            .adapters
            .for_family(composed.credit_account.currency_code.network_family())?;
        let credit_payload = adapter.build_unsigned_payload(&credit_descriptor)?;
        let mut credit_tx = build_pending_transaction(
            &credit_descriptor,
            TransactionDirection::Incoming,
            None,
            Some(exchange_id.clone()),
            now,
        );
        credit_tx.senders = vec![party(
            &composed.debit_account,
            composed.amount,
            TransactionDirection::Outgoing,
        )];

        let exchange = Exchange {
            id: exchange_id.clone(),
            status: ExchangeStatus::Pending,
            debit_account_id: debit_id.clone(),
            credit_account_id: credit_id,
            quote: composed.quote.clone(),
            debit_transaction_id: Some(debit_tx.id.clone()),
            credit_transaction_id: Some(credit_tx.id.clone()),
            amount: composed.amount,
            return_amount: composed.return_amount,
            exchange_fee: composed.exchange_fee,
            submitted_at: None,
            confirmed_at: None,
            timestamp: now,
        };
        self.store.insert_exchange(exchange.clone());

        if let Err(err) = self
            .store
            .apply_optimistic_submission(debit_tx.clone(), false)
        {
            self.store.revert_exchange(&exchange_id)?;
            return Err(err.into());
        }
        if let Err(err) = self
            .store
            .apply_optimistic_submission(credit_tx.clone(), false)
        {
            self.store.revert_optimistic(&debit_tx.id)?;
            self.store.revert_exchange(&exchange_id)?;
            return Err(err.into());
        }

        match self
            .transport
            .broadcast(composed.debit_account.network, &debit_payload)
            .await
        {
            Ok(receipt) => {
                self.store.reconcile(
                    &debit_tx.id,
                    TransactionStatus::Pending,
                    ReconcileFields {
                        tx_hash: receipt.tx_hash,
                        submitted_at: Some(now),
                        confirmed_at: None,
                    },
                )?;
            }
            // Nothing reached the network: full rollback
            Err(TransportError::Rejected(reason)) => {
                warn!(%exchange_id, %reason, "debit leg rejected, rolling back exchange");
                self.store.revert_optimistic(&credit_tx.id)?;
                self.store.revert_optimistic(&debit_tx.id)?;
                self.store.revert_exchange(&exchange_id)?;
                return Err(EngineError::TransportRejected(reason));
            }
            Err(TransportError::Timeout) => {
                warn!(%exchange_id, "debit leg timed out, exchange left pending");
                return Ok(exchange);
            }
        }

        match self
            .transport
            .broadcast(composed.credit_account.network, &credit_payload)
            .await
        {
            Ok(receipt) => {
                self.store.reconcile(
                    &credit_tx.id,
                    TransactionStatus::Pending,
                    ReconcileFields {
                        tx_hash: receipt.tx_hash,
                        submitted_at: Some(now),
                        confirmed_at: None,
                    },
                )?;
                let exchange = self
                    .store
                    .update_exchange_status(&exchange_id, ExchangeStatus::Deposited)?;
                info!(%exchange_id, "exchange submitted");
                Ok(exchange)
            }
            // The debit leg is already on the network; this cannot be
            // rolled back automatically
            Err(TransportError::Rejected(reason)) => {
                warn!(
                    %exchange_id,
                    %reason,
                    "credit leg rejected after debit broadcast, partial failure"
                );
                self.store.reconcile(
                    &credit_tx.id,
                    TransactionStatus::Failed,
                    ReconcileFields::default(),
                )?;
                self.store
                    .update_exchange_status(&exchange_id, ExchangeStatus::PartialFailure)?;
                Err(EngineError::PartialExchangeFailure(exchange_id.to_string()))
            }
            Err(TransportError::Timeout) => {
                warn!(%exchange_id, "credit leg timed out, exchange left pending");
                Ok(self.store.get_exchange(&exchange_id).unwrap_or(exchange))
            }
        }
    }

    /// Encode and sign a descriptor. Crypto accounts sign with the key at
    /// the account's derivation path; fiat descriptors pass through
    /// unsigned, the provider authenticates the session instead.
    fn sign_descriptor(&self, composed: &ComposedTransaction) -> Result<Vec<u8>, EngineError> {
        let adapter = self
            .adapters
            .for_family(composed.account.currency_code.network_family())?;
        let payload = adapter.build_unsigned_payload(composed)?;
        match composed.account.crypto_properties() {
            Some(props) => {
                let key = self
                    .vault
                    .derive_key(composed.account.currency_code, &props.path)?;
                let signature = self.vault.sign(&payload, &key);
                let mut signed = payload;
                signed.extend_from_slice(signature.as_bytes());
                Ok(signed)
            }
            None => Ok(payload),
        }
    }
}

/// Engine-assigned identifier: blake2 over fresh entropy, hex-encoded.
fn new_id(prefix: &str) -> String {
    let mut entropy = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut entropy);
    let digest = Blake2b512::digest(entropy);
    format!("{}-{}", prefix, hex::encode(&digest[..16]))
}

fn deposit_address(account: &Account) -> Option<String> {
    account.crypto_properties().map(|p| {
        p.direct_deposit_address
            .clone()
            .unwrap_or_else(|| p.address.clone())
    })
}

fn party(
    account: &Account,
    amount: Amount,
    direction: TransactionDirection,
) -> TransactionAmount {
    TransactionAmount {
        direction,
        user_id: None,
        account_id: Some(account.id.clone()),
        amount,
        fiat_amount: Default::default(),
        address: account.crypto_properties().map(|p| p.address.clone()),
    }
}

fn build_pending_transaction(
    composed: &ComposedTransaction,
    direction: TransactionDirection,
    metadata: Option<String>,
    exchange_id: Option<ExchangeId>,
    now: Timestamp,
) -> Transaction {
    let account = &composed.account;
    let sender = TransactionAmount {
        direction: TransactionDirection::Outgoing,
        user_id: None,
        account_id: Some(account.id.clone()),
        amount: composed.amount,
        fiat_amount: Default::default(),
        address: account.crypto_properties().map(|p| p.address.clone()),
    };
    let recipient = TransactionAmount {
        direction: TransactionDirection::Incoming,
        user_id: None,
        account_id: None,
        amount: composed.amount,
        fiat_amount: Default::default(),
        address: composed.destination.clone(),
    };

    let properties = match account.crypto_properties() {
        Some(props) => TransactionProperties::Crypto(TransactionCryptoProperties {
            tx_hash: None,
            nonce: composed.nonce,
            from_address: Some(props.address.clone()),
            to_address: composed.destination.clone(),
            data: composed.data.clone(),
            gas_price: composed.gas_price,
            gas_limit: composed.gas_limit,
            fiat_fee: Default::default(),
            fiat_amount: Default::default(),
        }),
        None => TransactionProperties::Fiat(TransactionFiatProperties {
            from_fiat_account: account.fiat_properties().cloned(),
            to_fiat_account: None,
        }),
    };

    let (senders, recipients) = match direction {
        TransactionDirection::Incoming => (Vec::new(), vec![sender]),
        _ => (vec![sender], vec![recipient]),
    };

    Transaction {
        id: TransactionId::new(new_id("tx")),
        tx_type: composed.tx_type,
        currency_code: account.currency_code,
        direction,
        network: account.network,
        status: TransactionStatus::Pending,
        senders,
        recipients,
        amount: composed.amount,
        fee: composed.fee,
        nonce: composed.nonce,
        metadata,
        submitted_at: None,
        confirmed_at: None,
        timestamp: now,
        properties,
        exchange_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = new_id("tx");
        let b = new_id("tx");
        assert_ne!(a, b);
        assert!(a.starts_with("tx-"));
        assert_eq!(a.len(), 3 + 32);
    }
}
