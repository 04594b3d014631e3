//! The key vault: unlock lifecycle and per-currency key derivation.
//!
//! Derivation uses HMAC-SHA512 keyed by `"<currency>:<path>"` over the BIP39
//! seed, taking the first 32 bytes of the output as the signing key. The
//! seed is held in memory only while the vault is unlocked.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use lumo_types::CurrencyCode;

use crate::error::VaultError;
use crate::keys::{sign_payload, Signature, SigningKey};
use crate::keystore::{decrypt_keystore, encrypt_keystore, seed_fingerprint, KeystoreFile};
use crate::mnemonic::{seed_from_mnemonic, validate_mnemonic};

type HmacSha512 = Hmac<Sha512>;

/// Holds the encrypted mnemonic and, while unlocked, the derived seed.
pub struct KeyVault {
    keystore: KeystoreFile,
    unlocked: Mutex<Option<Zeroizing<[u8; 64]>>>,
}

impl KeyVault {
    /// Create a vault for a fresh wallet. Validates the mnemonic checksum,
    /// encrypts it under `password` and leaves the vault unlocked.
    pub fn create(mnemonic: &str, password: &str) -> Result<Self, VaultError> {
        if !validate_mnemonic(mnemonic) {
            return Err(VaultError::InvalidMnemonic(
                "checksum validation failed".to_string(),
            ));
        }
        let seed = seed_from_mnemonic(mnemonic)?;
        let keystore = encrypt_keystore(mnemonic, &seed, password)?;
        info!("created wallet vault");
        Ok(Self {
            keystore,
            unlocked: Mutex::new(Some(seed)),
        })
    }

    /// Recover a wallet from its mnemonic, re-encrypting under a new
    /// password. Same contract as `create`; the vault ends up unlocked.
    pub fn recover(mnemonic: &str, password: &str) -> Result<Self, VaultError> {
        let vault = Self::create(mnemonic, password)?;
        info!("recovered wallet vault");
        Ok(vault)
    }

    /// Wrap an existing keystore. The vault starts locked.
    pub fn from_keystore(keystore: KeystoreFile) -> Self {
        Self {
            keystore,
            unlocked: Mutex::new(None),
        }
    }

    /// The encrypted keystore, safe to persist.
    pub fn keystore(&self) -> &KeystoreFile {
        &self.keystore
    }

    /// Decrypt the mnemonic and hold the derived seed in memory.
    pub fn unlock(&self, password: &str) -> Result<(), VaultError> {
        let mnemonic = decrypt_keystore(&self.keystore, password)?;
        let seed = seed_from_mnemonic(&mnemonic)?;
        *self.unlocked.lock().expect("vault lock poisoned") = Some(seed);
        debug!("vault unlocked");
        Ok(())
    }

    /// Discard the decrypted seed. Idempotent.
    pub fn lock(&self) {
        *self.unlocked.lock().expect("vault lock poisoned") = None;
        debug!("vault locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.lock().expect("vault lock poisoned").is_some()
    }

    /// Decrypt and return the mnemonic. Always requires the password, even
    /// while unlocked.
    pub fn reveal_mnemonic(&self, password: &str) -> Result<Zeroizing<String>, VaultError> {
        decrypt_keystore(&self.keystore, password)
    }

    /// Whether `mnemonic` is the recovery phrase for this wallet. Compares
    /// seed fingerprints; an invalid mnemonic is simply not a match.
    pub fn is_recovery_mnemonic(&self, mnemonic: &str) -> bool {
        match seed_from_mnemonic(mnemonic) {
            Ok(seed) => seed_fingerprint(&seed) == self.keystore.seed_fingerprint,
            Err(_) => false,
        }
    }

    /// Derive the signing key for a currency account. Only callable while
    /// unlocked.
    pub fn derive_key(
        &self,
        currency: CurrencyCode,
        path: &str,
    ) -> Result<SigningKey, VaultError> {
        let guard = self.unlocked.lock().expect("vault lock poisoned");
        let seed = guard.as_ref().ok_or(VaultError::Locked)?;

        let context = format!("{currency}:{path}");
        let mut mac = HmacSha512::new_from_slice(context.as_bytes())
            .map_err(|e| VaultError::Derivation(e.to_string()))?;
        mac.update(seed.as_ref());
        let output = mac.finalize().into_bytes();

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&output[..32]);
        Ok(SigningKey::from_bytes(secret))
    }

    /// Sign a payload with a derived key.
    pub fn sign(&self, payload: &[u8], key: &SigningKey) -> Signature {
        sign_payload(payload, key)
    }
}
