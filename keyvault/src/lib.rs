//! Encrypted mnemonic vault for the Lumo wallet engine.
//!
//! The vault stores the user's BIP39 mnemonic only in encrypted form
//! (Argon2id key derivation + AES-256-GCM). Cleartext key material exists
//! in memory only while the vault is unlocked or for the duration of a
//! single signing call, held in zeroizing containers.

pub mod error;
pub mod keys;
pub mod keystore;
pub mod mnemonic;
pub mod vault;

pub use error::VaultError;
pub use keys::{PublicKey, Signature, SigningKey};
pub use keystore::{KeystoreCrypto, KeystoreFile};
pub use mnemonic::{generate_mnemonic, seed_from_mnemonic, validate_mnemonic};
pub use vault::KeyVault;
