//! Argon2id + AES-256-GCM encrypted keystore for the wallet mnemonic.
//!
//! Encrypts the mnemonic phrase with a user-chosen password:
//! 1. Argon2id derives a 32-byte encryption key from the password + random salt
//! 2. AES-256-GCM encrypts the mnemonic bytes with a random nonce
//! 3. The result is stored as a JSON document with all parameters for future
//!    decryption, plus a seed fingerprint for recovery-mnemonic checks

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::VaultError;

/// Argon2id parameters: 64 MB memory, 3 iterations, 1 lane of parallelism.
const ARGON2_MEMORY_KIB: u32 = 65536; // 64 MB
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

/// Salt length in bytes.
const SALT_LEN: usize = 32;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;

/// The top-level keystore structure, serializable to/from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub version: u32,
    pub crypto: KeystoreCrypto,
    /// Hex-encoded SHA-256 of the BIP39 seed. Used to check whether a
    /// candidate mnemonic recovers this wallet without decrypting anything.
    pub seed_fingerprint: String,
}

/// The crypto section of the keystore, containing all encryption parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

/// KDF parameters for Argon2id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Compute the hex fingerprint of a BIP39 seed.
pub fn seed_fingerprint(seed: &[u8; 64]) -> String {
    hex::encode(Sha256::digest(seed))
}

/// Encrypt a mnemonic phrase with a password using Argon2id + AES-256-GCM.
pub fn encrypt_keystore(
    mnemonic: &str,
    seed: &[u8; 64],
    password: &str,
) -> Result<KeystoreFile, VaultError> {
    let mut rng = rand::thread_rng();

    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let derived_key = derive_key(password, &salt)?;

    let cipher = Aes256Gcm::new_from_slice(derived_key.as_ref())
        .map_err(|e| VaultError::Keystore(format!("AES key init failed: {e}")))?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, mnemonic.as_bytes())
        .map_err(|e| VaultError::Keystore(format!("encryption failed: {e}")))?;

    Ok(KeystoreFile {
        version: 1,
        crypto: KeystoreCrypto {
            cipher: "aes-256-gcm".to_string(),
            kdf: "argon2id".to_string(),
            kdf_params: KdfParams {
                memory: ARGON2_MEMORY_KIB,
                iterations: ARGON2_ITERATIONS,
                parallelism: ARGON2_PARALLELISM,
            },
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(&ciphertext),
        },
        seed_fingerprint: seed_fingerprint(seed),
    })
}

/// Decrypt a keystore with the given password, returning the mnemonic.
///
/// A failed authentication check maps to `InvalidPassword`: with AES-GCM
/// there is no way to distinguish a wrong password from corrupted data.
pub fn decrypt_keystore(
    keystore: &KeystoreFile,
    password: &str,
) -> Result<Zeroizing<String>, VaultError> {
    if keystore.version != 1 {
        return Err(VaultError::Keystore(format!(
            "unsupported keystore version: {}",
            keystore.version
        )));
    }

    let salt = hex::decode(&keystore.crypto.salt)
        .map_err(|e| VaultError::Keystore(format!("invalid salt hex: {e}")))?;
    let nonce_bytes = hex::decode(&keystore.crypto.nonce)
        .map_err(|e| VaultError::Keystore(format!("invalid nonce hex: {e}")))?;
    let ciphertext = hex::decode(&keystore.crypto.ciphertext)
        .map_err(|e| VaultError::Keystore(format!("invalid ciphertext hex: {e}")))?;

    if nonce_bytes.len() != NONCE_LEN {
        return Err(VaultError::Keystore(format!(
            "invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let derived_key = derive_key(password, &salt)?;

    let cipher = Aes256Gcm::new_from_slice(derived_key.as_ref())
        .map_err(|e| VaultError::Keystore(format!("AES key init failed: {e}")))?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| VaultError::InvalidPassword)?,
    );

    String::from_utf8(plaintext.to_vec())
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Keystore("decrypted mnemonic is not valid UTF-8".to_string()))
}

/// Save a keystore to a JSON file.
pub fn save_keystore(keystore: &KeystoreFile, path: &Path) -> Result<(), VaultError> {
    let json = serde_json::to_string_pretty(keystore)
        .map_err(|e| VaultError::Keystore(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| VaultError::Keystore(format!("failed to write keystore file: {e}")))?;
    Ok(())
}

/// Load a keystore from a JSON file.
pub fn load_keystore(path: &Path) -> Result<KeystoreFile, VaultError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| VaultError::Keystore(format!("failed to read keystore file: {e}")))?;
    let keystore: KeystoreFile = serde_json::from_str(&json)
        .map_err(|e| VaultError::Keystore(format!("invalid keystore JSON: {e}")))?;
    Ok(keystore)
}

/// Derive a 32-byte key from a password and salt using Argon2id.
fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(|e| VaultError::Keystore(format!("Argon2 params error: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, output.as_mut())
        .map_err(|e| VaultError::Keystore(format!("Argon2 hashing failed: {e}")))?;

    Ok(output)
}
