//! BIP39 mnemonic generation, checksum validation and seed derivation.

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::VaultError;

/// Generate a new BIP39 mnemonic with the requested word count (12 or 24).
pub fn generate_mnemonic(word_count: usize) -> Result<String, VaultError> {
    let entropy_len = match word_count {
        12 => 16,
        24 => 32,
        other => {
            return Err(VaultError::InvalidMnemonic(format!(
                "unsupported word count: {other}"
            )))
        }
    };

    let mut entropy = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut entropy[..entropy_len]);
    let mnemonic = Mnemonic::from_entropy(&entropy[..entropy_len])
        .map_err(|e| VaultError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Validate a mnemonic phrase, including its checksum.
pub fn validate_mnemonic(mnemonic: &str) -> bool {
    Mnemonic::parse_normalized(mnemonic).is_ok()
}

/// Derive the 64-byte BIP39 seed from a mnemonic phrase (empty passphrase).
///
/// The seed is the root secret for all per-currency key derivation; it is
/// returned in a zeroizing container and must never be copied out of one.
pub fn seed_from_mnemonic(mnemonic: &str) -> Result<Zeroizing<[u8; 64]>, VaultError> {
    let mnemonic = Mnemonic::parse_normalized(mnemonic)
        .map_err(|e| VaultError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_seed_normalized("")))
}
