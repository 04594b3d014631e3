//! Signing key and signature types.

use ed25519_dalek::{Signer, Verifier, VerifyingKey};
use zeroize::{Zeroize, Zeroizing};

/// A 32-byte derived signing key.
///
/// This type intentionally does not implement `Debug`, `Serialize` or
/// `Clone` to prevent accidental exposure. Key bytes are zeroized on drop.
pub struct SigningKey {
    secret: Zeroizing<[u8; 32]>,
}

impl SigningKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: Zeroizing::new(bytes),
        }
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The Ed25519 public key corresponding to this signing key.
    pub fn public_key(&self) -> PublicKey {
        let signing = ed25519_dalek::SigningKey::from_bytes(&self.secret);
        PublicKey(signing.verifying_key().to_bytes())
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// A 32-byte Ed25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Sign a payload with a derived key, returning the signature.
pub fn sign_payload(payload: &[u8], key: &SigningKey) -> Signature {
    let signing = ed25519_dalek::SigningKey::from_bytes(key.secret_bytes());
    Signature(signing.sign(payload).to_bytes())
}

/// Verify a signature against a payload and public key.
pub fn verify_payload(payload: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying.verify(payload, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = SigningKey::from_bytes([7u8; 32]);
        let sig = sign_payload(b"payload", &key);
        assert!(verify_payload(b"payload", &sig, &key.public_key()));
    }

    #[test]
    fn wrong_payload_fails() {
        let key = SigningKey::from_bytes([7u8; 32]);
        let sig = sign_payload(b"payload", &key);
        assert!(!verify_payload(b"other", &sig, &key.public_key()));
    }

    #[test]
    fn wrong_key_fails() {
        let key = SigningKey::from_bytes([7u8; 32]);
        let other = SigningKey::from_bytes([8u8; 32]);
        let sig = sign_payload(b"payload", &key);
        assert!(!verify_payload(b"payload", &sig, &other.public_key()));
    }

    #[test]
    fn signature_deterministic() {
        let key = SigningKey::from_bytes([9u8; 32]);
        let s1 = sign_payload(b"msg", &key);
        let s2 = sign_payload(b"msg", &key);
        assert_eq!(s1, s2);
    }
}
