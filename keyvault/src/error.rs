use thiserror::Error;

use lumo_types::EngineError;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("vault is locked")]
    Locked,

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("key derivation error: {0}")]
    Derivation(String),
}

impl From<VaultError> for EngineError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidPassword => EngineError::InvalidPassword,
            VaultError::InvalidMnemonic(reason) => EngineError::InvalidMnemonic(reason),
            VaultError::Locked => EngineError::VaultLocked,
            VaultError::Keystore(reason) | VaultError::Derivation(reason) => {
                EngineError::Unknown(reason)
            }
        }
    }
}
