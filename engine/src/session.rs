//! Session state machine gating every engine operation.

use std::fmt;

/// Session lifecycle state.
///
/// `SignedOut → NoWallet | WalletLocked → WalletUnlocked`. Creating or
/// recovering a wallet moves straight to `WalletUnlocked`; signing out
/// returns to `SignedOut` unconditionally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    /// Signed in, no wallet exists for this user yet.
    NoWallet,
    /// Signed in, wallet exists but the vault is locked.
    WalletLocked,
    /// Signed in, vault unlocked; composition and submission available.
    WalletUnlocked,
}

impl SessionState {
    /// Any state other than `SignedOut`.
    pub fn is_signed_in(&self) -> bool {
        !matches!(self, Self::SignedOut)
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, Self::WalletUnlocked)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SignedOut => "SignedOut",
            Self::NoWallet => "NoWallet",
            Self::WalletLocked => "WalletLocked",
            Self::WalletUnlocked => "WalletUnlocked",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_in_covers_all_but_signed_out() {
        assert!(!SessionState::SignedOut.is_signed_in());
        assert!(SessionState::NoWallet.is_signed_in());
        assert!(SessionState::WalletLocked.is_signed_in());
        assert!(SessionState::WalletUnlocked.is_signed_in());
    }

    #[test]
    fn only_unlocked_state_is_unlocked() {
        assert!(SessionState::WalletUnlocked.is_unlocked());
        assert!(!SessionState::WalletLocked.is_unlocked());
    }
}
