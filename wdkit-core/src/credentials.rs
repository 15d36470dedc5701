//! Secret material needed to initialize a wallet inside the worklet.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Copies a secret into a fresh allocation.
pub(crate) fn duplicate_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

/// Constant-time equality over two secrets.
pub(crate) fn secrets_equal(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret()
        .as_bytes()
        .ct_eq(b.expose_secret().as_bytes())
        .into()
}

/// An encryption key together with the seed it decrypts.
#[derive(Debug)]
pub struct WalletCredentials {
    encryption_key: SecretString,
    encrypted_seed: SecretString,
}

impl WalletCredentials {
    /// Creates a credential pair.
    #[must_use]
    pub const fn new(encryption_key: SecretString, encrypted_seed: SecretString) -> Self {
        Self {
            encryption_key,
            encrypted_seed,
        }
    }

    /// The encryption key.
    #[must_use]
    pub const fn encryption_key(&self) -> &SecretString {
        &self.encryption_key
    }

    /// The encrypted seed.
    #[must_use]
    pub const fn encrypted_seed(&self) -> &SecretString {
        &self.encrypted_seed
    }

    /// Whether both halves equal `other`'s, compared in constant time.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        // Evaluate both halves regardless of the first result.
        let key = secrets_equal(&self.encryption_key, &other.encryption_key);
        let seed = secrets_equal(&self.encrypted_seed, &other.encrypted_seed);
        key & seed
    }

    /// Copies the pair.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            encryption_key: duplicate_secret(&self.encryption_key),
            encrypted_seed: duplicate_secret(&self.encrypted_seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(key: &str, seed: &str) -> WalletCredentials {
        WalletCredentials::new(
            SecretString::from(key.to_string()),
            SecretString::from(seed.to_string()),
        )
    }

    #[test]
    fn test_matches_requires_both_halves() {
        let a = creds("key-a", "seed-a");
        assert!(a.matches(&creds("key-a", "seed-a")));
        assert!(!a.matches(&creds("key-a", "seed-b")));
        assert!(!a.matches(&creds("key-b", "seed-a")));
        assert!(a.matches(&a.duplicate()));
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let rendered = format!("{:?}", creds("super-secret-key", "super-secret-seed"));
        assert!(!rendered.contains("super-secret"));
    }
}
