//! Bounded, expiring cache of per-wallet credentials.
//!
//! Entries expire a fixed time after their last write. When the cache is full
//! a new wallet evicts the entry that was touched least recently, where both
//! reads and writes count as a touch.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::SecretString;
use tokio::time::Instant;

use crate::credentials::{duplicate_secret, WalletCredentials};
use crate::defaults::{DEFAULT_CREDENTIAL_CACHE_CAPACITY, DEFAULT_CREDENTIAL_TTL};

/// A snapshot of what is cached for one wallet.
///
/// Fields populate independently as they are fetched.
#[derive(Debug)]
pub struct CachedCredentials {
    /// Encryption key, if fetched.
    pub encryption_key: Option<SecretString>,
    /// Encrypted seed, if fetched.
    pub encrypted_seed: Option<SecretString>,
    /// Encrypted entropy, if fetched.
    pub encrypted_entropy: Option<SecretString>,
    /// When the entry stops being served.
    pub expires_at: Instant,
}

impl CachedCredentials {
    /// The key and seed pair, if both are cached.
    #[must_use]
    pub fn credentials(&self) -> Option<WalletCredentials> {
        match (&self.encryption_key, &self.encrypted_seed) {
            (Some(key), Some(seed)) => Some(WalletCredentials::new(
                duplicate_secret(key),
                duplicate_secret(seed),
            )),
            _ => None,
        }
    }
}

/// Fields to merge into a cache entry. `None` leaves the cached value alone.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    /// New encryption key.
    pub encryption_key: Option<SecretString>,
    /// New encrypted seed.
    pub encrypted_seed: Option<SecretString>,
    /// New encrypted entropy.
    pub encrypted_entropy: Option<SecretString>,
}

impl CredentialUpdate {
    /// Sets the encryption key.
    #[must_use]
    pub fn encryption_key(mut self, value: SecretString) -> Self {
        self.encryption_key = Some(value);
        self
    }

    /// Sets the encrypted seed.
    #[must_use]
    pub fn encrypted_seed(mut self, value: SecretString) -> Self {
        self.encrypted_seed = Some(value);
        self
    }

    /// Sets the encrypted entropy.
    #[must_use]
    pub fn encrypted_entropy(mut self, value: SecretString) -> Self {
        self.encrypted_entropy = Some(value);
        self
    }

    /// An update carrying both halves of `credentials`.
    #[must_use]
    pub fn from_credentials(credentials: &WalletCredentials) -> Self {
        Self::default()
            .encryption_key(duplicate_secret(credentials.encryption_key()))
            .encrypted_seed(duplicate_secret(credentials.encrypted_seed()))
    }
}

#[derive(Debug)]
struct Entry {
    encryption_key: Option<SecretString>,
    encrypted_seed: Option<SecretString>,
    encrypted_entropy: Option<SecretString>,
    expires_at: Instant,
}

impl Entry {
    fn snapshot(&self) -> CachedCredentials {
        CachedCredentials {
            encryption_key: self.encryption_key.as_ref().map(duplicate_secret),
            encrypted_seed: self.encrypted_seed.as_ref().map(duplicate_secret),
            encrypted_entropy: self.encrypted_entropy.as_ref().map(duplicate_secret),
            expires_at: self.expires_at,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    access_order: HashMap<String, u64>,
    counter: u64,
}

impl Inner {
    fn touch(&mut self, wallet_id: &str) {
        self.counter += 1;
        self.access_order.insert(wallet_id.to_string(), self.counter);
    }

    fn remove(&mut self, wallet_id: &str) {
        self.entries.remove(wallet_id);
        self.access_order.remove(wallet_id);
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.remove(&id);
        }
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .keys()
            .min_by_key(|id| self.access_order.get(*id).copied().unwrap_or(0))
            .cloned()
    }
}

/// Credential cache keyed by wallet id.
#[derive(Debug)]
pub struct CredentialCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_TTL, DEFAULT_CREDENTIAL_CACHE_CAPACITY)
    }
}

impl CredentialCache {
    /// Creates a cache with the given TTL and entry bound.
    ///
    /// A bound of zero is treated as one.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Returns the entry for `wallet_id` unless it is absent or expired.
    ///
    /// An expired entry is removed as a side effect.
    pub fn get(&self, wallet_id: &str) -> Option<CachedCredentials> {
        self.get_at(wallet_id, Instant::now())
    }

    /// Merges `update` into the entry for `wallet_id` and slides its expiry.
    pub fn set(&self, wallet_id: &str, update: CredentialUpdate) {
        self.set_at(wallet_id, update, Instant::now());
    }

    /// Removes one entry, or every entry and all access tracking.
    pub fn clear(&self, wallet_id: Option<&str>) {
        let mut inner = self.lock();
        match wallet_id {
            Some(id) => inner.remove(id),
            None => *inner = Inner::default(),
        }
    }

    /// Number of stored entries, including ones that expired but were not
    /// read since.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The configured entry bound.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn get_at(&self, wallet_id: &str, now: Instant) -> Option<CachedCredentials> {
        let mut inner = self.lock();
        let expired = inner.entries.get(wallet_id)?.is_expired(now);
        if expired {
            tracing::debug!(wallet_id, "credential cache entry expired");
            inner.remove(wallet_id);
            return None;
        }
        inner.touch(wallet_id);
        inner.entries.get(wallet_id).map(Entry::snapshot)
    }

    fn set_at(&self, wallet_id: &str, update: CredentialUpdate, now: Instant) {
        let mut inner = self.lock();
        let expires_at = now + self.ttl;

        if !inner.entries.contains_key(wallet_id) {
            inner.purge_expired(now);
            if inner.entries.len() >= self.capacity {
                if let Some(evicted) = inner.least_recently_used() {
                    tracing::debug!(wallet_id = %evicted, "evicting least recently used credentials");
                    inner.remove(&evicted);
                }
            }
        }

        let entry = inner
            .entries
            .entry(wallet_id.to_string())
            .or_insert_with(|| Entry {
                encryption_key: None,
                encrypted_seed: None,
                encrypted_entropy: None,
                expires_at,
            });
        if let Some(key) = update.encryption_key {
            entry.encryption_key = Some(key);
        }
        if let Some(seed) = update.encrypted_seed {
            entry.encrypted_seed = Some(seed);
        }
        if let Some(entropy) = update.encrypted_entropy {
            entry.encrypted_entropy = Some(entropy);
        }
        entry.expires_at = expires_at;
        inner.touch(wallet_id);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
