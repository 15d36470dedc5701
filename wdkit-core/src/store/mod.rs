//! Per-wallet address and balance cache with loading flags.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::defaults::TEMPORARY_WALLET_ID;

mod nested;
pub use nested::*;

/// Picks the wallet id that address/balance data is cached under.
///
/// `explicit`, else the active wallet, else [`TEMPORARY_WALLET_ID`].
#[must_use]
pub fn resolve_wallet_id(explicit: Option<&str>, active: Option<&str>) -> String {
    explicit
        .or(active)
        .unwrap_or(TEMPORARY_WALLET_ID)
        .to_string()
}

/// Loading-flag key for an address fetch.
#[must_use]
pub fn address_loading_key(network: &str, account_index: u32) -> String {
    format!("{network}-{account_index}")
}

/// Loading-flag key for a balance fetch.
#[must_use]
pub fn balance_loading_key(network: &str, account_index: u32, asset_id: &str) -> String {
    format!("{network}-{account_index}-{asset_id}")
}

#[derive(Debug, Default)]
struct StoreState {
    addresses: AddressState,
    balances: BalanceState,
    address_loading: BTreeMap<String, BTreeSet<String>>,
    balance_loading: BTreeMap<String, BTreeSet<String>>,
}

/// Holds the nested maps and swaps in the results of the update helpers.
///
/// Entries are created on first fetch and only removed by an explicit clear.
#[derive(Debug, Default)]
pub struct WalletDataStore {
    state: Mutex<StoreState>,
}

impl WalletDataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cached address.
    #[must_use]
    pub fn addresses(&self) -> AddressState {
        Arc::clone(&self.lock().addresses)
    }

    /// Every cached balance.
    #[must_use]
    pub fn balances(&self) -> BalanceState {
        Arc::clone(&self.lock().balances)
    }

    /// Cached addresses of one wallet.
    #[must_use]
    pub fn wallet_addresses(&self, wallet_id: &str) -> Option<NetworkAddresses> {
        self.lock().addresses.get(wallet_id).cloned()
    }

    /// Cached balances of one wallet.
    #[must_use]
    pub fn wallet_balances(&self, wallet_id: &str) -> Option<NetworkBalances> {
        self.lock().balances.get(wallet_id).cloned()
    }

    /// One cached address.
    #[must_use]
    pub fn address(&self, wallet_id: &str, network: &str, account_index: u32) -> Option<String> {
        let state = self.lock();
        let root: &dyn StateNode = &state.addresses;
        let index = account_index.to_string();
        let value = get_nested_state(root, &[wallet_id, network, index.as_str()], "");
        (!value.is_empty()).then(|| value.to_string())
    }

    /// One cached balance.
    #[must_use]
    pub fn balance(
        &self,
        wallet_id: &str,
        network: &str,
        account_index: u32,
        asset_id: &str,
    ) -> Option<String> {
        let state = self.lock();
        let root: &dyn StateNode = &state.balances;
        let index = account_index.to_string();
        let value = get_nested_state(root, &[wallet_id, network, index.as_str(), asset_id], "");
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Stores an address.
    pub fn set_address(&self, wallet_id: &str, network: &str, account_index: u32, address: &str) {
        let mut state = self.lock();
        state.addresses =
            update_address_in_state(&state.addresses, wallet_id, network, account_index, address);
    }

    /// Stores a balance.
    pub fn set_balance(
        &self,
        wallet_id: &str,
        network: &str,
        account_index: u32,
        asset_id: &str,
        balance: &str,
    ) {
        let mut state = self.lock();
        state.balances = update_balance_in_state(
            &state.balances,
            wallet_id,
            network,
            account_index,
            asset_id,
            balance,
        );
    }

    /// Flags an address fetch as running or finished.
    pub fn set_address_loading(&self, wallet_id: &str, key: &str, loading: bool) {
        set_flag(&mut self.lock().address_loading, wallet_id, key, loading);
    }

    /// Whether an address fetch is running.
    #[must_use]
    pub fn is_address_loading(&self, wallet_id: &str, key: &str) -> bool {
        self.lock()
            .address_loading
            .get(wallet_id)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Flags a balance fetch as running or finished.
    pub fn set_balance_loading(&self, wallet_id: &str, key: &str, loading: bool) {
        set_flag(&mut self.lock().balance_loading, wallet_id, key, loading);
    }

    /// Whether a balance fetch is running.
    #[must_use]
    pub fn is_balance_loading(&self, wallet_id: &str, key: &str) -> bool {
        self.lock()
            .balance_loading
            .get(wallet_id)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Drops everything.
    pub fn clear_all(&self) {
        *self.lock() = StoreState::default();
    }

    /// Drops everything cached for one wallet.
    pub fn clear_wallet(&self, wallet_id: &str) {
        let mut state = self.lock();
        if state.addresses.contains_key(wallet_id) {
            Arc::make_mut(&mut state.addresses).remove(wallet_id);
        }
        if state.balances.contains_key(wallet_id) {
            Arc::make_mut(&mut state.balances).remove(wallet_id);
        }
        state.address_loading.remove(wallet_id);
        state.balance_loading.remove(wallet_id);
    }

    /// Drops every cached address, keeping balances.
    pub fn clear_addresses(&self) {
        let mut state = self.lock();
        state.addresses = AddressState::default();
        state.address_loading.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_flag(
    flags: &mut BTreeMap<String, BTreeSet<String>>,
    wallet_id: &str,
    key: &str,
    loading: bool,
) {
    if loading {
        flags
            .entry(wallet_id.to_string())
            .or_default()
            .insert(key.to_string());
    } else if let Some(keys) = flags.get_mut(wallet_id) {
        keys.remove(key);
        if keys.is_empty() {
            flags.remove(wallet_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_wallet_id_fallbacks() {
        assert_eq!(resolve_wallet_id(Some("bob"), Some("alice")), "bob");
        assert_eq!(resolve_wallet_id(None, Some("alice")), "alice");
        assert_eq!(resolve_wallet_id(None, None), TEMPORARY_WALLET_ID);
    }

    #[test]
    fn test_loading_keys() {
        assert_eq!(address_loading_key("ethereum", 3), "ethereum-3");
        assert_eq!(balance_loading_key("ethereum", 3, "native"), "ethereum-3-native");
    }

    #[test]
    fn test_store_is_scoped_by_wallet() {
        let store = WalletDataStore::new();
        store.set_address("alice", "ethereum", 0, "0xa");
        store.set_address("bob", "ethereum", 0, "0xb");
        store.set_balance("alice", "ethereum", 0, "native", "10");

        assert_eq!(store.address("alice", "ethereum", 0).as_deref(), Some("0xa"));
        assert_eq!(store.address("bob", "ethereum", 0).as_deref(), Some("0xb"));
        assert_eq!(store.address("bob", "polygon", 0), None);
        assert_eq!(
            store.balance("alice", "ethereum", 0, "native").as_deref(),
            Some("10")
        );

        store.clear_wallet("alice");
        assert_eq!(store.address("alice", "ethereum", 0), None);
        assert_eq!(store.balance("alice", "ethereum", 0, "native"), None);
        assert_eq!(store.address("bob", "ethereum", 0).as_deref(), Some("0xb"));
    }

    #[test]
    fn test_unchanged_write_keeps_snapshot_identity() {
        let store = WalletDataStore::new();
        store.set_address("alice", "ethereum", 0, "0xa");
        let before = store.addresses();
        store.set_address("alice", "ethereum", 0, "0xa");
        assert!(Arc::ptr_eq(&before, &store.addresses()));

        store.set_address("alice", "polygon", 0, "0xp");
        let after = store.addresses();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&before["alice"]["ethereum"], &after["alice"]["ethereum"]));
    }

    #[test]
    fn test_loading_flags_and_clears() {
        let store = WalletDataStore::new();
        let key = address_loading_key("ethereum", 0);
        store.set_address_loading("alice", &key, true);
        assert!(store.is_address_loading("alice", &key));
        assert!(!store.is_address_loading("bob", &key));
        store.set_address_loading("alice", &key, false);
        assert!(!store.is_address_loading("alice", &key));

        store.set_address("alice", "ethereum", 0, "0xa");
        store.set_balance("alice", "ethereum", 0, "native", "1");
        store.clear_addresses();
        assert!(store.addresses().is_empty());
        assert_eq!(
            store.balance("alice", "ethereum", 0, "native").as_deref(),
            Some("1")
        );

        store.clear_all();
        assert!(store.balances().is_empty());
    }
}
