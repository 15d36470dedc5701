//! Copy-on-write updates of the nested address and balance maps.
//!
//! Every level is an `Arc<BTreeMap<..>>`. An update clones only the maps on
//! the path to the changed leaf, so untouched branches stay pointer-equal to
//! the input and equality-based change detection sees no spurious change.

use std::collections::BTreeMap;
use std::sync::Arc;

/// `account_index -> address`.
pub type AccountAddresses = Arc<BTreeMap<u32, String>>;
/// `network -> account_index -> address`.
pub type NetworkAddresses = Arc<BTreeMap<String, AccountAddresses>>;
/// `wallet_id -> network -> account_index -> address`.
pub type AddressState = Arc<BTreeMap<String, NetworkAddresses>>;

/// `asset_id -> balance`.
pub type AssetBalances = Arc<BTreeMap<String, String>>;
/// `account_index -> asset_id -> balance`.
pub type AccountBalances = Arc<BTreeMap<u32, AssetBalances>>;
/// `network -> account_index -> asset_id -> balance`.
pub type NetworkBalances = Arc<BTreeMap<String, AccountBalances>>;
/// `wallet_id -> network -> account_index -> asset_id -> balance`.
pub type BalanceState = Arc<BTreeMap<String, NetworkBalances>>;

/// Returns `prev` with one address set.
///
/// If the address is already stored, `prev` itself is returned.
#[must_use]
pub fn update_address_in_state(
    prev: &AddressState,
    wallet_id: &str,
    network: &str,
    account_index: u32,
    address: &str,
) -> AddressState {
    let current = prev
        .get(wallet_id)
        .and_then(|networks| networks.get(network))
        .and_then(|accounts| accounts.get(&account_index));
    if current.is_some_and(|current| current == address) {
        return Arc::clone(prev);
    }

    let mut next = Arc::clone(prev);
    let networks = Arc::make_mut(&mut next)
        .entry(wallet_id.to_string())
        .or_default();
    let accounts = Arc::make_mut(networks)
        .entry(network.to_string())
        .or_default();
    Arc::make_mut(accounts).insert(account_index, address.to_string());
    next
}

/// Returns `prev` with one balance set.
///
/// If the balance is already stored, `prev` itself is returned.
#[must_use]
pub fn update_balance_in_state(
    prev: &BalanceState,
    wallet_id: &str,
    network: &str,
    account_index: u32,
    asset_id: &str,
    balance: &str,
) -> BalanceState {
    let current = prev
        .get(wallet_id)
        .and_then(|networks| networks.get(network))
        .and_then(|accounts| accounts.get(&account_index))
        .and_then(|assets| assets.get(asset_id));
    if current.is_some_and(|current| current == balance) {
        return Arc::clone(prev);
    }

    let mut next = Arc::clone(prev);
    let networks = Arc::make_mut(&mut next)
        .entry(wallet_id.to_string())
        .or_default();
    let accounts = Arc::make_mut(networks)
        .entry(network.to_string())
        .or_default();
    let assets = Arc::make_mut(accounts).entry(account_index).or_default();
    Arc::make_mut(assets).insert(asset_id.to_string(), balance.to_string());
    next
}

/// A level of nested state that can be walked by string keys.
pub trait StateNode {
    /// The child under `key`, if present.
    fn child(&self, key: &str) -> Option<&dyn StateNode>;

    /// The value stored at a leaf.
    fn value(&self) -> Option<&str> {
        None
    }
}

impl StateNode for String {
    fn child(&self, _key: &str) -> Option<&dyn StateNode> {
        None
    }

    fn value(&self) -> Option<&str> {
        Some(self)
    }
}

impl<V: StateNode> StateNode for BTreeMap<String, V> {
    fn child(&self, key: &str) -> Option<&dyn StateNode> {
        self.get(key).map(|node| node as &dyn StateNode)
    }
}

// Account indices arrive as path segments and are parsed back.
impl<V: StateNode> StateNode for BTreeMap<u32, V> {
    fn child(&self, key: &str) -> Option<&dyn StateNode> {
        let index = key.parse::<u32>().ok()?;
        self.get(&index).map(|node| node as &dyn StateNode)
    }
}

impl<T: StateNode + ?Sized> StateNode for Arc<T> {
    fn child(&self, key: &str) -> Option<&dyn StateNode> {
        (**self).child(key)
    }

    fn value(&self) -> Option<&str> {
        (**self).value()
    }
}

/// Reads the leaf at `path`, or `default` if any level is missing or the
/// path stops short of a leaf.
#[must_use]
pub fn get_nested_state<'a>(
    root: &'a dyn StateNode,
    path: &[&str],
    default: &'a str,
) -> &'a str {
    path.iter()
        .try_fold(root, |node, key| node.child(key))
        .and_then(|node| node.value())
        .unwrap_or(default)
}
