//! Address and balance reads backed by the keyed store.

use std::sync::Arc;

use crate::defaults::TEMPORARY_WALLET_ID;
use crate::error::{RpcError, WdkError, WdkResult};
use crate::lifecycle::WorkletLifecycle;
use crate::store::{address_loading_key, balance_loading_key, resolve_wallet_id, WalletDataStore};
use crate::transport::CallMethodRequest;
use crate::validation::{
    validate_account_index, validate_asset_id, validate_network, validate_wallet_id,
    NATIVE_ASSET,
};
use crate::wallet_state::WalletSelection;

/// Reads account data from the initialized worklet, caching it per wallet.
#[derive(Debug, Clone)]
pub struct AccountService {
    lifecycle: Arc<WorkletLifecycle>,
    selection: Arc<WalletSelection>,
    store: Arc<WalletDataStore>,
}

impl AccountService {
    pub(crate) const fn new(
        lifecycle: Arc<WorkletLifecycle>,
        selection: Arc<WalletSelection>,
        store: Arc<WalletDataStore>,
    ) -> Self {
        Self {
            lifecycle,
            selection,
            store,
        }
    }

    /// The address of `account_index` on `network`.
    ///
    /// Served from the store when cached; fetched from the worklet otherwise.
    ///
    /// # Errors
    ///
    /// - [`WdkError::Validation`] for malformed inputs.
    /// - [`WdkError::NotInitialized`] if the worklet has no wallet, or the
    ///   requested wallet is not the active one.
    /// - [`WdkError::Superseded`] if the active wallet changed while the call
    ///   was in flight. Nothing is cached.
    /// - [`WdkError::Transport`] if the call fails or returns garbage.
    pub async fn address(
        &self,
        network: &str,
        account_index: u32,
        wallet_id: Option<&str>,
    ) -> WdkResult<String> {
        validate_network(network)?;
        validate_account_index(account_index)?;
        let wallet_id = self.scope(wallet_id)?;

        if let Some(address) = self.store.address(&wallet_id, network, account_index) {
            return Ok(address);
        }
        self.ensure_active(&wallet_id)?;

        let key = address_loading_key(network, account_index);
        let _flag = LoadingFlag::address(&self.store, &wallet_id, &key);
        let result = self
            .fetch(
                &wallet_id,
                CallMethodRequest {
                    method_name: "getAddress".to_string(),
                    network: network.to_string(),
                    account_index,
                    args: None,
                },
            )
            .await?;
        let address: String = serde_json::from_str(&result)
            .map_err(|err| WdkError::transport("accounts", "getAddress", err))?;

        self.store
            .set_address(&wallet_id, network, account_index, &address);
        Ok(address)
    }

    /// The balance of `asset_id` (or [`NATIVE_ASSET`]) as a decimal string.
    ///
    /// Balances are unsigned integers in the asset's smallest unit. The
    /// worklet may report one as a JSON integer or as a string of decimal
    /// digits; leading zeros are dropped.
    ///
    /// # Errors
    ///
    /// - [`WdkError::Validation`] for malformed inputs.
    /// - [`WdkError::NotInitialized`] if the worklet has no wallet, or the
    ///   requested wallet is not the active one.
    /// - [`WdkError::Superseded`] if the active wallet changed while the call
    ///   was in flight. Nothing is cached.
    /// - [`WdkError::Transport`] if the call fails, or the worklet reports a
    ///   fraction, a negative number, an exponent or a hex string.
    pub async fn balance(
        &self,
        network: &str,
        account_index: u32,
        asset_id: &str,
        wallet_id: Option<&str>,
    ) -> WdkResult<String> {
        validate_network(network)?;
        validate_account_index(account_index)?;
        validate_asset_id(asset_id)?;
        let wallet_id = self.scope(wallet_id)?;
        self.ensure_active(&wallet_id)?;

        let (method, args) = if asset_id == NATIVE_ASSET {
            ("getBalance", None)
        } else {
            let args = serde_json::to_string(asset_id)
                .map_err(|err| WdkError::transport("accounts", "getTokenBalance", err))?;
            ("getTokenBalance", Some(args))
        };

        let key = balance_loading_key(network, account_index, asset_id);
        let _flag = LoadingFlag::balance(&self.store, &wallet_id, &key);
        let result = self
            .fetch(
                &wallet_id,
                CallMethodRequest {
                    method_name: method.to_string(),
                    network: network.to_string(),
                    account_index,
                    args,
                },
            )
            .await?;
        let balance = parse_balance(&result)
            .map_err(|err| WdkError::transport("accounts", method, err))?;

        self.store
            .set_balance(&wallet_id, network, account_index, asset_id, &balance);
        Ok(balance)
    }

    /// Calls any account-scoped worklet method and returns its JSON result.
    ///
    /// # Errors
    ///
    /// - [`WdkError::Validation`] for malformed inputs.
    /// - [`WdkError::NotInitialized`] if the worklet has no wallet.
    /// - [`WdkError::Transport`] if the call fails or returns garbage.
    pub async fn call_method(
        &self,
        method_name: &str,
        network: &str,
        account_index: u32,
        args: Option<serde_json::Value>,
    ) -> WdkResult<serde_json::Value> {
        if method_name.trim().is_empty() {
            return Err(WdkError::validation("method_name", "must not be empty"));
        }
        validate_network(network)?;
        validate_account_index(account_index)?;
        let args = args
            .map(|args| serde_json::to_string(&args))
            .transpose()
            .map_err(|err| WdkError::validation("args", err.to_string()))?;

        let result = self
            .lifecycle
            .call_method(CallMethodRequest {
                method_name: method_name.to_string(),
                network: network.to_string(),
                account_index,
                args,
            })
            .await?;
        serde_json::from_str(&result)
            .map_err(|err| WdkError::transport("accounts", method_name, err))
    }

    fn scope(&self, wallet_id: Option<&str>) -> WdkResult<String> {
        if let Some(wallet_id) = wallet_id {
            validate_wallet_id(wallet_id)?;
        }
        let active = self.selection.active_wallet_id();
        Ok(resolve_wallet_id(wallet_id, active.as_deref()))
    }

    // The worklet only ever answers for the wallet it was initialized with.
    // With no wallet selected, only the temporary scope is served.
    fn ensure_active(&self, wallet_id: &str) -> WdkResult<()> {
        let served = match self.selection.active_wallet_id() {
            Some(active) => active == wallet_id,
            None => wallet_id == TEMPORARY_WALLET_ID,
        };
        if served {
            Ok(())
        } else {
            Err(WdkError::NotInitialized(format!(
                "wallet {wallet_id} is not the active wallet"
            )))
        }
    }

    /// Runs `request` on behalf of `wallet_id`, failing if another wallet
    /// took over the worklet before the answer arrived.
    async fn fetch(&self, wallet_id: &str, request: CallMethodRequest) -> WdkResult<String> {
        let result = self.lifecycle.call_method(request).await;
        let moved = matches!(result, Err(WdkError::Superseded { .. }));
        if moved || !self.still_scoped(wallet_id) {
            tracing::debug!(wallet_id, "active wallet changed during fetch, dropping answer");
            return Err(WdkError::Superseded {
                target: wallet_id.to_string(),
            });
        }
        result
    }

    fn still_scoped(&self, wallet_id: &str) -> bool {
        let active = self.selection.active_wallet_id();
        resolve_wallet_id(None, active.as_deref()) == wallet_id
    }
}

fn parse_balance(result: &str) -> Result<String, RpcError> {
    let value: serde_json::Value = serde_json::from_str(result)
        .map_err(|err| RpcError::new(format!("malformed balance: {err}")))?;
    let digits = match &value {
        serde_json::Value::Number(number) => number.as_u64().map(|amount| amount.to_string()),
        serde_json::Value::String(text)
            if !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit()) =>
        {
            Some(text.clone())
        }
        _ => None,
    }
    .ok_or_else(|| RpcError::new(format!("balance is not an unsigned integer: {value}")))?;

    let trimmed = digits.trim_start_matches('0');
    Ok(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}

/// Clears a loading flag when the fetch ends, however it ends.
struct LoadingFlag<'a> {
    store: &'a WalletDataStore,
    wallet_id: &'a str,
    key: &'a str,
    balance: bool,
}

impl<'a> LoadingFlag<'a> {
    fn address(store: &'a WalletDataStore, wallet_id: &'a str, key: &'a str) -> Self {
        store.set_address_loading(wallet_id, key, true);
        Self {
            store,
            wallet_id,
            key,
            balance: false,
        }
    }

    fn balance(store: &'a WalletDataStore, wallet_id: &'a str, key: &'a str) -> Self {
        store.set_balance_loading(wallet_id, key, true);
        Self {
            store,
            wallet_id,
            key,
            balance: true,
        }
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        if self.balance {
            self.store
                .set_balance_loading(self.wallet_id, self.key, false);
        } else {
            self.store
                .set_address_loading(self.wallet_id, self.key, false);
        }
    }
}
