//! In-memory collaborators for tests and demos.
//!
//! These implementations are NOT secure for production use. Nothing is
//! encrypted and the worklet is simulated in-process; key material is
//! derived deterministically so tests can predict it.

// Allow certain clippy lints for test-only code
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{RpcError, VaultError, WdkResult};
use crate::persistence::SnapshotStore;
use crate::transport::{
    CallMethodRequest, CallMethodResponse, Closable, EncryptedWalletMaterial,
    GenerateEntropyRequest, InitializeWdkRequest, IpcHandle, MnemonicFromEntropyRequest,
    MnemonicResponse, RpcResult, SeedFromMnemonicRequest, StatusResponse, WalletMaterialResponse,
    WorkletHost, WorkletRpc, WorkletRuntime, WorkletStartRequest,
};
use crate::vault::{SecureVault, VaultResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

// =============================================================================
// Loopback worklet
// =============================================================================

const WORDS: [&str; 16] = [
    "abandon", "ability", "able", "about", "above", "absent", "absorb", "abstract", "absurd",
    "abuse", "access", "accident", "account", "accuse", "achieve", "acid",
];

/// Failure message the loopback reports when a key does not open a seed.
pub const LOOPBACK_DECRYPT_FAILURE: &str = "Error: Failed to decrypt seed: authentication tag mismatch";

#[derive(Default)]
struct WorkletShared {
    latency: Mutex<Option<Duration>>,
    failures: Mutex<HashMap<String, String>>,
    balances: Mutex<HashMap<(String, u32, String), serde_json::Value>>,
    method_calls: Mutex<Vec<String>>,
    generated: AtomicU64,
    runtimes_spawned: AtomicUsize,
    closed_runtimes: AtomicUsize,
    closed_clients: AtomicUsize,
    worklet_start_calls: AtomicUsize,
    initialize_calls: AtomicUsize,
    call_method_calls: AtomicUsize,
}

impl WorkletShared {
    async fn step(&self, operations: &[&str]) -> RpcResult<()> {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut failures = lock(&self.failures);
        for operation in operations {
            if let Some(message) = failures.remove(*operation) {
                return Err(RpcError::new(message));
            }
        }
        Ok(())
    }
}

/// In-process [`WorkletHost`] with call counters and failure injection.
///
/// **FOR TESTING ONLY**
///
/// A seed is `seed:<hash of mnemonic>`, its key is a hash of the seed and
/// entropy is the hex-encoded mnemonic. `initializeWDK` fails with
/// [`LOOPBACK_DECRYPT_FAILURE`] when the key does not belong to the seed.
#[derive(Default)]
pub struct LoopbackWorklet {
    shared: Arc<WorkletShared>,
}

impl LoopbackWorklet {
    /// Creates a worklet host with no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Delays every later call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.shared.latency) = Some(latency);
    }

    /// Makes the next call of `operation` fail with `message`.
    ///
    /// `operation` is a host step (`spawnRuntime`, `start`, `connect`), an
    /// RPC name (`workletStart`, `initializeWDK`, `callMethod`, ...) or a
    /// `callMethod` method name such as `getAddress`.
    pub fn fail_next(&self, operation: &str, message: &str) {
        lock(&self.shared.failures).insert(operation.to_string(), message.to_string());
    }

    /// Sets the balance `getBalance`/`getTokenBalance` report.
    pub fn set_balance(
        &self,
        network: &str,
        account_index: u32,
        asset_id: &str,
        value: serde_json::Value,
    ) {
        lock(&self.shared.balances).insert(
            (network.to_string(), account_index, asset_id.to_string()),
            value,
        );
    }

    /// The 12-word mnemonic derived from `name`.
    #[must_use]
    pub fn mnemonic_for(name: &str) -> String {
        mnemonic_with_words(name, 12)
    }

    /// Wallet material the loopback derives from `mnemonic`.
    #[must_use]
    pub fn material_from_mnemonic(mnemonic: &str) -> EncryptedWalletMaterial {
        let seed = seed_for(mnemonic);
        EncryptedWalletMaterial {
            encryption_key: SecretString::from(key_for_seed(&seed)),
            encrypted_seed: SecretString::from(seed),
            encrypted_entropy: SecretString::from(format!("entropy:{}", hex::encode(mnemonic))),
        }
    }

    /// Wallet material for the mnemonic derived from `name`.
    #[must_use]
    pub fn material_for(&self, name: &str) -> EncryptedWalletMaterial {
        Self::material_from_mnemonic(&Self::mnemonic_for(name))
    }

    /// Runtimes constructed so far.
    #[must_use]
    pub fn runtimes_spawned(&self) -> usize {
        self.shared.runtimes_spawned.load(Ordering::SeqCst)
    }

    /// Runtimes closed so far.
    #[must_use]
    pub fn closed_runtimes(&self) -> usize {
        self.shared.closed_runtimes.load(Ordering::SeqCst)
    }

    /// RPC clients closed so far.
    #[must_use]
    pub fn closed_clients(&self) -> usize {
        self.shared.closed_clients.load(Ordering::SeqCst)
    }

    /// `workletStart` calls so far.
    #[must_use]
    pub fn worklet_start_calls(&self) -> usize {
        self.shared.worklet_start_calls.load(Ordering::SeqCst)
    }

    /// `initializeWDK` calls so far, failed ones included.
    #[must_use]
    pub fn initialize_calls(&self) -> usize {
        self.shared.initialize_calls.load(Ordering::SeqCst)
    }

    /// `callMethod` calls so far.
    #[must_use]
    pub fn call_method_calls(&self) -> usize {
        self.shared.call_method_calls.load(Ordering::SeqCst)
    }

    /// Every RPC that reached the worklet, in order. `callMethod` calls are
    /// recorded by method name.
    #[must_use]
    pub fn method_calls(&self) -> Vec<String> {
        lock(&self.shared.method_calls)
            .iter()
            .filter(|name| !is_rpc_name(name))
            .cloned()
            .collect()
    }

    /// Total number of RPCs of any kind.
    #[must_use]
    pub fn rpc_calls(&self) -> usize {
        lock(&self.shared.method_calls).len()
    }
}

fn is_rpc_name(name: &str) -> bool {
    matches!(
        name,
        "workletStart"
            | "initializeWDK"
            | "generateEntropyAndEncrypt"
            | "getMnemonicFromEntropy"
            | "getSeedAndEntropyFromMnemonic"
    )
}

fn mnemonic_with_words(name: &str, count: usize) -> String {
    let digest = Sha256::digest(name.as_bytes());
    digest
        .iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(i, byte)| WORDS[(usize::from(*byte) + i) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn seed_for(mnemonic: &str) -> String {
    format!("seed:{}", sha256_hex(&["seed", mnemonic]))
}

fn key_for_seed(seed: &str) -> String {
    sha256_hex(&["key", seed])
}

#[async_trait]
impl WorkletHost for LoopbackWorklet {
    async fn spawn_runtime(&self) -> RpcResult<Arc<dyn WorkletRuntime>> {
        self.shared.step(&["spawnRuntime"]).await?;
        self.shared.runtimes_spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackRuntime {
            shared: Arc::clone(&self.shared),
            started: AtomicBool::new(false),
        }))
    }

    async fn connect(&self, ipc: IpcHandle) -> RpcResult<Arc<dyn WorkletRpc>> {
        if ipc.downcast_ref::<LoopbackChannel>().is_none() {
            return Err(RpcError::new("unknown ipc channel"));
        }
        self.shared.step(&["connect"]).await?;
        Ok(Arc::new(LoopbackClient {
            shared: Arc::clone(&self.shared),
            initialized_seed: Mutex::new(None),
        }))
    }
}

struct LoopbackChannel;

struct LoopbackRuntime {
    shared: Arc<WorkletShared>,
    started: AtomicBool,
}

#[async_trait]
impl Closable for LoopbackRuntime {
    async fn close(&self) -> RpcResult<()> {
        self.shared.closed_runtimes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl WorkletRuntime for LoopbackRuntime {
    async fn start(&self, _bundle_path: &str, bundle: &[u8]) -> RpcResult<()> {
        self.shared.step(&["start"]).await?;
        if bundle.is_empty() {
            return Err(RpcError::new("empty bundle"));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ipc(&self) -> RpcResult<IpcHandle> {
        if self.started.load(Ordering::SeqCst) {
            Ok(IpcHandle::new(LoopbackChannel))
        } else {
            Err(RpcError::new("runtime not started"))
        }
    }
}

struct LoopbackClient {
    shared: Arc<WorkletShared>,
    initialized_seed: Mutex<Option<String>>,
}

impl LoopbackClient {
    fn record(&self, name: &str) {
        lock(&self.shared.method_calls).push(name.to_string());
    }

    fn balance(&self, network: &str, account_index: u32, asset_id: &str) -> serde_json::Value {
        lock(&self.shared.balances)
            .get(&(network.to_string(), account_index, asset_id.to_string()))
            .cloned()
            .unwrap_or_else(|| serde_json::Value::String("0".to_string()))
    }
}

#[async_trait]
impl Closable for LoopbackClient {
    async fn close(&self) -> RpcResult<()> {
        self.shared.closed_clients.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl WorkletRpc for LoopbackClient {
    async fn worklet_start(&self, request: WorkletStartRequest) -> RpcResult<StatusResponse> {
        self.record("workletStart");
        self.shared.worklet_start_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.step(&["workletStart"]).await?;
        serde_json::from_str::<serde_json::Value>(&request.config)
            .map_err(|err| RpcError::new(format!("invalid config: {err}")))?;
        Ok(StatusResponse {
            status: "started".to_string(),
        })
    }

    async fn call_method(&self, request: CallMethodRequest) -> RpcResult<CallMethodResponse> {
        self.record(&request.method_name);
        self.shared.call_method_calls.fetch_add(1, Ordering::SeqCst);
        self.shared
            .step(&["callMethod", request.method_name.as_str()])
            .await?;
        let seed = lock(&self.initialized_seed)
            .clone()
            .ok_or_else(|| RpcError::new("WDK not initialized"))?;

        let value = match request.method_name.as_str() {
            "getAddress" => {
                let index = request.account_index.to_string();
                let digest = sha256_hex(&["address", &seed, &request.network, &index]);
                serde_json::Value::String(format!("0x{}", &digest[..40]))
            }
            "getBalance" => self.balance(&request.network, request.account_index, "native"),
            "getTokenBalance" => {
                let token: String = request
                    .args
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .map_err(|err| RpcError::new(format!("invalid args: {err}")))?
                    .ok_or_else(|| RpcError::new("missing token address"))?;
                self.balance(&request.network, request.account_index, &token)
            }
            other => {
                return Err(RpcError::new(format!("unknown method {other}")).with_code("E_METHOD"))
            }
        };
        Ok(CallMethodResponse {
            result: value.to_string(),
        })
    }

    async fn initialize_wdk(&self, request: InitializeWdkRequest) -> RpcResult<StatusResponse> {
        self.record("initializeWDK");
        self.shared.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.step(&["initializeWDK"]).await?;
        if key_for_seed(&request.encrypted_seed) != request.encryption_key {
            return Err(RpcError::new(LOOPBACK_DECRYPT_FAILURE));
        }
        *lock(&self.initialized_seed) = Some(request.encrypted_seed.clone());
        Ok(StatusResponse {
            status: "initialized".to_string(),
        })
    }

    async fn generate_entropy_and_encrypt(
        &self,
        request: GenerateEntropyRequest,
    ) -> RpcResult<WalletMaterialResponse> {
        self.record("generateEntropyAndEncrypt");
        self.shared.step(&["generateEntropyAndEncrypt"]).await?;
        let count = match request.word_count {
            12 => 12,
            24 => 24,
            other => return Err(RpcError::new(format!("unsupported word count {other}"))),
        };
        let n = self.shared.generated.fetch_add(1, Ordering::SeqCst);
        let mnemonic = mnemonic_with_words(&format!("generated-{n}"), count);
        Ok(material_response(&mnemonic))
    }

    async fn get_mnemonic_from_entropy(
        &self,
        request: MnemonicFromEntropyRequest,
    ) -> RpcResult<MnemonicResponse> {
        self.record("getMnemonicFromEntropy");
        self.shared.step(&["getMnemonicFromEntropy"]).await?;
        let mnemonic = request
            .encrypted_entropy
            .strip_prefix("entropy:")
            .and_then(|encoded| hex::decode(encoded).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| RpcError::new("Failed to decrypt entropy: malformed buffer"))?;
        if key_for_seed(&seed_for(&mnemonic)) != request.encryption_key {
            return Err(RpcError::new("Failed to decrypt entropy: wrong key"));
        }
        Ok(MnemonicResponse { mnemonic })
    }

    async fn get_seed_and_entropy_from_mnemonic(
        &self,
        request: SeedFromMnemonicRequest,
    ) -> RpcResult<WalletMaterialResponse> {
        self.record("getSeedAndEntropyFromMnemonic");
        self.shared.step(&["getSeedAndEntropyFromMnemonic"]).await?;
        let words = request.mnemonic.split_whitespace().count();
        if words != 12 && words != 24 {
            return Err(RpcError::new("invalid mnemonic"));
        }
        let normalized = request
            .mnemonic
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Ok(material_response(&normalized))
    }
}

fn material_response(mnemonic: &str) -> WalletMaterialResponse {
    let material = LoopbackWorklet::material_from_mnemonic(mnemonic);
    WalletMaterialResponse {
        encryption_key: material.encryption_key.expose_secret().to_owned(),
        encrypted_seed_buffer: material.encrypted_seed.expose_secret().to_owned(),
        encrypted_entropy_buffer: material.encrypted_entropy.expose_secret().to_owned(),
    }
}

// =============================================================================
// Memory vault
// =============================================================================

#[derive(Default)]
struct StoredWallet {
    encryption_key: Option<String>,
    encrypted_seed: Option<String>,
    encrypted_entropy: Option<String>,
}

/// In-memory [`SecureVault`] with call counters.
///
/// **FOR TESTING ONLY**: values are kept in plain `String`s.
#[derive(Default)]
pub struct MemoryVault {
    wallets: Mutex<HashMap<String, StoredWallet>>,
    failures: Mutex<HashMap<String, String>>,
    deny_biometrics: AtomicBool,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    biometric_prompts: AtomicUsize,
}

impl MemoryVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.latency) = Some(latency);
        self
    }

    /// Stores `material` under `wallet_id`.
    pub fn insert_wallet(&self, wallet_id: &str, material: &EncryptedWalletMaterial) {
        lock(&self.wallets).insert(
            wallet_id.to_string(),
            StoredWallet {
                encryption_key: Some(material.encryption_key.expose_secret().to_owned()),
                encrypted_seed: Some(material.encrypted_seed.expose_secret().to_owned()),
                encrypted_entropy: Some(material.encrypted_entropy.expose_secret().to_owned()),
            },
        );
    }

    /// Makes biometric-gated reads fail with an authentication error.
    pub fn deny_biometrics(&self, deny: bool) {
        self.deny_biometrics.store(deny, Ordering::SeqCst);
    }

    /// Makes the next call of `operation` (e.g. `setEncryptionKey`) fail.
    pub fn fail_next(&self, operation: &str, message: &str) {
        lock(&self.failures).insert(operation.to_string(), message.to_string());
    }

    /// Whether anything is stored for `wallet_id`.
    #[must_use]
    pub fn contains(&self, wallet_id: &str) -> bool {
        lock(&self.wallets).contains_key(wallet_id)
    }

    /// Every call of any kind so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Biometric challenges presented so far (key reads and `authenticate`).
    #[must_use]
    pub fn biometric_prompts(&self) -> usize {
        self.biometric_prompts.load(Ordering::SeqCst)
    }

    async fn step(&self, operation: &str) -> VaultResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.failures).remove(operation) {
            Some(message) => Err(VaultError::Other(message)),
            None => Ok(()),
        }
    }

    fn challenge(&self) -> VaultResult<()> {
        self.biometric_prompts.fetch_add(1, Ordering::SeqCst);
        if self.deny_biometrics.load(Ordering::SeqCst) {
            Err(VaultError::Authentication(
                "User canceled authentication".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn read(
        &self,
        wallet_id: &str,
        field: fn(&StoredWallet) -> Option<&String>,
    ) -> Option<SecretString> {
        lock(&self.wallets)
            .get(wallet_id)
            .and_then(field)
            .cloned()
            .map(SecretString::from)
    }

    fn write(&self, wallet_id: &str, apply: impl FnOnce(&mut StoredWallet)) {
        apply(lock(&self.wallets).entry(wallet_id.to_string()).or_default());
    }
}

#[async_trait]
impl SecureVault for MemoryVault {
    async fn authenticate(&self) -> VaultResult<bool> {
        self.step("authenticate").await?;
        self.challenge()?;
        Ok(true)
    }

    async fn has_wallet(&self, wallet_id: &str) -> VaultResult<bool> {
        self.step("hasWallet").await?;
        Ok(self.contains(wallet_id))
    }

    async fn get_encryption_key(&self, wallet_id: &str) -> VaultResult<Option<SecretString>> {
        self.step("getEncryptionKey").await?;
        self.challenge()?;
        Ok(self.read(wallet_id, |wallet| wallet.encryption_key.as_ref()))
    }

    async fn get_encrypted_seed(&self, wallet_id: &str) -> VaultResult<Option<SecretString>> {
        self.step("getEncryptedSeed").await?;
        Ok(self.read(wallet_id, |wallet| wallet.encrypted_seed.as_ref()))
    }

    async fn get_encrypted_entropy(&self, wallet_id: &str) -> VaultResult<Option<SecretString>> {
        self.step("getEncryptedEntropy").await?;
        Ok(self.read(wallet_id, |wallet| wallet.encrypted_entropy.as_ref()))
    }

    async fn set_encryption_key(&self, value: SecretString, wallet_id: &str) -> VaultResult<()> {
        self.step("setEncryptionKey").await?;
        self.write(wallet_id, |wallet| {
            wallet.encryption_key = Some(value.expose_secret().to_owned());
        });
        Ok(())
    }

    async fn set_encrypted_seed(&self, value: SecretString, wallet_id: &str) -> VaultResult<()> {
        self.step("setEncryptedSeed").await?;
        self.write(wallet_id, |wallet| {
            wallet.encrypted_seed = Some(value.expose_secret().to_owned());
        });
        Ok(())
    }

    async fn set_encrypted_entropy(&self, value: SecretString, wallet_id: &str) -> VaultResult<()> {
        self.step("setEncryptedEntropy").await?;
        self.write(wallet_id, |wallet| {
            wallet.encrypted_entropy = Some(value.expose_secret().to_owned());
        });
        Ok(())
    }

    async fn delete_wallet(&self, wallet_id: &str) -> VaultResult<()> {
        self.step("deleteWallet").await?;
        lock(&self.wallets).remove(wallet_id);
        Ok(())
    }
}

// =============================================================================
// Memory snapshot store
// =============================================================================

/// In-memory [`SnapshotStore`].
#[derive(Default)]
pub struct MemorySnapshotStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self, key: String) -> WdkResult<Option<Vec<u8>>> {
        Ok(lock(&self.blobs).get(&key).cloned())
    }

    fn write_atomic(&self, key: String, bytes: Vec<u8>) -> WdkResult<()> {
        lock(&self.blobs).insert(key, bytes);
        Ok(())
    }

    fn delete(&self, key: String) -> WdkResult<()> {
        lock(&self.blobs).remove(&key);
        Ok(())
    }
}
