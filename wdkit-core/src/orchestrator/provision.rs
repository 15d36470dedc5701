use secrecy::{ExposeSecret, SecretString};

use crate::credential_cache::CredentialUpdate;
use crate::credentials::{duplicate_secret, WalletCredentials};
use crate::error::{WdkError, WdkResult};
use crate::transport::EncryptedWalletMaterial;
use crate::validation::{validate_mnemonic_shape, validate_wallet_id, WordCount};
use crate::wallet_state::WalletLoadingState;

use super::{switch_key, AttemptGuard, SwitchOptions, WdkOrchestrator};

enum Source {
    Generate(WordCount),
    Import(SecretString),
}

impl WdkOrchestrator {
    /// Generates a new wallet, stores it under `wallet_id` and activates it.
    ///
    /// # Errors
    ///
    /// - [`WdkError::WalletAlreadyExists`] if the vault already has the id.
    /// - Any vault or worklet failure. Whatever was written to the vault is
    ///   deleted again before the error is returned.
    /// - [`WdkError::Superseded`] if a reset ran while the wallet was being
    ///   activated. The wallet stays stored but is not active.
    pub async fn create_wallet(
        &self,
        wallet_id: &str,
        word_count: WordCount,
        options: SwitchOptions,
    ) -> WdkResult<()> {
        validate_wallet_id(wallet_id)?;
        self.operations
            .with_mutex(&switch_key(wallet_id), || {
                self.provision(wallet_id, Source::Generate(word_count), options)
            })
            .await
    }

    /// Imports `mnemonic` under `wallet_id` and activates it.
    ///
    /// # Errors
    ///
    /// - [`WdkError::Validation`] if the phrase is not 12 or 24 words.
    /// - Otherwise as [`create_wallet`](Self::create_wallet).
    pub async fn import_wallet(
        &self,
        wallet_id: &str,
        mnemonic: SecretString,
        options: SwitchOptions,
    ) -> WdkResult<()> {
        validate_wallet_id(wallet_id)?;
        validate_mnemonic_shape(mnemonic.expose_secret())?;
        self.operations
            .with_mutex(&switch_key(wallet_id), || {
                self.provision(wallet_id, Source::Import(mnemonic), options)
            })
            .await
    }

    async fn provision(
        &self,
        wallet_id: &str,
        source: Source,
        options: SwitchOptions,
    ) -> WdkResult<()> {
        let guard = AttemptGuard::begin(
            &self.selection,
            WalletLoadingState::Loading {
                identifier: wallet_id.to_string(),
            },
        );
        match self.provision_steps(wallet_id, source, options).await {
            Ok(()) => {
                if guard.commit(wallet_id) {
                    tracing::info!(wallet_id, "wallet provisioned");
                    Ok(())
                } else {
                    tracing::warn!(wallet_id, "wallet stored but a reset ran, not activating");
                    Err(WdkError::Superseded {
                        target: wallet_id.to_string(),
                    })
                }
            }
            Err(err @ WdkError::Superseded { .. }) => {
                guard.roll_back();
                tracing::warn!(wallet_id, "wallet stored but a reset ran, not activating");
                Err(err)
            }
            Err(err) => {
                let message = err.user_message();
                self.selection.fail(guard.attempt(), wallet_id, message.clone());
                guard.disarm();
                tracing::warn!(wallet_id, error = %message, "wallet provisioning failed");
                Err(err)
            }
        }
    }

    async fn provision_steps(
        &self,
        wallet_id: &str,
        source: Source,
        options: SwitchOptions,
    ) -> WdkResult<()> {
        if self.vault.has_wallet(wallet_id).await? {
            return Err(WdkError::WalletAlreadyExists {
                wallet_id: wallet_id.to_string(),
            });
        }
        self.ensure_started(options.start_config).await?;
        let material = match source {
            Source::Generate(word_count) => {
                self.lifecycle
                    .generate_entropy_and_encrypt(word_count)
                    .await?
            }
            Source::Import(mnemonic) => {
                self.lifecycle
                    .get_seed_and_entropy_from_mnemonic(&mnemonic)
                    .await?
            }
        };

        if let Err(err) = self.store(wallet_id, &material).await {
            self.compensate(wallet_id, &err).await;
            return Err(err);
        }
        let credentials = WalletCredentials::new(
            duplicate_secret(&material.encryption_key),
            duplicate_secret(&material.encrypted_seed),
        );
        let initialized = self.lifecycle.initialize_wdk(credentials.duplicate()).await;
        match initialized {
            // The wallet is stored and intact; only its activation lost.
            Ok(_) | Err(WdkError::Superseded { .. }) => {
                self.cache.set(
                    wallet_id,
                    CredentialUpdate::from_credentials(&credentials)
                        .encrypted_entropy(duplicate_secret(&material.encrypted_entropy)),
                );
                initialized.map(|_| ())
            }
            Err(err) => {
                self.compensate(wallet_id, &err).await;
                Err(err)
            }
        }
    }

    async fn store(&self, wallet_id: &str, material: &EncryptedWalletMaterial) -> WdkResult<()> {
        self.vault
            .set_encrypted_seed(duplicate_secret(&material.encrypted_seed), wallet_id)
            .await?;
        self.vault
            .set_encrypted_entropy(duplicate_secret(&material.encrypted_entropy), wallet_id)
            .await?;
        self.vault
            .set_encryption_key(duplicate_secret(&material.encryption_key), wallet_id)
            .await?;
        Ok(())
    }

    /// Leaves no half-provisioned wallet behind.
    async fn compensate(&self, wallet_id: &str, err: &WdkError) {
        if let Err(delete_err) = self.vault.delete_wallet(wallet_id).await {
            tracing::warn!(
                wallet_id,
                error = %delete_err,
                "failed to delete partially provisioned wallet"
            );
        }
        self.cache.clear(Some(wallet_id));
        if matches!(err, WdkError::DecryptionMismatch(_)) {
            self.reset();
        }
    }

    /// Decrypts the mnemonic of `wallet_id`.
    ///
    /// Always asks the vault to authenticate first, even when the key is
    /// cached.
    ///
    /// # Errors
    ///
    /// - [`WdkError::WalletNotFound`] if the vault has no such wallet.
    /// - [`WdkError::Authentication`] if the challenge fails or is declined.
    /// - [`WdkError::MissingCredential`] if the key or entropy is gone.
    /// - [`WdkError::NotInitialized`] if the worklet cannot be started.
    pub async fn reveal_mnemonic(&self, wallet_id: &str) -> WdkResult<SecretString> {
        validate_wallet_id(wallet_id)?;
        if !self.vault.has_wallet(wallet_id).await? {
            return Err(WdkError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            });
        }
        if !self.vault.authenticate().await? {
            return Err(WdkError::Authentication(
                "authentication declined".to_string(),
            ));
        }
        self.ensure_started(None).await?;
        let (encryption_key, encrypted_entropy) = self.resolve_entropy(wallet_id).await?;
        tracing::info!(wallet_id, "revealing mnemonic");
        self.lifecycle
            .get_mnemonic_from_entropy(&encrypted_entropy, &encryption_key)
            .await
    }

    /// Deletes `wallet_id` from the vault together with its cached
    /// credentials and account data.
    ///
    /// Deleting the active wallet also resets the lifecycle and leaves no
    /// wallet selected.
    ///
    /// # Errors
    ///
    /// Returns the vault failure; nothing local is cleared in that case.
    pub async fn delete_wallet(&self, wallet_id: &str) -> WdkResult<()> {
        validate_wallet_id(wallet_id)?;
        self.operations
            .with_mutex(&switch_key(wallet_id), || async {
                self.vault.delete_wallet(wallet_id).await?;
                self.cache.clear(Some(wallet_id));
                self.store.clear_wallet(wallet_id);
                if self.selection.active_wallet_id().as_deref() == Some(wallet_id) {
                    self.reset();
                    self.selection.reset();
                }
                tracing::info!(wallet_id, "wallet deleted");
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::{NetworkConfig, OrchestratorConfig, WdkConfig, WorkletBundle};
    use crate::memory::{LoopbackWorklet, MemoryVault};
    use crate::transport::WorkletHost;
    use crate::vault::SecureVault;

    fn options() -> SwitchOptions {
        SwitchOptions {
            start_config: Some(
                WdkConfig::new()
                    .with_network("ethereum", NetworkConfig::new(1, "https://eth.example"))
                    .unwrap(),
            ),
        }
    }

    fn setup() -> (Arc<MemoryVault>, Arc<LoopbackWorklet>, WdkOrchestrator) {
        let vault = Arc::new(MemoryVault::new());
        let worklet = Arc::new(LoopbackWorklet::new());
        let orchestrator = WdkOrchestrator::new(
            OrchestratorConfig::new(WorkletBundle::new("wdk.bundle", vec![1u8])),
            Arc::clone(&vault) as Arc<dyn SecureVault>,
            Arc::clone(&worklet) as Arc<dyn WorkletHost>,
        );
        (vault, worklet, orchestrator)
    }

    #[tokio::test]
    async fn test_create_wallet_stores_and_activates() {
        let (vault, worklet, orchestrator) = setup();
        orchestrator
            .create_wallet("alice", WordCount::TwentyFour, options())
            .await
            .unwrap();

        assert!(vault.contains("alice"));
        assert_eq!(orchestrator.active_wallet_id().as_deref(), Some("alice"));
        assert_eq!(worklet.initialize_calls(), 1);
        // Creation never reads the key back, so nothing prompted.
        assert_eq!(vault.biometric_prompts(), 0);

        let mnemonic = orchestrator.reveal_mnemonic("alice").await.unwrap();
        assert_eq!(mnemonic.expose_secret().split_whitespace().count(), 24);
        // Only the explicit authentication prompted; key and entropy were cached.
        assert_eq!(vault.biometric_prompts(), 1);
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_mnemonic_without_side_effects() {
        let (vault, worklet, orchestrator) = setup();
        let err = orchestrator
            .import_wallet("alice", SecretString::from("too few words"), options())
            .await
            .unwrap_err();
        assert!(matches!(err, WdkError::Validation { ref field, .. } if field == "mnemonic"));
        assert_eq!(vault.call_count(), 0);
        assert_eq!(worklet.runtimes_spawned(), 0);
    }

    #[tokio::test]
    async fn test_existing_wallet_is_not_overwritten() {
        let (vault, worklet, orchestrator) = setup();
        let material = worklet.material_for("alice");
        vault.insert_wallet("alice", &material);

        let err = orchestrator
            .create_wallet("alice", WordCount::Twelve, options())
            .await
            .unwrap_err();
        assert!(matches!(err, WdkError::WalletAlreadyExists { .. }));
        // The existing entry survives.
        assert!(vault.contains("alice"));
        assert_eq!(worklet.runtimes_spawned(), 0);
    }

    #[tokio::test]
    async fn test_failed_vault_write_deletes_partial_entry() {
        let (vault, worklet, orchestrator) = setup();
        vault.fail_next("setEncryptionKey", "disk full");

        let err = orchestrator
            .create_wallet("alice", WordCount::Twelve, options())
            .await
            .unwrap_err();
        assert!(matches!(err, WdkError::Vault(_)));
        assert!(!vault.contains("alice"));
        assert_eq!(worklet.initialize_calls(), 0);
        assert!(orchestrator.cache.get("alice").is_none());
        assert!(matches!(
            orchestrator.loading_state(),
            WalletLoadingState::Error { ref identifier, .. } if identifier == "alice"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_create_keeps_wallet_inactive() {
        let (vault, worklet, orchestrator) = setup();
        orchestrator.start_worklet(options().start_config.unwrap()).await.unwrap();
        worklet.set_latency(Duration::from_millis(10));

        let (result, ()) = tokio::join!(
            orchestrator.create_wallet("alice", WordCount::Twelve, options()),
            async {
                // generateEntropyAndEncrypt finishes at 10ms, initializeWDK at 20ms.
                tokio::time::sleep(Duration::from_millis(15)).await;
                orchestrator.hard_reset();
            }
        );
        assert_eq!(
            result,
            Err(WdkError::Superseded {
                target: "initializeWDK".to_string()
            })
        );
        assert!(vault.contains("alice"));
        assert!(orchestrator.cache.get("alice").is_some());
        assert_eq!(orchestrator.active_wallet_id(), None);
        assert_eq!(orchestrator.loading_state(), WalletLoadingState::NotLoaded);
        assert!(!orchestrator.snapshot().is_initialized);

        // Switching to it later works from the cache.
        worklet.set_latency(Duration::ZERO);
        let outcome = orchestrator
            .switch_to_wallet("alice", SwitchOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, crate::orchestrator::SwitchOutcome::Switched);
        assert_eq!(vault.biometric_prompts(), 0);
    }

    #[tokio::test]
    async fn test_delete_active_wallet_resets_selection() {
        let (vault, _worklet, orchestrator) = setup();
        orchestrator
            .create_wallet("alice", WordCount::Twelve, options())
            .await
            .unwrap();
        orchestrator
            .accounts()
            .address("ethereum", 0, None)
            .await
            .unwrap();

        orchestrator.delete_wallet("alice").await.unwrap();
        assert!(!vault.contains("alice"));
        assert_eq!(orchestrator.active_wallet_id(), None);
        assert_eq!(orchestrator.loading_state(), WalletLoadingState::NotLoaded);
        assert!(orchestrator.wallet_addresses("alice").is_none());
        assert!(!orchestrator.snapshot().is_initialized);
        assert!(orchestrator.snapshot().is_started);
    }
}
