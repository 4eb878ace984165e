//! Persisted Dropbox credentials
//!
//! A signed-in session survives restarts through two values: the account
//! identifier of the last successful sign-in, and that account's access
//! token. [`CredentialStore`] abstracts where they live.
//!
//! - [`KeyringCredentialStore`] - The system keyring (GNOME Keyring, KDE
//!   Wallet, macOS Keychain)
//! - [`MemoryCredentialStore`] - In-process storage for tests and one-shot
//!   tools

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// Keyring service name for Harmony's Dropbox credentials
pub const KEYRING_SERVICE: &str = "harmony-dropbox";

/// Keyring username under which the current account id is stored
const ACCOUNT_ENTRY: &str = "current-account";

/// Storage for the current account id and per-account access tokens
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Account id of the last successful sign-in
    async fn account_id(&self) -> Result<Option<String>>;

    /// Replaces (or with `None`, clears) the stored account id
    async fn set_account_id(&self, account_id: Option<&str>) -> Result<()>;

    async fn access_token(&self, account_id: &str) -> Result<Option<String>>;

    async fn store_access_token(&self, account_id: &str, token: &str) -> Result<()>;

    async fn clear_access_token(&self, account_id: &str) -> Result<()>;
}

// ============================================================================
// KeyringCredentialStore
// ============================================================================

/// Stores credentials in the system keyring
///
/// Keyring calls block, so each one runs on Tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Uses a custom keyring service name
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    async fn read(&self, username: &str) -> Result<Option<String>> {
        let service = self.service.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let entry = keyring::Entry::new(&service, &username)
                .context("Failed to create keyring entry")?;
            match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => {
                    debug!("No keyring entry for {}", username);
                    Ok(None)
                }
                Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
            }
        })
        .await
        .context("Keyring task failed")?
    }

    async fn write(&self, username: &str, value: &str) -> Result<()> {
        let service = self.service.clone();
        let username = username.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let entry = keyring::Entry::new(&service, &username)
                .context("Failed to create keyring entry")?;
            entry
                .set_password(&value)
                .context("Failed to store value in keyring")?;
            debug!("Stored keyring entry for {}", username);
            Ok(())
        })
        .await
        .context("Keyring task failed")?
    }

    async fn delete(&self, username: &str) -> Result<()> {
        let service = self.service.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let entry = keyring::Entry::new(&service, &username)
                .context("Failed to create keyring entry")?;
            match entry.delete_credential() {
                Ok(()) => {
                    info!("Cleared keyring entry for {}", username);
                    Ok(())
                }
                Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
            }
        })
        .await
        .context("Keyring task failed")?
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn account_id(&self) -> Result<Option<String>> {
        self.read(ACCOUNT_ENTRY).await
    }

    async fn set_account_id(&self, account_id: Option<&str>) -> Result<()> {
        match account_id {
            Some(account_id) => self.write(ACCOUNT_ENTRY, account_id).await,
            None => self.delete(ACCOUNT_ENTRY).await,
        }
    }

    async fn access_token(&self, account_id: &str) -> Result<Option<String>> {
        self.read(account_id).await
    }

    async fn store_access_token(&self, account_id: &str, token: &str) -> Result<()> {
        self.write(account_id, token).await
    }

    async fn clear_access_token(&self, account_id: &str) -> Result<()> {
        self.delete(account_id).await
    }
}

// ============================================================================
// MemoryCredentialStore
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    account_id: Option<String>,
    tokens: HashMap<String, String>,
}

/// Keeps credentials in memory only
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<MemoryState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a signed-in account
    pub fn with_account(account_id: impl Into<String>, token: impl Into<String>) -> Self {
        let account_id = account_id.into();
        let mut tokens = HashMap::new();
        tokens.insert(account_id.clone(), token.into());
        Self {
            state: Mutex::new(MemoryState {
                account_id: Some(account_id),
                tokens,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn account_id(&self) -> Result<Option<String>> {
        Ok(self.lock().account_id.clone())
    }

    async fn set_account_id(&self, account_id: Option<&str>) -> Result<()> {
        self.lock().account_id = account_id.map(str::to_string);
        Ok(())
    }

    async fn access_token(&self, account_id: &str) -> Result<Option<String>> {
        Ok(self.lock().tokens.get(account_id).cloned())
    }

    async fn store_access_token(&self, account_id: &str, token: &str) -> Result<()> {
        self.lock()
            .tokens
            .insert(account_id.to_string(), token.to_string());
        Ok(())
    }

    async fn clear_access_token(&self, account_id: &str) -> Result<()> {
        self.lock().tokens.remove(account_id);
        Ok(())
    }
}
