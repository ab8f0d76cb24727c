//! Per-user mailbox configuration storage.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::model::{Credentials, MailboxConfig, Mode, UserId};
use crate::store::{Store, StoreError};
use crate::vault::{DecryptionError, KeyError, KeyManager};

const KEY_PREFIX: &str = "user:";
const KEY_SUFFIX: &str = ":email_config";

/// Errors reading or writing a mailbox configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The store could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The encryption key could not be loaded or used.
    #[error(transparent)]
    Key(KeyError),

    /// Stored credentials do not decrypt under the active key.
    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    /// A stored field has an unusable value.
    #[error("stored configuration field {field} is corrupt")]
    Corrupt {
        /// Offending field.
        field: &'static str,
    },
}

impl From<KeyError> for ConfigError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Store(store) => Self::Store(store),
            other => Self::Key(other),
        }
    }
}

/// Store key for a user's configuration record.
#[must_use]
pub fn config_key(user: UserId) -> String {
    format!("{KEY_PREFIX}{user}{KEY_SUFFIX}")
}

/// Reads and writes [`MailboxConfig`] records, encrypting the credentials.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    store: Arc<dyn Store>,
    keys: Arc<KeyManager>,
}

impl ConfigStore {
    /// Creates a config store over `store`, sealing secrets with `keys`.
    #[must_use]
    pub const fn new(store: Arc<dyn Store>, keys: Arc<KeyManager>) -> Self {
        Self { store, keys }
    }

    /// Loads and decrypts a user's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decryption`] when stored credentials were
    /// sealed under another key, and [`ConfigError::Corrupt`] for malformed
    /// port or ciphertext fields.
    pub async fn get(&self, user: UserId) -> Result<Option<MailboxConfig>, ConfigError> {
        let fields = self.store.hash_get_all(&config_key(user)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let config = MailboxConfig {
            smtp_server: text_field(&fields, "smtp_server"),
            smtp_port: port_field(&fields, "smtp_port")?,
            imap_server: text_field(&fields, "imap_server"),
            imap_port: port_field(&fields, "imap_port")?,
            credentials: Credentials::new(
                self.open_field(&fields, "email").await?,
                self.open_field(&fields, "password").await?,
            ),
            mode: Mode::parse(&text_field(&fields, "mode")),
        };
        Ok(Some(config))
    }

    /// Encrypts and stores a configuration, replacing the whole record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be loaded or the store write fails.
    pub async fn put(&self, user: UserId, config: &MailboxConfig) -> Result<(), ConfigError> {
        let email = self.seal(&config.credentials.email).await?;
        let password = self.seal(&config.credentials.password).await?;

        let fields = [
            ("smtp_server", config.smtp_server.clone()),
            ("smtp_port", config.smtp_port.to_string()),
            ("imap_server", config.imap_server.clone()),
            ("imap_port", config.imap_port.to_string()),
            ("email", email),
            ("password", password),
            ("mode", config.mode.as_str().to_string()),
        ];
        self.store.hash_replace(&config_key(user), &fields).await?;
        debug!(%user, "stored mailbox configuration");
        Ok(())
    }

    /// Removes a user's configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn delete(&self, user: UserId) -> Result<(), ConfigError> {
        self.store.delete(&config_key(user)).await?;
        debug!(%user, "deleted mailbox configuration");
        Ok(())
    }

    /// Lists users with a stored configuration, without decrypting anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn list_configured_user_ids(&self) -> Result<Vec<UserId>, ConfigError> {
        let keys = self.store.keys_with_prefix(KEY_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix(KEY_PREFIX)?
                    .strip_suffix(KEY_SUFFIX)?
                    .parse()
                    .ok()
                    .map(UserId)
            })
            .collect())
    }

    /// Seals a secret into its stored text form.
    pub(crate) async fn seal(&self, plaintext: &str) -> Result<String, ConfigError> {
        Ok(URL_SAFE.encode(self.keys.encrypt(plaintext).await?))
    }

    /// Opens a secret sealed by [`seal`](Self::seal).
    pub(crate) async fn open(&self, sealed: &str) -> Result<String, ConfigError> {
        let bytes = URL_SAFE.decode(sealed).map_err(|_| DecryptionError)?;
        Ok(self.keys.decrypt(&bytes).await??)
    }

    async fn open_field(
        &self,
        fields: &HashMap<String, String>,
        name: &'static str,
    ) -> Result<String, ConfigError> {
        match fields.get(name) {
            Some(sealed) if !sealed.is_empty() => self.open(sealed).await,
            _ => Ok(String::new()),
        }
    }
}

fn text_field(fields: &HashMap<String, String>, name: &str) -> String {
    fields.get(name).cloned().unwrap_or_default()
}

fn port_field(fields: &HashMap<String, String>, name: &'static str) -> Result<u16, ConfigError> {
    match fields.get(name).map(String::as_str) {
        None | Some("") => Ok(0),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Corrupt { field: name }),
    }
}
