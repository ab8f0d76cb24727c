//! Encryption key lifecycle and authenticated encryption of secrets.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::store::{Store, StoreError};

/// Store key holding the active encryption key.
pub const KEY_STORE_KEY: &str = "courier:encryption_key";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Errors while obtaining or using the encryption key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A key from the store or environment is not base64 of 32 bytes.
    #[error("invalid encryption key from {source_name}")]
    InvalidKey {
        /// Where the key came from.
        source_name: &'static str,
    },

    /// The cipher refused to encrypt.
    #[error("encryption failed")]
    Encrypt,
}

/// Ciphertext that is truncated, malformed, produced under another key, or
/// does not decrypt to UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stored credentials cannot be decrypted with the active key")]
pub struct DecryptionError;

/// A 256-bit AES-GCM key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Generates a key from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parses URL-safe base64 of exactly 32 bytes.
    #[must_use]
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE.decode(encoded.trim()).ok()?;
        <[u8; KEY_LEN]>::try_from(bytes.as_slice()).ok().map(Self)
    }

    /// URL-safe base64 form, as persisted.
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Encrypts `plaintext` as `nonce || ciphertext+tag` with a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Encrypt`] if the cipher fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, KeyError> {
        let cipher = Aes256Gcm::new(&self.0.into());
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| KeyError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Reverses [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`DecryptionError`] for anything that does not authenticate
    /// under this key or is not UTF-8.
    pub fn decrypt(&self, data: &[u8]) -> Result<String, DecryptionError> {
        if data.len() < NONCE_LEN {
            return Err(DecryptionError);
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(&self.0.into());
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| DecryptionError)?;
        String::from_utf8(plain).map_err(|_| DecryptionError)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Loads the process encryption key once and hands out the cached copy.
///
/// Lookup order: the store, then the environment secret supplied at
/// construction, then a freshly generated key. A generated key is written
/// with set-if-absent and re-read, so concurrent first starts agree.
pub struct KeyManager {
    store: Arc<dyn Store>,
    env_key: Option<String>,
    key: OnceCell<EncryptionKey>,
}

impl KeyManager {
    /// Creates a manager over `store`. `env_key` is the optional
    /// `ENCRYPTION_KEY` secret.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, env_key: Option<String>) -> Self {
        Self {
            store,
            env_key: env_key.filter(|k| !k.trim().is_empty()),
            key: OnceCell::new(),
        }
    }

    /// Returns the active key, loading or creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Store`] when the store is unreachable and
    /// [`KeyError::InvalidKey`] when a stored or supplied key is malformed.
    pub async fn load_or_create_key(&self) -> Result<&EncryptionKey, KeyError> {
        self.key.get_or_try_init(|| self.resolve()).await
    }

    async fn resolve(&self) -> Result<EncryptionKey, KeyError> {
        if let Some(stored) = self.store.get(KEY_STORE_KEY).await? {
            info!("using encryption key from store");
            return EncryptionKey::from_base64(&stored)
                .ok_or(KeyError::InvalidKey { source_name: "store" });
        }

        if let Some(env_key) = &self.env_key {
            info!("using encryption key from environment");
            return EncryptionKey::from_base64(env_key).ok_or(KeyError::InvalidKey {
                source_name: "ENCRYPTION_KEY",
            });
        }

        let generated = EncryptionKey::generate();
        if self
            .store
            .set_if_absent(KEY_STORE_KEY, &generated.to_base64())
            .await?
        {
            info!("generated and stored a new encryption key");
            return Ok(generated);
        }

        // Another process stored its key first.
        let stored = self
            .store
            .get(KEY_STORE_KEY)
            .await?
            .ok_or_else(|| StoreError::Unavailable("encryption key vanished".into()))?;
        EncryptionKey::from_base64(&stored).ok_or(KeyError::InvalidKey { source_name: "store" })
    }

    /// Encrypts with the active key.
    ///
    /// # Errors
    ///
    /// Propagates key loading and cipher failures.
    pub async fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, KeyError> {
        self.load_or_create_key().await?.encrypt(plaintext)
    }

    /// Decrypts with the active key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key cannot be loaded; the inner result
    /// carries [`DecryptionError`] for bad ciphertext.
    pub async fn decrypt(&self, data: &[u8]) -> Result<Result<String, DecryptionError>, KeyError> {
        Ok(self.load_or_create_key().await?.decrypt(data))
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("loaded", &self.key.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let key = EncryptionKey::generate();
        let sealed = key.encrypt("hunter2").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + "hunter2".len() + 16);
        assert_eq!(key.decrypt(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn nonces_are_fresh() {
        let key = EncryptionKey::generate();
        assert_ne!(key.encrypt("same").unwrap(), key.encrypt("same").unwrap());
    }

    #[test]
    fn foreign_key_fails() {
        let sealed = EncryptionKey::generate().encrypt("secret").unwrap();
        assert_eq!(EncryptionKey::generate().decrypt(&sealed), Err(DecryptionError));
    }

    #[test]
    fn truncated_and_tampered_fail() {
        let key = EncryptionKey::generate();
        let mut sealed = key.encrypt("secret").unwrap();
        assert!(key.decrypt(&sealed[..5]).is_err());
        assert!(key.decrypt(&[]).is_err());
        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert!(key.decrypt(&sealed).is_err());
    }

    #[test]
    fn base64_form() {
        let key = EncryptionKey::generate();
        assert_eq!(EncryptionKey::from_base64(&key.to_base64()), Some(key));
        assert!(EncryptionKey::from_base64("c2hvcnQ=").is_none());
        assert!(EncryptionKey::from_base64("not base64!").is_none());
    }

    #[test]
    fn debug_is_redacted() {
        let key = EncryptionKey::from_base64(&URL_SAFE.encode([7u8; 32])).unwrap();
        assert_eq!(format!("{key:?}"), "EncryptionKey(<redacted>)");
    }

    #[tokio::test]
    async fn generated_key_is_persisted_and_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let manager = KeyManager::new(store.clone(), None);
        let first = manager.load_or_create_key().await.unwrap().clone();
        let second = manager.load_or_create_key().await.unwrap().clone();
        assert_eq!(first, second);

        let stored = store.get(KEY_STORE_KEY).await.unwrap().unwrap();
        assert_eq!(EncryptionKey::from_base64(&stored), Some(first.clone()));

        // A second process over the same store converges on the same key.
        let other = KeyManager::new(store, None);
        assert_eq!(other.load_or_create_key().await.unwrap(), &first);
    }

    #[tokio::test]
    async fn store_wins_over_environment() {
        let store = Arc::new(MemoryStore::new());
        let stored = EncryptionKey::generate();
        store.set(KEY_STORE_KEY, &stored.to_base64()).await.unwrap();

        let env = EncryptionKey::generate().to_base64();
        let manager = KeyManager::new(store, Some(env));
        assert_eq!(manager.load_or_create_key().await.unwrap(), &stored);
    }

    #[tokio::test]
    async fn environment_used_when_store_empty() {
        let env = EncryptionKey::generate();
        let manager = KeyManager::new(Arc::new(MemoryStore::new()), Some(env.to_base64()));
        assert_eq!(manager.load_or_create_key().await.unwrap(), &env);
    }

    #[tokio::test]
    async fn malformed_environment_key_is_rejected() {
        let manager = KeyManager::new(Arc::new(MemoryStore::new()), Some("garbage".into()));
        assert!(matches!(
            manager.load_or_create_key().await,
            Err(KeyError::InvalidKey { source_name: "ENCRYPTION_KEY" })
        ));
    }

    #[tokio::test]
    async fn manager_round_trip() {
        let manager = KeyManager::new(Arc::new(MemoryStore::new()), None);
        let sealed = manager.encrypt("a@example.com").await.unwrap();
        assert_eq!(manager.decrypt(&sealed).await.unwrap().unwrap(), "a@example.com");
    }

    proptest! {
        #[test]
        fn any_text_round_trips(text in "\\PC*") {
            let key = EncryptionKey::generate();
            let sealed = key.encrypt(&text).unwrap();
            prop_assert_eq!(key.decrypt(&sealed).unwrap(), text);
        }
    }
}
