//! Wiring of the core components around one store.

use std::sync::Arc;
use tracing::info;

use crate::account::ConfigStore;
use crate::error::Result;
use crate::service::{MailTransport, Mailer};
use crate::setup::Setup;
use crate::stats::Stats;
use crate::store::Store;
use crate::vault::KeyManager;

/// Every core component, built once at startup and shared by handlers.
#[derive(Debug, Clone)]
pub struct Context {
    /// Backing store.
    pub store: Arc<dyn Store>,
    /// Encryption key holder.
    pub keys: Arc<KeyManager>,
    /// Mailbox configurations.
    pub configs: ConfigStore,
    /// Setup state machine.
    pub setup: Setup,
    /// Usage counters.
    pub stats: Stats,
    /// Outgoing mail.
    pub mailer: Mailer,
}

impl Context {
    /// Builds the components and loads the encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be loaded or created; nothing
    /// works without it.
    pub async fn new(
        store: Arc<dyn Store>,
        env_key: Option<String>,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self> {
        let keys = Arc::new(KeyManager::new(Arc::clone(&store), env_key));
        keys.load_or_create_key().await?;
        info!("encryption key ready");

        let configs = ConfigStore::new(Arc::clone(&store), Arc::clone(&keys));
        let stats = Stats::new(Arc::clone(&store));
        let setup = Setup::new(Arc::clone(&store), configs.clone(), stats.clone());
        let mailer = Mailer::new(configs.clone(), stats.clone(), transport);

        Ok(Self {
            store,
            keys,
            configs,
            setup,
            stats,
            mailer,
        })
    }
}
