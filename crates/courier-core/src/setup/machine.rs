//! Setup state machine.
//!
//! The draft lives in the store under `temp:{user}` so a restart does not
//! lose progress. The mailbox address is sealed in the draft; the password
//! is never written there and goes straight into the committed record.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::validation::{
    InputValidationError, validate_email, validate_host, validate_password, validate_port,
};
use crate::account::{ConfigError, ConfigStore, Credentials, MailboxConfig, Mode, UserId};
use crate::stats::{Metric, Stats};
use crate::store::{Store, StoreError};
use crate::vault::KeyError;

const STEP_FIELD: &str = "step";
const COMMITTING: &str = "committing";

/// Store key for a user's setup draft.
#[must_use]
pub fn draft_key(user: UserId) -> String {
    format!("temp:{user}")
}

/// One field collected during setup, in collection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    /// SMTP host.
    SmtpServer,
    /// SMTP port.
    SmtpPort,
    /// IMAP host.
    ImapServer,
    /// IMAP port.
    ImapPort,
    /// Mailbox address.
    Email,
    /// Mailbox password.
    Password,
}

impl SetupStep {
    /// First step of a fresh setup.
    pub const FIRST: Self = Self::SmtpServer;

    /// Field name in the draft record.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SmtpServer => "smtp_server",
            Self::SmtpPort => "smtp_port",
            Self::ImapServer => "imap_server",
            Self::ImapPort => "imap_port",
            Self::Email => "email",
            Self::Password => "password",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "smtp_server" => Self::SmtpServer,
            "smtp_port" => Self::SmtpPort,
            "imap_server" => Self::ImapServer,
            "imap_port" => Self::ImapPort,
            "email" => Self::Email,
            "password" => Self::Password,
            _ => return None,
        })
    }

    /// Step that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::SmtpServer => Some(Self::SmtpPort),
            Self::SmtpPort => Some(Self::ImapServer),
            Self::ImapServer => Some(Self::ImapPort),
            Self::ImapPort => Some(Self::Email),
            Self::Email => Some(Self::Password),
            Self::Password => None,
        }
    }

    /// Question asked while waiting for this step.
    #[must_use]
    pub const fn prompt(self) -> &'static str {
        match self {
            Self::SmtpServer => "Enter your SMTP server (e.g. smtp.gmail.com):",
            Self::SmtpPort => "Enter the SMTP port (e.g. 587):",
            Self::ImapServer => "Enter your IMAP server (e.g. imap.gmail.com):",
            Self::ImapPort => "Enter the IMAP port (e.g. 993):",
            Self::Email => "Enter your email address:",
            Self::Password => "Enter your email password (or app password):",
        }
    }
}

/// Where a user is in setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    /// No setup in progress.
    Idle,
    /// Waiting for the given field.
    Awaiting(SetupStep),
    /// The final record is being written.
    Committing,
}

/// Result of feeding one input to setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Input accepted; now waiting for the given step.
    Advanced(SetupStep),
    /// Input refused; still waiting for the same step.
    Rejected(InputValidationError),
    /// Configuration stored; setup finished.
    Committed,
    /// The user has no setup in progress.
    NotInSetup,
}

/// Errors that abort a setup call.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The store could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The encryption key could not be loaded or used.
    #[error(transparent)]
    Key(KeyError),

    /// The draft lacks a field needed to commit.
    #[error("configuration incomplete: missing {missing}")]
    Incomplete {
        /// First missing field.
        missing: &'static str,
    },

    /// Writing the final configuration failed. The draft is kept.
    #[error("could not save configuration: {0}")]
    Commit(ConfigError),

    /// The draft no longer decrypts under the active key. It was discarded
    /// and setup has to start over.
    #[error("setup draft is unreadable and was discarded")]
    Abandoned,
}

impl From<ConfigError> for SetupError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Store(store) => Self::Store(store),
            ConfigError::Key(key) => Self::Key(key),
            other => Self::Commit(other),
        }
    }
}

/// Drives the setup conversation for every user.
#[derive(Debug, Clone)]
pub struct Setup {
    store: Arc<dyn Store>,
    configs: ConfigStore,
    stats: Stats,
}

impl Setup {
    /// Creates the state machine.
    #[must_use]
    pub const fn new(store: Arc<dyn Store>, configs: ConfigStore, stats: Stats) -> Self {
        Self {
            store,
            configs,
            stats,
        }
    }

    /// Starts a fresh setup, discarding any draft in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn begin(&self, user: UserId) -> Result<SetupStep, SetupError> {
        self.store
            .hash_replace(
                &draft_key(user),
                &[(STEP_FIELD, SetupStep::FIRST.as_str().to_string())],
            )
            .await?;
        info!(%user, "setup started");
        Ok(SetupStep::FIRST)
    }

    /// Current state for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn state(&self, user: UserId) -> Result<SetupState, SetupError> {
        let draft = self.store.hash_get_all(&draft_key(user)).await?;
        Ok(state_of(&draft))
    }

    /// Abandons setup. A no-op when none is in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn cancel(&self, user: UserId) -> Result<(), SetupError> {
        self.store.delete(&draft_key(user)).await?;
        debug!(%user, "setup cancelled");
        Ok(())
    }

    /// Feeds one user message to the current step.
    ///
    /// # Errors
    ///
    /// Store and key failures abort the call. A failed commit returns
    /// [`SetupError::Commit`] or [`SetupError::Incomplete`] and leaves the
    /// draft waiting for the password again, except for a draft that no
    /// longer decrypts, which is deleted ([`SetupError::Abandoned`]).
    pub async fn handle_input(&self, user: UserId, text: &str) -> Result<SetupOutcome, SetupError> {
        let key = draft_key(user);
        let mut draft = self.store.hash_get_all(&key).await?;

        let step = match state_of(&draft) {
            SetupState::Idle => {
                if !draft.is_empty() {
                    warn!(%user, "discarding setup draft with unknown step");
                    self.store.delete(&key).await?;
                }
                return Ok(SetupOutcome::NotInSetup);
            }
            SetupState::Committing => SetupStep::Password,
            SetupState::Awaiting(step) => step,
        };

        let value = match step {
            SetupStep::SmtpServer | SetupStep::ImapServer => validate_host(text),
            SetupStep::SmtpPort | SetupStep::ImapPort => {
                validate_port(text).map(|port| port.to_string())
            }
            SetupStep::Email => validate_email(text),
            SetupStep::Password => validate_password(text),
        };
        let value = match value {
            Ok(value) => value,
            Err(reason) => {
                debug!(%user, step = step.as_str(), field = reason.field(), "setup input rejected");
                return Ok(SetupOutcome::Rejected(reason));
            }
        };

        let Some(next) = step.next() else {
            return self.commit(user, draft, value).await;
        };

        let value = if step == SetupStep::Email {
            self.configs.seal(&value).await?
        } else {
            value
        };
        draft.insert(step.as_str().to_string(), value);
        draft.insert(STEP_FIELD.to_string(), next.as_str().to_string());
        self.write_draft(&key, &draft).await?;
        debug!(%user, step = next.as_str(), "setup advanced");
        Ok(SetupOutcome::Advanced(next))
    }

    async fn commit(
        &self,
        user: UserId,
        mut draft: HashMap<String, String>,
        password: String,
    ) -> Result<SetupOutcome, SetupError> {
        let key = draft_key(user);
        draft.insert(STEP_FIELD.to_string(), COMMITTING.to_string());
        self.write_draft(&key, &draft).await?;

        let result = match self.build_config(&draft, password).await {
            Ok(config) => self.configs.put(user, &config).await.map_err(SetupError::from),
            Err(SetupError::Commit(ConfigError::Decryption(_))) => {
                warn!(%user, "setup draft does not decrypt; discarding it");
                self.store.delete(&key).await?;
                return Err(SetupError::Abandoned);
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            warn!(%user, error = %err, "setup commit failed");
            draft.insert(STEP_FIELD.to_string(), SetupStep::Password.as_str().to_string());
            if let Err(restore) = self.write_draft(&key, &draft).await {
                warn!(%user, error = %restore, "could not restore setup draft");
            }
            return Err(match err {
                SetupError::Store(store) => SetupError::Commit(ConfigError::Store(store)),
                other => other,
            });
        }

        if let Err(err) = self.store.delete(&key).await {
            warn!(%user, error = %err, "could not remove setup draft");
        }
        self.stats.increment(Metric::SetupsCompleted).await;
        info!(%user, "setup completed");
        Ok(SetupOutcome::Committed)
    }

    async fn build_config(
        &self,
        draft: &HashMap<String, String>,
        password: String,
    ) -> Result<MailboxConfig, SetupError> {
        let field = |step: SetupStep| {
            draft
                .get(step.as_str())
                .filter(|v| !v.is_empty())
                .ok_or(SetupError::Incomplete {
                    missing: step.as_str(),
                })
        };
        let port = |step: SetupStep| {
            field(step)?.parse::<u16>().map_err(|_| SetupError::Incomplete {
                missing: step.as_str(),
            })
        };

        Ok(MailboxConfig {
            smtp_server: field(SetupStep::SmtpServer)?.clone(),
            smtp_port: port(SetupStep::SmtpPort)?,
            imap_server: field(SetupStep::ImapServer)?.clone(),
            imap_port: port(SetupStep::ImapPort)?,
            credentials: Credentials::new(
                self.configs.open(field(SetupStep::Email)?).await?,
                password,
            ),
            mode: Mode::Configured,
        })
    }

    async fn write_draft(&self, key: &str, draft: &HashMap<String, String>) -> Result<(), StoreError> {
        let fields: Vec<(&str, String)> = draft
            .iter()
            .map(|(field, value)| (field.as_str(), value.clone()))
            .collect();
        self.store.hash_replace(key, &fields).await
    }
}

fn state_of(draft: &HashMap<String, String>) -> SetupState {
    match draft.get(STEP_FIELD).map(String::as_str) {
        Some(COMMITTING) => SetupState::Committing,
        Some(step) => SetupStep::parse(step).map_or(SetupState::Idle, SetupState::Awaiting),
        None => SetupState::Idle,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use crate::vault::KeyManager;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn machine(store: &Arc<MemoryStore>) -> (Setup, ConfigStore, Stats) {
        let store: Arc<dyn Store> = store.clone();
        let keys = Arc::new(KeyManager::new(store.clone(), None));
        let configs = ConfigStore::new(store.clone(), keys);
        let stats = Stats::new(store.clone());
        (Setup::new(store, configs.clone(), stats.clone()), configs, stats)
    }

    const INPUTS: [&str; 6] = [
        "smtp.example.com",
        "587",
        "imap.example.com",
        "993",
        "a@example.com",
        "secret",
    ];

    #[tokio::test]
    async fn six_inputs_commit_a_configuration() {
        let store = Arc::new(MemoryStore::new());
        let (setup, configs, stats) = machine(&store);
        let user = UserId(42);

        assert_eq!(setup.begin(user).await.unwrap(), SetupStep::SmtpServer);
        let mut outcomes = Vec::new();
        for input in INPUTS {
            outcomes.push(setup.handle_input(user, input).await.unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                SetupOutcome::Advanced(SetupStep::SmtpPort),
                SetupOutcome::Advanced(SetupStep::ImapServer),
                SetupOutcome::Advanced(SetupStep::ImapPort),
                SetupOutcome::Advanced(SetupStep::Email),
                SetupOutcome::Advanced(SetupStep::Password),
                SetupOutcome::Committed,
            ]
        );

        let config = configs.get(user).await.unwrap().unwrap();
        assert_eq!(config.smtp_server, "smtp.example.com");
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.credentials.email, "a@example.com");
        assert_eq!(config.credentials.password, "secret");
        assert_eq!(config.mode, Mode::Configured);

        assert_eq!(setup.state(user).await.unwrap(), SetupState::Idle);
        assert!(store.hash_get_all(&draft_key(user)).await.unwrap().is_empty());
        assert_eq!(stats.read(Metric::SetupsCompleted).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn non_numeric_port_keeps_state() {
        let store = Arc::new(MemoryStore::new());
        let (setup, _, _) = machine(&store);
        let user = UserId(1);

        setup.begin(user).await.unwrap();
        setup.handle_input(user, "smtp.example.com").await.unwrap();
        let before = store.hash_get_all(&draft_key(user)).await.unwrap();

        assert_eq!(
            setup.handle_input(user, "abc").await.unwrap(),
            SetupOutcome::Rejected(InputValidationError::PortNotNumber)
        );
        assert_eq!(
            setup.state(user).await.unwrap(),
            SetupState::Awaiting(SetupStep::SmtpPort)
        );
        assert_eq!(store.hash_get_all(&draft_key(user)).await.unwrap(), before);
    }

    #[tokio::test]
    async fn draft_never_holds_plaintext_credentials() {
        let store = Arc::new(MemoryStore::new());
        let (setup, _, _) = machine(&store);
        let user = UserId(5);

        setup.begin(user).await.unwrap();
        for input in &INPUTS[..5] {
            setup.handle_input(user, input).await.unwrap();
        }
        let draft = store.hash_get_all(&draft_key(user)).await.unwrap();
        assert_ne!(draft["email"], "a@example.com");
        assert!(!draft.contains_key("password"));
        assert_eq!(draft["step"], "password");
    }

    #[tokio::test]
    async fn begin_overwrites_and_cancel_clears() {
        let store = Arc::new(MemoryStore::new());
        let (setup, _, _) = machine(&store);
        let user = UserId(9);

        setup.begin(user).await.unwrap();
        setup.handle_input(user, "smtp.example.com").await.unwrap();
        setup.begin(user).await.unwrap();
        assert_eq!(
            setup.state(user).await.unwrap(),
            SetupState::Awaiting(SetupStep::SmtpServer)
        );
        assert_eq!(store.hash_get_all(&draft_key(user)).await.unwrap().len(), 1);

        setup.cancel(user).await.unwrap();
        assert_eq!(setup.state(user).await.unwrap(), SetupState::Idle);
        assert_eq!(
            setup.handle_input(user, "anything").await.unwrap(),
            SetupOutcome::NotInSetup
        );
        setup.cancel(user).await.unwrap();
    }

    #[tokio::test]
    async fn users_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let (setup, _, _) = machine(&store);

        setup.begin(UserId(1)).await.unwrap();
        setup.begin(UserId(2)).await.unwrap();
        setup.handle_input(UserId(1), "smtp.example.com").await.unwrap();

        assert_eq!(
            setup.state(UserId(1)).await.unwrap(),
            SetupState::Awaiting(SetupStep::SmtpPort)
        );
        assert_eq!(
            setup.state(UserId(2)).await.unwrap(),
            SetupState::Awaiting(SetupStep::SmtpServer)
        );
    }

    #[tokio::test]
    async fn incomplete_draft_stays_at_password() {
        let store = Arc::new(MemoryStore::new());
        let (setup, configs, _) = machine(&store);
        let user = UserId(3);

        // A draft that skipped the IMAP steps.
        store
            .hash_replace(
                &draft_key(user),
                &[
                    ("step", "password".into()),
                    ("smtp_server", "smtp.example.com".into()),
                    ("smtp_port", "587".into()),
                ],
            )
            .await
            .unwrap();

        let err = setup.handle_input(user, "secret").await.unwrap_err();
        assert!(matches!(err, SetupError::Incomplete { missing: "imap_server" }));
        assert_eq!(
            setup.state(user).await.unwrap(),
            SetupState::Awaiting(SetupStep::Password)
        );
        assert_eq!(configs.get(user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn interrupted_commit_accepts_password_again() {
        let store = Arc::new(MemoryStore::new());
        let (setup, configs, _) = machine(&store);
        let user = UserId(4);

        setup.begin(user).await.unwrap();
        for input in &INPUTS[..5] {
            setup.handle_input(user, input).await.unwrap();
        }
        let mut draft = store.hash_get_all(&draft_key(user)).await.unwrap();
        draft.insert("step".into(), "committing".into());
        let fields: Vec<(&str, String)> = draft.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        store.hash_replace(&draft_key(user), &fields).await.unwrap();

        assert_eq!(setup.state(user).await.unwrap(), SetupState::Committing);
        assert_eq!(
            setup.handle_input(user, "secret").await.unwrap(),
            SetupOutcome::Committed
        );
        assert!(configs.get(user).await.unwrap().is_some());
    }

    /// Fails writes of committed configurations while `down` is set.
    struct ConfigWritesFail {
        inner: MemoryStore,
        down: AtomicBool,
    }

    #[async_trait]
    impl Store for ConfigWritesFail {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            self.inner.set(key, value).await
        }
        async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
            self.inner.set_if_absent(key, value).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.inner.delete(key).await
        }
        async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
            self.inner.hash_get_all(key).await
        }
        async fn hash_replace(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
            if key.starts_with("user:")
                && key.ends_with(":email_config")
                && self.down.load(Ordering::SeqCst)
            {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.hash_replace(key, fields).await
        }
        async fn increment(&self, key: &str) -> StoreResult<u64> {
            self.inner.increment(key).await
        }
        async fn counter(&self, key: &str) -> StoreResult<u64> {
            self.inner.counter(key).await
        }
        async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn failed_config_write_keeps_draft_for_retry() {
        let store = Arc::new(ConfigWritesFail {
            inner: MemoryStore::new(),
            down: AtomicBool::new(true),
        });
        let shared: Arc<dyn Store> = store.clone();
        let keys = Arc::new(KeyManager::new(shared.clone(), None));
        let configs = ConfigStore::new(shared.clone(), keys);
        let stats = Stats::new(shared.clone());
        let setup = Setup::new(shared, configs.clone(), stats.clone());
        let user = UserId(6);

        setup.begin(user).await.unwrap();
        for input in &INPUTS[..5] {
            setup.handle_input(user, input).await.unwrap();
        }
        let before = store.hash_get_all(&draft_key(user)).await.unwrap();

        let err = setup.handle_input(user, "secret").await.unwrap_err();
        assert!(matches!(err, SetupError::Commit(ConfigError::Store(_))), "{err:?}");

        let draft = store.hash_get_all(&draft_key(user)).await.unwrap();
        assert_eq!(draft, before);
        assert_eq!(draft["step"], "password");
        assert_eq!(configs.open(&draft["email"]).await.unwrap(), "a@example.com");
        assert_eq!(
            setup.state(user).await.unwrap(),
            SetupState::Awaiting(SetupStep::Password)
        );
        assert_eq!(stats.read(Metric::SetupsCompleted).await.unwrap(), 0);

        store.down.store(false, Ordering::SeqCst);
        assert_eq!(
            setup.handle_input(user, "secret").await.unwrap(),
            SetupOutcome::Committed
        );
        let config = configs.get(user).await.unwrap().unwrap();
        assert_eq!(config.credentials.email, "a@example.com");
        assert_eq!(setup.state(user).await.unwrap(), SetupState::Idle);
        assert_eq!(stats.read(Metric::SetupsCompleted).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn undecryptable_draft_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let (setup, configs, _) = machine(&store);
        let user = UserId(7);

        setup.begin(user).await.unwrap();
        for input in &INPUTS[..5] {
            setup.handle_input(user, input).await.unwrap();
        }
        let mut draft = store.hash_get_all(&draft_key(user)).await.unwrap();
        draft.insert("email".into(), "c2VhbGVkIGJ5IGFub3RoZXIga2V5".into());
        let fields: Vec<(&str, String)> = draft.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        store.hash_replace(&draft_key(user), &fields).await.unwrap();

        let err = setup.handle_input(user, "secret").await.unwrap_err();
        assert!(matches!(err, SetupError::Abandoned), "{err:?}");
        assert_eq!(setup.state(user).await.unwrap(), SetupState::Idle);
        assert!(store.hash_get_all(&draft_key(user)).await.unwrap().is_empty());
        assert_eq!(configs.get(user).await.unwrap(), None);
    }

    #[test]
    fn steps_chain_in_order() {
        let mut step = SetupStep::FIRST;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            seen.push(next);
            step = next;
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(step, SetupStep::Password);
        assert!(seen.iter().all(|s| SetupStep::parse(s.as_str()) == Some(*s)));
    }
}
