//! Usage counters.

use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::store::{Store, StoreResult};

const KEY_PREFIX: &str = "bot:stats:";

/// A tracked counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Successful sends.
    EmailsSent,
    /// `/start` invocations.
    UsersActive,
    /// Configurations committed through setup.
    SetupsCompleted,
}

impl Metric {
    /// Name used in the store key.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EmailsSent => "emails_sent",
            Self::UsersActive => "users_active",
            Self::SetupsCompleted => "setups_completed",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Increment-only counters kept in the store.
#[derive(Debug, Clone)]
pub struct Stats {
    store: Arc<dyn Store>,
}

impl Stats {
    /// Creates counters over `store`.
    #[must_use]
    pub const fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Adds one to `metric`. Failures are logged and swallowed.
    pub async fn increment(&self, metric: Metric) {
        self.bump(&format!("{KEY_PREFIX}{metric}"), metric).await;
    }

    /// Adds one to the per-day bucket of `metric`.
    pub async fn increment_daily(&self, metric: Metric, day: NaiveDate) {
        self.bump(&daily_key(metric, day), metric).await;
    }

    async fn bump(&self, key: &str, metric: Metric) {
        if let Err(err) = self.store.increment(key).await {
            warn!(%metric, error = %err, "failed to record stat");
        }
    }

    /// Current value; zero if never incremented.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn read(&self, metric: Metric) -> StoreResult<u64> {
        self.store.counter(&format!("{KEY_PREFIX}{metric}")).await
    }

    /// Value of the per-day bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn read_daily(&self, metric: Metric, day: NaiveDate) -> StoreResult<u64> {
        self.store.counter(&daily_key(metric, day)).await
    }
}

fn daily_key(metric: Metric, day: NaiveDate) -> String {
    format!("{KEY_PREFIX}{metric}:{}", day.format("%Y-%m-%d"))
}
