//! Per-user ordering of event handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use super::{Bot, Incoming};
use crate::account::UserId;

type Workers = Arc<Mutex<HashMap<UserId, UnboundedSender<Incoming>>>>;

/// Fans events out to one worker task per user.
///
/// Events from the same user are handled strictly in arrival order; events
/// from different users run concurrently. A worker that sees no events for
/// the idle timeout exits and is recreated on demand.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    bot: Arc<Bot>,
    workers: Workers,
    idle_timeout: Duration,
}

impl Dispatcher {
    /// Default idle timeout.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

    /// Creates a dispatcher for `bot`.
    #[must_use]
    pub fn new(bot: Arc<Bot>) -> Self {
        Self {
            bot,
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets how long a worker waits for events before exiting.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Queues an event. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, incoming: Incoming) {
        let user = incoming.user;
        let mut workers = lock(&self.workers);

        let incoming = match workers.get(&user) {
            Some(tx) => match tx.send(incoming) {
                Ok(()) => return,
                // Worker already gone; start a fresh one.
                Err(mpsc::error::SendError(incoming)) => incoming,
            },
            None => incoming,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive until the worker starts, so this cannot fail.
        let _ = tx.send(incoming);
        workers.insert(user, tx);
        drop(workers);

        debug!(%user, "starting worker");
        tokio::spawn(run_worker(
            user,
            rx,
            Arc::clone(&self.bot),
            Arc::clone(&self.workers),
            self.idle_timeout,
        ));
    }

    /// Number of live workers.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        lock(&self.workers).len()
    }
}

fn lock(workers: &Workers) -> MutexGuard<'_, HashMap<UserId, UnboundedSender<Incoming>>> {
    workers.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_worker(
    user: UserId,
    mut rx: UnboundedReceiver<Incoming>,
    bot: Arc<Bot>,
    workers: Workers,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(incoming)) => bot.handle(incoming).await,
            Ok(None) => break,
            Err(_) => {
                // Deregister under the lock so no event slips in between the
                // emptiness check and removal.
                let mut map = lock(&workers);
                if rx.is_empty() {
                    map.remove(&user);
                    break;
                }
            }
        }
    }
    trace!(%user, "worker exited");
}
